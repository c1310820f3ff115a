// Wire shapes of the worklet messages as seen by the JavaScript side.

use candy_core::*;
use serde_json::{json, Value};

fn to_value(msg: &Outbound) -> Value {
    serde_json::from_str(&msg.to_json().unwrap()).unwrap()
}

#[test]
fn unit_messages_carry_only_a_type() {
    assert_eq!(to_value(&Outbound::Ready), json!({ "type": "READY" }));
    assert_eq!(to_value(&Outbound::SongEnd), json!({ "type": "SONG_END" }));
}

#[test]
fn visual_update_uses_camel_case_fields() {
    let msg = Outbound::VisualUpdate(VisualUpdate {
        bpm: 125.0,
        channel_data: vec![ChannelData {
            volume: 0.5,
            note: true,
            trigger: true,
            instrument: 3,
            active_effect: 2,
            effect_value: 0.25,
        }],
        any_trigger: true,
    });
    assert_eq!(
        to_value(&msg),
        json!({
            "type": "VISUAL_UPDATE",
            "data": {
                "bpm": 125.0,
                "channelData": [{
                    "volume": 0.5,
                    "note": true,
                    "trigger": true,
                    "instrument": 3,
                    "activeEffect": 2,
                    "effectValue": 0.25
                }],
                "anyTrigger": true
            }
        })
    );
}

#[test]
fn inbound_load_and_stop_parse() {
    let load = Inbound::from_json(r#"{"type":"LOAD","data":{"fileData":[1,2,3],"fileName":"song.xm"}}"#).unwrap();
    assert_eq!(
        load,
        Inbound::Load(LoadRequest {
            file_data: vec![1, 2, 3],
            file_name: "song.xm".into(),
        })
    );
    assert_eq!(Inbound::from_json(r#"{"type":"STOP"}"#).unwrap(), Inbound::Stop);
}

#[test]
fn unknown_or_malformed_messages_are_errors() {
    assert!(Inbound::from_json(r#"{"type":"PAUSE"}"#).is_err());
    assert!(Inbound::from_json(r#"{"type":"LOAD","data":{"fileName":"x"}}"#).is_err());
    assert!(Inbound::from_json("not json").is_err());
}
