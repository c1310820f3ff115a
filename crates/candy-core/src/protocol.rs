//! Messages exchanged between the main thread and the audio worklet.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Payload of a `LOAD` request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub file_data: Vec<u8>,
    pub file_name: String,
}

/// Main thread → worklet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Inbound {
    Load(LoadRequest),
    Stop,
}

impl Inbound {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Per-channel visual state for one audio block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelData {
    pub volume: f32,
    pub note: bool,
    pub trigger: bool,
    pub instrument: u32,
    pub active_effect: u8,
    pub effect_value: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualUpdate {
    pub bpm: f32,
    pub channel_data: Vec<ChannelData>,
    pub any_trigger: bool,
}

/// Worklet → main thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outbound {
    Ready,
    SongEnd,
    VisualUpdate(VisualUpdate),
}

impl Outbound {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One-way outbound channel (a `MessagePort` on the web).
pub trait MessageSink {
    fn post(&mut self, message: Outbound);
}

impl MessageSink for Vec<Outbound> {
    fn post(&mut self, message: Outbound) {
        self.push(message);
    }
}
