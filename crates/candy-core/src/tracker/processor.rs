//! Audio-worklet side of the tracker pipeline.
//!
//! Renders the loaded module block by block and, for every rendered block,
//! posts one `VISUAL_UPDATE` describing what each channel is doing at the
//! current cursor.

use super::cache::PatternCache;
use super::cell::parse_cell;
use super::decoder::{DecoderFactory, PlaybackCursor, TrackerDecoder, TrackerError};
use crate::constants::DEFAULT_SAMPLE_RATE;
use crate::protocol::{ChannelData, Inbound, MessageSink, Outbound, ProtocolError, VisualUpdate};

#[derive(Clone, Copy, Debug)]
pub struct ProcessorConfig {
    pub sample_rate: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

struct Playback {
    decoder: Box<dyn TrackerDecoder>,
    cache: PatternCache,
    file_name: String,
    last_cursor: Option<PlaybackCursor>,
}

pub struct TrackerProcessor<F: DecoderFactory> {
    factory: F,
    config: ProcessorConfig,
    playback: Option<Playback>,
}

impl<F: DecoderFactory> TrackerProcessor<F> {
    pub fn new(factory: F, config: ProcessorConfig) -> Self {
        Self {
            factory,
            config,
            playback: None,
        }
    }

    pub fn config(&self) -> ProcessorConfig {
        self.config
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    /// Name of the playing module, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.playback.as_ref().map(|p| p.file_name.as_str())
    }

    pub fn announce_ready(&self, sink: &mut dyn MessageSink) {
        sink.post(Outbound::Ready);
    }

    pub fn handle_message(&mut self, message: Inbound) {
        match message {
            Inbound::Load(req) => {
                if let Err(e) = self.load(&req.file_data, &req.file_name) {
                    log::error!("[worklet] load failed: {e}");
                }
            }
            Inbound::Stop => self.stop(),
        }
    }

    pub fn handle_json(&mut self, text: &str) -> Result<(), ProtocolError> {
        let message = Inbound::from_json(text)?;
        self.handle_message(message);
        Ok(())
    }

    /// Replace the current module. On failure the processor is left idle.
    pub fn load(&mut self, bytes: &[u8], file_name: &str) -> Result<(), TrackerError> {
        self.playback = None;
        let decoder = self.factory.open(bytes, file_name)?;
        let cache = PatternCache::build(decoder.as_ref());
        log::info!(
            "[worklet] loaded {file_name:?}: {} channels, {} orders",
            cache.num_channels(),
            cache.num_orders()
        );
        self.playback = Some(Playback {
            decoder,
            cache,
            file_name: file_name.to_string(),
            last_cursor: None,
        });
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(playback) = self.playback.take() {
            log::info!("[worklet] stopped {:?}", playback.file_name);
        }
    }

    /// Render one block. Always returns `true` so the host keeps the processor alive.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32], sink: &mut dyn MessageSink) -> bool {
        let sample_rate = self.config.sample_rate;
        let Some(playback) = self.playback.as_mut() else {
            left.fill(0.0);
            right.fill(0.0);
            return true;
        };

        let frames = playback.decoder.render(sample_rate, left, right);
        if frames == 0 {
            left.fill(0.0);
            right.fill(0.0);
            log::info!("[worklet] song end {:?}", playback.file_name);
            self.playback = None;
            sink.post(Outbound::SongEnd);
            return true;
        }
        let (left_len, right_len) = (left.len(), right.len());
        left[frames.min(left_len)..].fill(0.0);
        right[frames.min(right_len)..].fill(0.0);

        let cursor = playback.decoder.cursor();
        let row_changed = playback
            .last_cursor
            .map_or(true, |last| !last.same_row(&cursor));
        playback.last_cursor = Some(cursor);

        let update = visual_update(playback, cursor, row_changed);
        sink.post(Outbound::VisualUpdate(update));
        true
    }
}

fn visual_update(playback: &Playback, cursor: PlaybackCursor, row_changed: bool) -> VisualUpdate {
    let channel_data: Vec<ChannelData> = (0..playback.cache.num_channels())
        .map(|ch| {
            let info = parse_cell(playback.cache.cell(cursor.order, cursor.row, ch));
            let vu = playback.decoder.channel_vu(ch);
            ChannelData {
                volume: if vu.is_finite() { vu.clamp(0.0, 1.0) } else { 0.0 },
                note: info.note,
                trigger: info.note && row_changed,
                instrument: info.instrument,
                active_effect: info.effect.id(),
                effect_value: info.intensity,
            }
        })
        .collect();
    let any_trigger = channel_data.iter().any(|c| c.trigger);
    VisualUpdate {
        bpm: cursor.bpm,
        channel_data,
        any_trigger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::replay::ReplayFactory;

    #[test]
    fn idle_processor_writes_silence() {
        let mut p = TrackerProcessor::new(ReplayFactory, ProcessorConfig::default());
        let mut l = [1.0f32; 8];
        let mut r = [1.0f32; 8];
        let mut out: Vec<Outbound> = Vec::new();
        assert!(p.process(&mut l, &mut r, &mut out));
        assert!(l.iter().chain(r.iter()).all(|s| *s == 0.0));
        assert!(out.is_empty());
    }

    #[test]
    fn bad_load_posts_nothing() {
        let mut p = TrackerProcessor::new(ReplayFactory, ProcessorConfig::default());
        p.handle_message(Inbound::Load(crate::protocol::LoadRequest {
            file_data: b"not json".to_vec(),
            file_name: "broken.mod".into(),
        }));
        assert!(!p.is_playing());
    }
}
