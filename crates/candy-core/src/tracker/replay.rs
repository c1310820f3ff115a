//! Decoder that replays a pre-formatted pattern dump.
//!
//! Renders silence while stepping the cursor with tracker timing, so the
//! analysis pipeline can run without the real decoder library (native harness,
//! tests, offline previews).

use serde::{Deserialize, Serialize};

use super::cell::has_note;
use super::decoder::{DecoderFactory, PlaybackCursor, TrackerDecoder, TrackerError};
use crate::constants::{DEFAULT_TRACKER_BPM, DEFAULT_TRACKER_SPEED};

fn default_bpm() -> f32 {
    DEFAULT_TRACKER_BPM
}

fn default_speed() -> u32 {
    DEFAULT_TRACKER_SPEED
}

/// Serialized song: order list plus formatted cells `patterns[pattern][row][channel]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternDump {
    #[serde(default = "default_bpm")]
    pub bpm: f32,
    /// Ticks per row.
    #[serde(default = "default_speed")]
    pub speed: u32,
    pub channels: usize,
    /// Pattern index per order; `null` marks a skipped order.
    pub orders: Vec<Option<usize>>,
    pub patterns: Vec<Vec<Vec<String>>>,
}

impl PatternDump {
    /// Seconds per row: one tick lasts 2.5/bpm seconds.
    pub fn row_seconds(&self) -> f64 {
        let bpm = if self.bpm > 0.0 { self.bpm } else { DEFAULT_TRACKER_BPM };
        2.5 * self.speed.max(1) as f64 / bpm as f64
    }
}

pub struct ReplayDecoder {
    dump: PatternDump,
    order: usize,
    row: usize,
    row_elapsed: f64,
    finished: bool,
}

impl ReplayDecoder {
    pub fn new(dump: PatternDump) -> Self {
        let mut decoder = Self {
            dump,
            order: 0,
            row: 0,
            row_elapsed: 0.0,
            finished: false,
        };
        decoder.settle_on_playable_order();
        decoder
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn current_pattern(&self) -> Option<usize> {
        self.dump.orders.get(self.order).copied().flatten()
    }

    fn rows_in_current(&self) -> usize {
        self.current_pattern().map(|p| self.pattern_rows(p)).unwrap_or(0)
    }

    /// Move forward to the first order that has rows; finish if none remain.
    fn settle_on_playable_order(&mut self) {
        while self.order < self.dump.orders.len() && self.rows_in_current() == 0 {
            self.order += 1;
        }
        if self.order >= self.dump.orders.len() {
            self.finished = true;
        }
    }

    fn advance_row(&mut self) {
        self.row += 1;
        if self.row >= self.rows_in_current() {
            self.row = 0;
            self.order += 1;
            self.settle_on_playable_order();
        }
    }
}

impl TrackerDecoder for ReplayDecoder {
    fn num_channels(&self) -> usize {
        self.dump.channels
    }

    fn num_orders(&self) -> usize {
        self.dump.orders.len()
    }

    fn order_pattern(&self, order: usize) -> Option<usize> {
        self.dump.orders.get(order).copied().flatten()
    }

    fn pattern_rows(&self, pattern: usize) -> usize {
        self.dump.patterns.get(pattern).map(Vec::len).unwrap_or(0)
    }

    fn format_cell(&self, pattern: usize, row: usize, channel: usize) -> String {
        self.dump
            .patterns
            .get(pattern)
            .and_then(|rows| rows.get(row))
            .and_then(|cells| cells.get(channel))
            .cloned()
            .unwrap_or_default()
    }

    fn cursor(&self) -> PlaybackCursor {
        PlaybackCursor {
            order: self.order,
            row: self.row,
            bpm: self.dump.bpm,
        }
    }

    fn channel_vu(&self, channel: usize) -> f32 {
        let Some(pattern) = self.current_pattern() else {
            return 0.0;
        };
        if self.finished || !has_note(&self.format_cell(pattern, self.row, channel)) {
            return 0.0;
        }
        let progress = self.row_elapsed / self.dump.row_seconds();
        (1.0 - progress as f32).clamp(0.0, 1.0)
    }

    fn render(&mut self, sample_rate: u32, left: &mut [f32], right: &mut [f32]) -> usize {
        if self.finished || sample_rate == 0 {
            return 0;
        }
        let frames = left.len().min(right.len());
        left[..frames].fill(0.0);
        right[..frames].fill(0.0);

        let row_seconds = self.dump.row_seconds();
        self.row_elapsed += frames as f64 / sample_rate as f64;
        while self.row_elapsed >= row_seconds && !self.finished {
            self.row_elapsed -= row_seconds;
            self.advance_row();
        }
        frames
    }
}

/// Opens [`ReplayDecoder`]s from JSON pattern dumps.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReplayFactory;

impl DecoderFactory for ReplayFactory {
    fn open(&self, bytes: &[u8], file_name: &str) -> Result<Box<dyn TrackerDecoder>, TrackerError> {
        let dump: PatternDump = serde_json::from_slice(bytes).map_err(|e| TrackerError::Decode {
            name: file_name.to_string(),
            reason: e.to_string(),
        })?;
        let decoder = ReplayDecoder::new(dump);
        if decoder.is_finished() {
            return Err(TrackerError::Empty(file_name.to_string()));
        }
        Ok(Box::new(decoder))
    }
}
