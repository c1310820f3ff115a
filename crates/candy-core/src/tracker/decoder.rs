use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("could not decode module {name:?}: {reason}")]
    Decode { name: String, reason: String },
    #[error("module {0:?} is empty")]
    Empty(String),
    #[error("decoder library unavailable: {0}")]
    Unavailable(String),
}

/// Playback position reported by the decoder.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaybackCursor {
    pub order: usize,
    pub row: usize,
    pub bpm: f32,
}

impl PlaybackCursor {
    pub fn same_row(&self, other: &PlaybackCursor) -> bool {
        self.order == other.order && self.row == other.row
    }
}

/// A playing tracker module.
pub trait TrackerDecoder {
    fn num_channels(&self) -> usize;
    fn num_orders(&self) -> usize;
    /// Pattern index played at `order`, `None` for skip/end markers.
    fn order_pattern(&self, order: usize) -> Option<usize>;
    fn pattern_rows(&self, pattern: usize) -> usize;
    /// Fixed-format text of one cell.
    fn format_cell(&self, pattern: usize, row: usize, channel: usize) -> String;
    fn cursor(&self) -> PlaybackCursor;
    /// Current mono VU of `channel` in \[0, 1\].
    fn channel_vu(&self, channel: usize) -> f32;
    /// Render up to `left.len()` stereo frames; returns frames written, 0 at song end.
    fn render(&mut self, sample_rate: u32, left: &mut [f32], right: &mut [f32]) -> usize;
}

/// Opens decoders from raw module bytes.
pub trait DecoderFactory {
    fn open(&self, bytes: &[u8], file_name: &str) -> Result<Box<dyn TrackerDecoder>, TrackerError>;
}
