//! Tracker pattern analysis for the audio worklet.

pub mod cache;
pub mod cell;
pub mod decoder;
pub mod effect;
pub mod processor;
pub mod replay;

pub use cache::{PatternCache, RowCells};
pub use cell::{parse_cell, CellInfo};
pub use decoder::{DecoderFactory, PlaybackCursor, TrackerDecoder, TrackerError};
pub use effect::{decode_effect, EffectKind};
pub use processor::{ProcessorConfig, TrackerProcessor};
pub use replay::{PatternDump, ReplayDecoder, ReplayFactory};
