//! Fixed-format pattern cell text, as produced by the decoder's formatter.
//!
//! A cell reads `NNN II VVV EPP`: note, instrument, volume command and effect
//! with parameter. Empty fields are rendered as dots, e.g. `C-5 01 v64 40F`
//! or `... .. ... ...`.

use std::sync::OnceLock;

use regex::Regex;

use super::effect::{decode_effect, EffectKind};

/// What the visuals need from one cell.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CellInfo {
    pub note: bool,
    pub instrument: u32,
    pub effect: EffectKind,
    pub intensity: f32,
}

fn note_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[A-G][-#]\d").expect("valid note regex"))
}

fn instrument_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\S{3}\s+(\d+)(?:\s|$)").expect("valid instrument regex"))
}

fn effect_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\s)([0-9A-Z])([0-9A-F]{2})\s*$").expect("valid effect regex"))
}

/// Whether the cell starts a new note (note-off, cut and fade do not count).
pub fn has_note(text: &str) -> bool {
    note_re().is_match(text)
}

pub fn instrument(text: &str) -> u32 {
    instrument_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

pub fn effect(text: &str) -> (EffectKind, f32) {
    let Some(caps) = effect_re().captures(text) else {
        return (EffectKind::None, 0.0);
    };
    let code = caps
        .get(1)
        .and_then(|m| m.as_str().chars().next())
        .unwrap_or('.');
    let param = caps
        .get(2)
        .and_then(|m| u8::from_str_radix(m.as_str(), 16).ok())
        .unwrap_or(0);
    decode_effect(code, param)
}

/// Parse a cell; malformed or empty text yields the default.
pub fn parse_cell(text: &str) -> CellInfo {
    if text.trim().is_empty() {
        return CellInfo::default();
    }
    let (effect, intensity) = effect(text);
    CellInfo {
        note: has_note(text),
        instrument: instrument(text),
        effect,
        intensity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cell() {
        let c = parse_cell("C-5 01 v64 4FF");
        assert!(c.note);
        assert_eq!(c.instrument, 1);
        assert_eq!(c.effect, EffectKind::Vibrato);
        assert!((c.intensity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sharp_notes_count() {
        assert!(has_note("F#3 12 ... ..."));
    }

    #[test]
    fn note_off_and_cut_are_not_notes() {
        assert!(!has_note("=== .. ... ..."));
        assert!(!has_note("^^^ .. ... ..."));
        assert!(!has_note("~~~ .. ... ..."));
    }

    #[test]
    fn empty_cell_is_default() {
        assert_eq!(parse_cell("... .. ... ..."), CellInfo::default());
        assert_eq!(parse_cell(""), CellInfo::default());
    }

    #[test]
    fn volume_column_is_not_an_effect() {
        let c = parse_cell("C-5 01 v64 ...");
        assert_eq!(c.effect, EffectKind::None);
        assert_eq!(c.intensity, 0.0);
    }

    #[test]
    fn effect_without_note() {
        let c = parse_cell("... .. ... R80");
        assert!(!c.note);
        assert_eq!(c.instrument, 0);
        assert_eq!(c.effect, EffectKind::Retrigger);
        assert!((c.intensity - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_effect_decodes_to_none() {
        let c = parse_cell("D-4 03 ... F06");
        assert!(c.note);
        assert_eq!(c.instrument, 3);
        assert_eq!(c.effect, EffectKind::None);
        assert_eq!(c.intensity, 0.0);
    }
}
