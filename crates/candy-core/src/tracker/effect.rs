/// Effect commands the visuals react to, with the ids sent to the main thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EffectKind {
    #[default]
    None = 0,
    Vibrato = 1,
    Portamento = 2,
    Tremolo = 3,
    Arpeggio = 4,
    Retrigger = 5,
}

impl EffectKind {
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Map a tracker effect letter/digit to the reacting effect.
    pub fn from_code(code: char) -> Self {
        match code.to_ascii_uppercase() {
            '4' => EffectKind::Vibrato,
            '3' => EffectKind::Portamento,
            '7' => EffectKind::Tremolo,
            '0' => EffectKind::Arpeggio,
            'R' => EffectKind::Retrigger,
            _ => EffectKind::None,
        }
    }
}

/// Decode an effect command into its kind and a normalised intensity.
///
/// Intensity is the parameter byte scaled to \[0, 1\]; unrecognised commands
/// decode to `(None, 0.0)`.
pub fn decode_effect(code: char, param: u8) -> (EffectKind, f32) {
    match EffectKind::from_code(code) {
        EffectKind::None => (EffectKind::None, 0.0),
        kind => (kind, param as f32 / 255.0),
    }
}
