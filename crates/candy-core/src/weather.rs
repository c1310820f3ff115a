//! Weather mode and intensity as seen by the particle layer.
//!
//! The weather controller owns these values; particles only read them to
//! derive rain intensity and mist density for the current frame.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WeatherKind {
    #[default]
    Clear,
    Mist,
    Drizzle,
    Thunderstorm,
    Storm,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown weather kind: {0:?}")]
pub struct WeatherParseError(pub String);

impl WeatherKind {
    pub const ALL: [WeatherKind; 5] = [
        WeatherKind::Clear,
        WeatherKind::Mist,
        WeatherKind::Drizzle,
        WeatherKind::Thunderstorm,
        WeatherKind::Storm,
    ];

    pub fn id(self) -> u32 {
        match self {
            WeatherKind::Clear => 0,
            WeatherKind::Mist => 1,
            WeatherKind::Drizzle => 2,
            WeatherKind::Thunderstorm => 3,
            WeatherKind::Storm => 4,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WeatherKind::Clear => "clear",
            WeatherKind::Mist => "mist",
            WeatherKind::Drizzle => "drizzle",
            WeatherKind::Thunderstorm => "thunderstorm",
            WeatherKind::Storm => "storm",
        }
    }
}

impl fmt::Display for WeatherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeatherKind {
    type Err = WeatherParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| WeatherParseError(s.to_string()))
    }
}

/// Current weather mode plus its continuous intensity in \[0, 1\].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WeatherState {
    pub kind: WeatherKind,
    pub intensity: f32,
}

impl WeatherState {
    pub fn new(kind: WeatherKind, intensity: f32) -> Self {
        let intensity = if intensity.is_finite() {
            intensity.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { kind, intensity }
    }

    /// Signal that drives rain fall speed, opacity and visibility.
    pub fn rain_intensity(&self) -> f32 {
        match self.kind {
            WeatherKind::Clear | WeatherKind::Mist => 0.0,
            WeatherKind::Drizzle => 0.4 * self.intensity,
            WeatherKind::Thunderstorm => 0.8 * self.intensity,
            WeatherKind::Storm => self.intensity,
        }
    }

    /// Signal that drives mist opacity and visibility.
    pub fn mist_density(&self) -> f32 {
        match self.kind {
            WeatherKind::Clear => 0.0,
            WeatherKind::Mist => self.intensity,
            WeatherKind::Drizzle => 0.3 * self.intensity,
            WeatherKind::Thunderstorm | WeatherKind::Storm => 0.5 * self.intensity,
        }
    }

    pub fn is_stormy(&self) -> bool {
        matches!(self.kind, WeatherKind::Thunderstorm | WeatherKind::Storm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_and_reject_unknown() {
        for k in WeatherKind::ALL {
            assert_eq!(WeatherKind::from_id(k.id()), Some(k));
        }
        assert_eq!(WeatherKind::from_id(5), None);
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Thunderstorm".parse::<WeatherKind>(), Ok(WeatherKind::Thunderstorm));
        assert_eq!(" mist ".parse::<WeatherKind>(), Ok(WeatherKind::Mist));
        assert!("hail".parse::<WeatherKind>().is_err());
    }

    #[test]
    fn intensity_is_clamped() {
        assert_eq!(WeatherState::new(WeatherKind::Storm, 3.0).intensity, 1.0);
        assert_eq!(WeatherState::new(WeatherKind::Storm, -1.0).intensity, 0.0);
        assert_eq!(WeatherState::new(WeatherKind::Storm, f32::NAN).intensity, 0.0);
    }

    #[test]
    fn clear_sky_has_no_rain_or_mist() {
        let w = WeatherState::new(WeatherKind::Clear, 1.0);
        assert_eq!(w.rain_intensity(), 0.0);
        assert_eq!(w.mist_density(), 0.0);
    }
}
