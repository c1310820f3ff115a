//! Per-frame material parameters for the rain and mist point clouds.

use crate::constants::*;
use crate::weather::WeatherState;

/// Values the renderer copies onto the points material each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialParams {
    pub color: [f32; 3],
    pub opacity: f32,
    pub size: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0],
            opacity: 0.0,
            size: 1.0,
        }
    }
}

#[inline]
fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    let t = t.clamp(0.0, 1.0);
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

pub fn rain_material(weather: &WeatherState, bass: f32) -> MaterialParams {
    let rain = weather.rain_intensity();
    let base = if weather.is_stormy() {
        lerp3(RAIN_COLOR, STORM_RAIN_COLOR, weather.intensity)
    } else {
        RAIN_COLOR
    };
    let flash = 0.1 * bass.max(0.0);
    MaterialParams {
        color: base.map(|c| (c + flash).min(1.0)),
        opacity: (0.3 + 0.5 * rain).clamp(0.0, 0.9),
        size: 0.3 + 0.2 * bass,
    }
}

pub fn mist_material(weather: &WeatherState, melody: f32) -> MaterialParams {
    let density = weather.mist_density();
    MaterialParams {
        color: lerp3(MIST_COLOR, MIST_MELODY_COLOR, melody),
        opacity: (0.35 * density + 0.15 * melody).clamp(0.0, 0.6),
        size: 2.0 + melody,
    }
}

#[inline]
pub fn rain_visible(weather: &WeatherState) -> bool {
    weather.rain_intensity() > RAIN_VISIBILITY_THRESHOLD
}

#[inline]
pub fn mist_visible(weather: &WeatherState) -> bool {
    weather.mist_density() > MIST_VISIBILITY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::WeatherKind;

    fn close3(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn storm_darkens_rain() {
        let drizzle = rain_material(&WeatherState::new(WeatherKind::Drizzle, 1.0), 0.0);
        let storm = rain_material(&WeatherState::new(WeatherKind::Storm, 1.0), 0.0);
        assert_eq!(drizzle.color, RAIN_COLOR);
        assert!(close3(storm.color, STORM_RAIN_COLOR));
        assert!(storm.opacity > drizzle.opacity);
        assert!(storm.opacity <= 0.9);
    }

    #[test]
    fn bass_brightens_and_grows_rain() {
        let w = WeatherState::new(WeatherKind::Drizzle, 0.5);
        let quiet = rain_material(&w, 0.0);
        let loud = rain_material(&w, 1.0);
        assert!(loud.size > quiet.size);
        assert!(loud.color.iter().zip(quiet.color).all(|(l, q)| *l >= q));
        assert!(loud.color.iter().all(|c| *c <= 1.0));
    }

    #[test]
    fn mist_opacity_is_capped() {
        let m = mist_material(&WeatherState::new(WeatherKind::Mist, 1.0), 10.0);
        assert!(m.opacity <= 0.6);
        assert!(close3(m.color, MIST_MELODY_COLOR));
    }
}
