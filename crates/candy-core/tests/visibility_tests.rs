// Visibility of the weather point clouds as intensity sweeps up and down.

use candy_core::*;

fn sweep() -> impl Iterator<Item = f32> {
    (0..=100).map(|i| i as f32 / 100.0)
}

fn flips(kind: WeatherKind, batch: ParticleKind, values: impl Iterator<Item = f32>) -> usize {
    let mut system = LegacyParticleSystem::new(&ParticleConfig {
        rain_count: 4,
        mist_count: 4,
        ..ParticleConfig::default()
    });
    let mut prev: Option<bool> = None;
    let mut count = 0;
    for intensity in values {
        system.update(&FrameSignals {
            weather: WeatherState::new(kind, intensity),
            ..FrameSignals::default()
        });
        let visible = match batch {
            ParticleKind::Rain => system.rain().visible,
            ParticleKind::Mist => system.mist().visible,
        };
        if prev.is_some_and(|p| p != visible) {
            count += 1;
        }
        prev = Some(visible);
    }
    count
}

#[test]
fn visibility_flips_once_on_a_rising_sweep() {
    for kind in [WeatherKind::Drizzle, WeatherKind::Thunderstorm, WeatherKind::Storm] {
        assert_eq!(flips(kind, ParticleKind::Rain, sweep()), 1, "rain {kind}");
    }
    for kind in [
        WeatherKind::Mist,
        WeatherKind::Drizzle,
        WeatherKind::Thunderstorm,
        WeatherKind::Storm,
    ] {
        assert_eq!(flips(kind, ParticleKind::Mist, sweep()), 1, "mist {kind}");
    }
}

#[test]
fn visibility_flips_once_on_a_falling_sweep() {
    let falling: Vec<f32> = sweep().collect::<Vec<_>>().into_iter().rev().collect();
    assert_eq!(flips(WeatherKind::Storm, ParticleKind::Rain, falling.clone().into_iter()), 1);
    assert_eq!(flips(WeatherKind::Mist, ParticleKind::Mist, falling.into_iter()), 1);
}

#[test]
fn clear_sky_never_shows_particles() {
    assert_eq!(flips(WeatherKind::Clear, ParticleKind::Rain, sweep()), 0);
    assert_eq!(flips(WeatherKind::Clear, ParticleKind::Mist, sweep()), 0);
    assert_eq!(flips(WeatherKind::Mist, ParticleKind::Rain, sweep()), 0);
}
