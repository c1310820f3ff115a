// Host-side integration tests for the scalar and accelerated particle paths.
// The accelerated path runs against the in-process module, which exposes the
// same export surface as the browser module over a heap-backed memory.

use std::cell::RefCell;
use std::rc::Rc;

use candy_core::*;
use glam::Vec3;

fn signals(frame: usize, kind: WeatherKind, intensity: f32) -> FrameSignals {
    FrameSignals {
        time: frame as f32 * 0.016,
        bass_intensity: (frame as f32 * 0.37).sin().abs(),
        melody_volume: (frame as f32 * 0.11).cos().abs(),
        weather: WeatherState::new(kind, intensity),
    }
}

fn config(rain: usize, mist: usize) -> ParticleConfig {
    ParticleConfig {
        rain_count: rain,
        mist_count: mist,
        ..ParticleConfig::default()
    }
}

fn shared(module: InProcessModule) -> (Rc<RefCell<InProcessModule>>, SharedModule) {
    let inner = Rc::new(RefCell::new(module));
    let handle: SharedModule = inner.clone();
    (inner, handle)
}

fn assert_close(a: &[f32], b: &[f32]) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() < 1e-5, "index {i}: {x} vs {y}");
    }
}

#[test]
fn scalar_and_accelerated_paths_agree() {
    for n in [0usize, 1, 7, 500] {
        let cfg = config(n, n);
        let mut legacy = LegacyParticleSystem::new(&cfg);
        let mut wasm = WasmParticleSystem::new(&cfg);
        let (_inner, module) = shared(InProcessModule::new());
        wasm.attach_module(module);

        for frame in 0..120 {
            let s = signals(frame, WeatherKind::Storm, 0.9);
            legacy.update(&s);
            wasm.update(&s);
        }
        assert_close(&legacy.rain().positions, &wasm.rain().positions);
        assert_close(&legacy.mist().positions, &wasm.mist().positions);
        assert_eq!(legacy.rain().material, wasm.rain().material);
        assert_eq!(legacy.mist().visible, wasm.mist().visible);
        if n > 0 {
            assert_eq!(wasm.last_path(ParticleKind::Rain), UpdatePath::Accelerated);
            assert_eq!(wasm.last_path(ParticleKind::Mist), UpdatePath::Accelerated);
        }
    }
}

#[test]
fn every_weather_mode_agrees() {
    for kind in WeatherKind::ALL {
        let cfg = config(64, 64);
        let mut legacy = LegacyParticleSystem::new(&cfg);
        let mut wasm = WasmParticleSystem::new(&cfg);
        let (_inner, module) = shared(InProcessModule::new());
        wasm.attach_module(module);
        for frame in 0..30 {
            let s = signals(frame, kind, 0.6);
            legacy.update(&s);
            wasm.update(&s);
        }
        assert_close(&legacy.rain().positions, &wasm.rain().positions);
        assert_close(&legacy.mist().positions, &wasm.mist().positions);
    }
}

#[test]
fn rain_stays_inside_its_volume() {
    let mut legacy = LegacyParticleSystem::new(&config(200, 0));
    for frame in 0..600 {
        legacy.update(&signals(frame, WeatherKind::Storm, 1.0));
    }
    for p in legacy.rain().positions.chunks_exact(3) {
        assert!(p[0] >= -50.0 && p[0] < 50.0, "x out of range: {}", p[0]);
        assert!(p[1] >= 0.0 && p[1] < 50.0 + 1e-3, "y out of range: {}", p[1]);
        assert!(p[2] >= -50.0 && p[2] < 50.0, "z out of range: {}", p[2]);
    }
}

#[test]
fn invisible_batches_are_not_advanced() {
    let cfg = config(32, 32);
    let mut wasm = WasmParticleSystem::new(&cfg);
    let before_rain = wasm.rain().positions.clone();
    let before_mist = wasm.mist().positions.clone();
    wasm.update(&signals(1, WeatherKind::Clear, 1.0));
    assert!(!wasm.rain().visible);
    assert!(!wasm.mist().visible);
    assert_eq!(wasm.rain().positions, before_rain);
    assert_eq!(wasm.mist().positions, before_mist);
    assert_eq!(wasm.last_path(ParticleKind::Rain), UpdatePath::Skipped);
}

#[test]
fn no_module_uses_scalar_path() {
    let mut wasm = WasmParticleSystem::new(&config(16, 16));
    wasm.update(&signals(0, WeatherKind::Storm, 1.0));
    assert_eq!(wasm.last_path(ParticleKind::Rain), UpdatePath::Scalar);
    assert_eq!(wasm.last_path(ParticleKind::Mist), UpdatePath::Scalar);
}

#[test]
fn missing_export_falls_back_for_that_batch_only() {
    let caps = Capabilities {
        mist_batch: false,
        ..Capabilities::all()
    };
    let (inner, module) = shared(InProcessModule::with_capabilities(caps));
    let mut wasm = WasmParticleSystem::new(&config(16, 16));
    wasm.attach_module(module);
    wasm.update(&signals(0, WeatherKind::Storm, 1.0));
    assert_eq!(wasm.last_path(ParticleKind::Rain), UpdatePath::Accelerated);
    assert_eq!(wasm.last_path(ParticleKind::Mist), UpdatePath::Scalar);
    assert_eq!(inner.borrow().batch_calls(), 1);
}

#[test]
fn module_not_ready_uses_scalar_then_switches() {
    let caps = Capabilities {
        ready: false,
        ..Capabilities::all()
    };
    let (inner, module) = shared(InProcessModule::with_capabilities(caps));
    let mut wasm = WasmParticleSystem::new(&config(16, 16));
    wasm.attach_module(module);

    wasm.update(&signals(0, WeatherKind::Storm, 1.0));
    assert_eq!(wasm.last_path(ParticleKind::Rain), UpdatePath::Scalar);

    inner.borrow_mut().capabilities_mut().ready = true;
    wasm.update(&signals(1, WeatherKind::Storm, 1.0));
    assert_eq!(wasm.last_path(ParticleKind::Rain), UpdatePath::Accelerated);

    inner.borrow_mut().capabilities_mut().rain_batch = false;
    wasm.update(&signals(2, WeatherKind::Storm, 1.0));
    assert_eq!(wasm.last_path(ParticleKind::Rain), UpdatePath::Scalar);
}

#[test]
fn allocation_failure_falls_back_to_scalar() {
    let module = InProcessModule::with_memory(HeapMemory::with_limit(64), Capabilities::all());
    let (inner, handle) = shared(module);
    let cfg = config(100, 100);
    let mut legacy = LegacyParticleSystem::new(&cfg);
    let mut wasm = WasmParticleSystem::new(&cfg);
    wasm.attach_module(handle);
    for frame in 0..5 {
        let s = signals(frame, WeatherKind::Storm, 1.0);
        legacy.update(&s);
        wasm.update(&s);
    }
    assert_eq!(wasm.last_path(ParticleKind::Rain), UpdatePath::Scalar);
    assert_eq!(inner.borrow().batch_calls(), 0);
    assert_close(&legacy.rain().positions, &wasm.rain().positions);
}

#[test]
fn batch_memory_is_allocated_once_and_freed_on_dispose() {
    let (inner, module) = shared(InProcessModule::new());
    let mut wasm = WasmParticleSystem::new(&config(10, 10));
    wasm.attach_module(module);
    for frame in 0..10 {
        wasm.update(&signals(frame, WeatherKind::Storm, 1.0));
    }
    assert_eq!(inner.borrow().live_allocations(), 2);
    assert_eq!(inner.borrow().batch_calls(), 20);
    wasm.dispose();
    assert_eq!(inner.borrow().live_allocations(), 0);
}

#[test]
fn busy_module_falls_back_without_panicking() {
    let (inner, module) = shared(InProcessModule::new());
    let mut wasm = WasmParticleSystem::new(&config(8, 8));
    wasm.attach_module(module);
    let guard = inner.borrow_mut();
    wasm.update(&signals(0, WeatherKind::Storm, 1.0));
    assert_eq!(wasm.last_path(ParticleKind::Rain), UpdatePath::Scalar);
    drop(guard);
}

#[test]
fn helpers_match_kernels_with_and_without_module() {
    let mut wasm = WasmParticleSystem::new(&config(50, 50));
    let base = Vec3::new(1.0, 2.0, 3.0);
    let plain_y = wasm.rain_drop_y(10.0, 3.5, 2.0, 20.0);
    let plain_float = wasm.floating_particle(base, 1.25, 0.5, 0.3);
    let plain_near = wasm.count_within(ParticleKind::Rain, Vec3::ZERO, 20.0);

    let (_inner, module) = shared(InProcessModule::new());
    wasm.attach_module(module);
    assert!((wasm.rain_drop_y(10.0, 3.5, 2.0, 20.0) - plain_y).abs() < 1e-6);
    assert!((wasm.floating_particle(base, 1.25, 0.5, 0.3) - plain_float).length() < 1e-6);
    assert_eq!(wasm.count_within(ParticleKind::Rain, Vec3::ZERO, 20.0), plain_near);
}

#[test]
fn compute_particles_agree_across_paths() {
    for n in [0usize, 1, 7, 256] {
        let mut scalar = ComputeParticles::new(n, Vec3::new(0.0, 1.0, 0.0), 11);
        let mut accel = ComputeParticles::new(n, Vec3::new(0.0, 1.0, 0.0), 11);
        let (_inner, module) = shared(InProcessModule::new());
        accel.attach_module(module);
        for frame in 0..90 {
            let pulse = if frame % 10 == 0 { 1.0 } else { 0.2 };
            scalar.update(0.016, pulse);
            accel.update(0.016, pulse);
        }
        assert_close(&scalar.positions, &accel.positions);
        assert_close(&scalar.velocities, &accel.velocities);
        if n > 0 {
            assert_eq!(accel.last_path(), UpdatePath::Accelerated);
        }
    }
}

#[test]
fn compute_without_export_uses_scalar() {
    let caps = Capabilities {
        compute_batch: false,
        ..Capabilities::all()
    };
    let (_inner, module) = shared(InProcessModule::with_capabilities(caps));
    let mut sparkles = ComputeParticles::new(8, Vec3::ZERO, 3);
    sparkles.attach_module(module);
    sparkles.update(0.016, 0.5);
    assert_eq!(sparkles.last_path(), UpdatePath::Scalar);
}

#[test]
fn distances_agree_with_and_without_module() {
    let mut wasm = WasmParticleSystem::new(&config(40, 40));
    let reference = Vec3::new(2.0, 5.0, -1.0);
    let plain = wasm.distances_to(ParticleKind::Mist, reference);
    assert_eq!(plain.len(), 40);

    let (inner, module) = shared(InProcessModule::new());
    wasm.attach_module(module);
    assert_close(&wasm.distances_to(ParticleKind::Mist, reference), &plain);
    // layout plus one scratch block
    assert_eq!(inner.borrow().live_allocations(), 2);

    inner.borrow_mut().capabilities_mut().distances = false;
    assert_close(&wasm.distances_to(ParticleKind::Mist, reference), &plain);

    wasm.dispose();
    assert_eq!(inner.borrow().live_allocations(), 0);
}

#[test]
fn compute_reset_restarts_from_seed() {
    let (_inner, module) = shared(InProcessModule::new());
    let mut sparkles = ComputeParticles::new(32, Vec3::Y, 9);
    sparkles.attach_module(module);
    for _ in 0..45 {
        sparkles.update(0.016, 0.8);
    }
    assert!(sparkles.global_time() > 0.0);

    sparkles.reset(9);
    let mut fresh = ComputeParticles::new(32, Vec3::Y, 9);
    assert_eq!(sparkles.global_time(), 0.0);
    assert_eq!(sparkles.positions, fresh.positions);
    assert_eq!(sparkles.velocities, fresh.velocities);

    for _ in 0..20 {
        sparkles.update(0.016, 0.3);
        fresh.update(0.016, 0.3);
    }
    assert_eq!(sparkles.last_path(), UpdatePath::Accelerated);
    assert_close(&sparkles.positions, &fresh.positions);
}
