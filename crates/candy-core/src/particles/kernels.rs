//! Per-particle math shared by the scalar loop and the batch exports.
//!
//! Both update paths call exactly these functions so that a frame computed
//! through linear memory matches the in-place loop.

use glam::Vec3;

use crate::constants::*;

/// Wrap `value` into `[min, max)`.
#[inline]
pub fn wrap(value: f32, min: f32, max: f32) -> f32 {
    let span = max - min;
    if span <= 0.0 {
        return min;
    }
    if value >= min && value < max {
        value
    } else {
        let wrapped = min + (value - min).rem_euclid(span);
        // rem_euclid can round up to exactly `span` for tiny negative inputs
        if wrapped >= max {
            min
        } else {
            wrapped
        }
    }
}

/// Advance one rain drop (`pos` is `[x, y, z]`).
#[inline]
pub fn rain_step(pos: &mut [f32], velocity: f32, offset: f32, time: f32, bass: f32, rain_intensity: f32) {
    let fall = velocity * (1.0 + rain_intensity * RAIN_STORM_SPEEDUP);
    pos[1] -= fall;
    pos[0] += (time * 2.0 + offset).sin() * RAIN_SWAY * (1.0 + bass);
    pos[0] = wrap(pos[0], -RAIN_EXTENT, RAIN_EXTENT);
    if pos[1] < RAIN_FLOOR_Y {
        pos[1] += RAIN_CEILING_Y - RAIN_FLOOR_Y;
    }
}

/// Advance one mist puff; `drift` is the per-particle drift scale.
#[inline]
pub fn mist_step(pos: &mut [f32], drift: f32, offset: f32, time: f32, melody: f32) {
    let sway = MIST_DRIFT * drift * (1.0 + melody);
    pos[0] += (time * 0.3 + offset).sin() * sway;
    pos[2] += (time * 0.25 + offset).cos() * sway;
    pos[1] += (time * 0.5 + offset * 2.0).sin() * MIST_BOB;
    pos[0] = wrap(pos[0], -MIST_EXTENT, MIST_EXTENT);
    pos[2] = wrap(pos[2], -MIST_EXTENT, MIST_EXTENT);
    pos[1] = wrap(pos[1], MIST_MIN_Y, MIST_MAX_Y);
}

pub fn update_rain_batch(
    positions: &mut [f32],
    velocities: &[f32],
    offsets: &[f32],
    time: f32,
    bass: f32,
    rain_intensity: f32,
) {
    for ((p, &v), &o) in positions.chunks_exact_mut(3).zip(velocities).zip(offsets) {
        rain_step(p, v, o, time, bass, rain_intensity);
    }
}

pub fn update_mist_batch(positions: &mut [f32], drifts: &[f32], offsets: &[f32], time: f32, melody: f32) {
    for ((p, &d), &o) in positions.chunks_exact_mut(3).zip(drifts).zip(offsets) {
        mist_step(p, d, o, time, melody);
    }
}

/// Height of a drop that started at `start_y` and falls through a repeating column.
pub fn calc_rain_drop_y(start_y: f32, time: f32, speed: f32, cycle_height: f32) -> f32 {
    if cycle_height <= 0.0 {
        return start_y;
    }
    start_y - (time * speed).rem_euclid(cycle_height)
}

/// Lissajous-style hover around `base`.
pub fn calc_floating_particle(base: Vec3, time: f32, offset: f32, amplitude: f32) -> Vec3 {
    Vec3::new(
        base.x + (time * 0.5 + offset).sin() * amplitude,
        base.y + (time * 0.7 + offset * 1.3).sin() * amplitude * 0.5,
        base.z + (time * 0.4 + offset).cos() * amplitude,
    )
}

#[inline]
pub fn clamp_dt(dt: f32) -> f32 {
    dt.clamp(0.0, COMPUTE_MAX_DT)
}

/// Step sparkle particles: positions are `[x, y, z, life]`, velocities `[vx, vy, vz, speed]`.
///
/// `global_time` is the accumulated clamped time including this step; it only
/// seeds respawn placement so that dead particles reappear at varied spots.
#[allow(clippy::too_many_arguments)]
pub fn update_compute_batch(
    positions: &mut [f32],
    velocities: &mut [f32],
    dt: f32,
    gravity: f32,
    pulse: f32,
    spawn: Vec3,
    global_time: f32,
) {
    let dt = clamp_dt(dt);
    let gravity_dt = gravity * dt;
    let boost = 1.0 + pulse * COMPUTE_AUDIO_BOOST;
    let decay = COMPUTE_LIFE_DECAY * dt;

    for (i, (p, v)) in positions
        .chunks_exact_mut(4)
        .zip(velocities.chunks_exact_mut(4))
        .enumerate()
    {
        v[1] += gravity_dt;
        let effective = v[3] * boost;
        p[0] += v[0] * dt * effective;
        p[1] += v[1] * dt * effective;
        p[2] += v[2] * dt * effective;
        p[3] -= decay;

        if p[3] < 0.0 {
            let seed = i as f32 * 0.123 + global_time * 0.1;
            p[0] = spawn.x + (seed * 12.9898).sin() * COMPUTE_RESPAWN_RADIUS;
            p[1] = spawn.y;
            p[2] = spawn.z + (seed * 78.233).cos() * COMPUTE_RESPAWN_RADIUS;
            p[3] = 1.0;

            let vel_seed = seed + i as f32 * 0.456;
            v[0] = vel_seed.sin() * 2.0;
            v[1] = 5.0 + vel_seed.cos() * 2.0;
            v[2] = (vel_seed * 1.5).cos() * 2.0;
            v[3] = 1.0;
        }
    }
}

/// Euclidean distance from each `[x, y, z]` point to `reference`.
pub fn distances(positions: &[f32], out: &mut [f32], reference: Vec3) {
    for (p, d) in positions.chunks_exact(3).zip(out.iter_mut()) {
        *d = Vec3::new(p[0], p[1], p[2]).distance(reference);
    }
}

/// Flag points within `sqrt(max_dist_sq)` of `reference`; returns how many passed.
pub fn distance_cull(positions: &[f32], flags: &mut [f32], reference: Vec3, max_dist_sq: f32) -> usize {
    let mut visible = 0;
    for (p, flag) in positions.chunks_exact(3).zip(flags.iter_mut()) {
        let d = Vec3::new(p[0], p[1], p[2]) - reference;
        if d.length_squared() <= max_dist_sq {
            *flag = 1.0;
            visible += 1;
        } else {
            *flag = 0.0;
        }
    }
    visible
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_values_in_range() {
        assert_eq!(wrap(5.0, 0.0, 10.0), 5.0);
        assert!((wrap(12.0, 0.0, 10.0) - 2.0).abs() < 1e-5);
        assert!((wrap(-1.0, 0.0, 10.0) - 9.0).abs() < 1e-5);
        assert_eq!(wrap(3.0, 1.0, 1.0), 1.0);
    }

    #[test]
    fn rain_falls_and_wraps_to_the_top() {
        let mut p = [0.0, 0.2, 0.0];
        rain_step(&mut p, 0.5, 0.0, 0.0, 0.0, 0.0);
        assert!((p[1] - (RAIN_CEILING_Y - 0.3)).abs() < 1e-4, "y={}", p[1]);
    }

    #[test]
    fn storm_rain_falls_faster() {
        let mut calm = [0.0, 20.0, 0.0];
        let mut storm = [0.0, 20.0, 0.0];
        rain_step(&mut calm, 0.5, 0.0, 0.0, 0.0, 0.0);
        rain_step(&mut storm, 0.5, 0.0, 0.0, 0.0, 1.0);
        assert!(storm[1] < calm[1]);
    }

    #[test]
    fn mist_stays_inside_its_volume() {
        let mut p = [MIST_EXTENT - 0.001, MIST_MAX_Y - 0.0001, 0.0];
        for f in 0..2000 {
            mist_step(&mut p, 1.5, 0.7, f as f32 / 60.0, 1.0);
            assert!(p[0] >= -MIST_EXTENT && p[0] < MIST_EXTENT);
            assert!(p[1] >= MIST_MIN_Y && p[1] < MIST_MAX_Y);
        }
    }

    #[test]
    fn rain_drop_y_cycles() {
        assert_eq!(calc_rain_drop_y(50.0, 0.0, 10.0, 50.0), 50.0);
        assert!((calc_rain_drop_y(50.0, 1.0, 10.0, 50.0) - 40.0).abs() < 1e-4);
        assert!((calc_rain_drop_y(50.0, 6.0, 10.0, 50.0) - 40.0).abs() < 1e-3);
        assert_eq!(calc_rain_drop_y(7.0, 3.0, 1.0, 0.0), 7.0);
    }

    #[test]
    fn floating_particle_stays_near_base() {
        let base = Vec3::new(1.0, 2.0, 3.0);
        for i in 0..100 {
            let p = calc_floating_particle(base, i as f32 * 0.1, 0.4, 0.5);
            assert!((p - base).abs().max_element() <= 0.5 + 1e-6);
        }
    }

    #[test]
    fn dead_compute_particles_respawn_near_spawn() {
        let mut pos = vec![0.0, 0.0, 0.0, 0.01];
        let mut vel = vec![0.0, 0.0, 0.0, 1.0];
        let spawn = Vec3::new(0.0, 3.0, 0.0);
        update_compute_batch(&mut pos, &mut vel, 0.1, -9.8, 0.0, spawn, 0.1);
        assert_eq!(pos[3], 1.0);
        assert_eq!(pos[1], 3.0);
        assert!(pos[0].abs() <= COMPUTE_RESPAWN_RADIUS && pos[2].abs() <= COMPUTE_RESPAWN_RADIUS);
        assert!(vel[1] >= 3.0);
    }

    #[test]
    fn large_dt_is_clamped() {
        let mut a = vec![0.0, 10.0, 0.0, 1.0];
        let mut va = vec![1.0, 0.0, 0.0, 1.0];
        let mut b = a.clone();
        let mut vb = va.clone();
        update_compute_batch(&mut a, &mut va, 5.0, -9.8, 0.0, Vec3::ZERO, 0.1);
        update_compute_batch(&mut b, &mut vb, COMPUTE_MAX_DT, -9.8, 0.0, Vec3::ZERO, 0.1);
        assert_eq!(a, b);
        assert_eq!(va, vb);
    }

    #[test]
    fn distances_are_euclidean() {
        let positions = [3.0, 4.0, 0.0, 1.0, 1.0, 1.0];
        let mut out = [0.0; 2];
        distances(&positions, &mut out, Vec3::new(1.0, 1.0, 1.0));
        assert!((out[0] - (4.0f32 + 9.0 + 1.0).sqrt()).abs() < 1e-6);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn distance_cull_counts_and_flags() {
        let positions = [0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 10.0, 0.0, 0.0];
        let mut flags = [0.5; 3];
        let n = distance_cull(&positions, &mut flags, Vec3::ZERO, 9.0);
        assert_eq!(n, 2);
        assert_eq!(flags, [1.0, 1.0, 0.0]);
    }
}
