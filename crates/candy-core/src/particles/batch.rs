use rand::prelude::*;

use super::material::MaterialParams;
use crate::constants::*;
use crate::weather::WeatherState;

/// Which point cloud a batch represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParticleKind {
    Rain,
    Mist,
}

/// Construction-time sizing and seeding of the weather point clouds.
#[derive(Clone, Debug)]
pub struct ParticleConfig {
    pub rain_count: usize,
    pub mist_count: usize,
    pub compute_count: usize,
    pub seed: u64,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            rain_count: DEFAULT_RAIN_COUNT,
            mist_count: DEFAULT_MIST_COUNT,
            compute_count: DEFAULT_COMPUTE_COUNT,
            seed: DEFAULT_PARTICLE_SEED,
        }
    }
}

/// Everything a particle update reads for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameSignals {
    pub time: f32,
    pub bass_intensity: f32,
    pub melody_volume: f32,
    pub weather: WeatherState,
}

/// Fixed-size point cloud with per-point fall velocity and phase offset.
///
/// `positions` holds `[x, y, z]` per point; `velocities` is the fall speed for
/// rain and the drift scale for mist. The point count never changes after
/// construction.
#[derive(Clone, Debug)]
pub struct ParticleBatch {
    kind: ParticleKind,
    pub positions: Vec<f32>,
    pub velocities: Vec<f32>,
    pub offsets: Vec<f32>,
    pub material: MaterialParams,
    pub visible: bool,
}

impl ParticleBatch {
    pub fn rain(count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut positions = Vec::with_capacity(count * 3);
        let mut velocities = Vec::with_capacity(count);
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            positions.push(rng.gen_range(-RAIN_EXTENT..RAIN_EXTENT));
            positions.push(rng.gen_range(RAIN_FLOOR_Y..RAIN_CEILING_Y));
            positions.push(rng.gen_range(-RAIN_EXTENT..RAIN_EXTENT));
            velocities.push(rng.gen_range(RAIN_MIN_FALL..RAIN_MAX_FALL));
            offsets.push(rng.gen_range(0.0..std::f32::consts::TAU));
        }
        Self::from_parts(ParticleKind::Rain, positions, velocities, offsets)
    }

    pub fn mist(count: usize, seed: u64) -> Self {
        // Decorrelate from the rain stream when both share a config seed
        let mut rng = StdRng::seed_from_u64(seed ^ 0x9E37_79B9_7F4A_7C15);
        let mut positions = Vec::with_capacity(count * 3);
        let mut velocities = Vec::with_capacity(count);
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            positions.push(rng.gen_range(-MIST_EXTENT..MIST_EXTENT));
            positions.push(rng.gen_range(MIST_MIN_Y..MIST_MAX_Y));
            positions.push(rng.gen_range(-MIST_EXTENT..MIST_EXTENT));
            velocities.push(rng.gen_range(MIST_MIN_DRIFT_SCALE..MIST_MAX_DRIFT_SCALE));
            offsets.push(rng.gen_range(0.0..std::f32::consts::TAU));
        }
        Self::from_parts(ParticleKind::Mist, positions, velocities, offsets)
    }

    /// Build a batch from explicit arrays. Lengths are truncated to the
    /// largest whole point count all three arrays agree on.
    pub fn from_parts(
        kind: ParticleKind,
        mut positions: Vec<f32>,
        mut velocities: Vec<f32>,
        mut offsets: Vec<f32>,
    ) -> Self {
        let count = (positions.len() / 3).min(velocities.len()).min(offsets.len());
        positions.truncate(count * 3);
        velocities.truncate(count);
        offsets.truncate(count);
        Self {
            kind,
            positions,
            velocities,
            offsets,
            material: MaterialParams::default(),
            visible: false,
        }
    }

    pub fn kind(&self) -> ParticleKind {
        self.kind
    }

    pub fn count(&self) -> usize {
        self.velocities.len()
    }

    pub fn position(&self, index: usize) -> Option<[f32; 3]> {
        let p = self.positions.get(index * 3..index * 3 + 3)?;
        Some([p[0], p[1], p[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rain_scatter_is_deterministic_and_in_bounds() {
        let a = ParticleBatch::rain(64, 7);
        let b = ParticleBatch::rain(64, 7);
        assert_eq!(a.positions, b.positions);
        assert_eq!(a.count(), 64);
        for i in 0..a.count() {
            let p = a.position(i).unwrap();
            assert!(p[1] >= RAIN_FLOOR_Y && p[1] < RAIN_CEILING_Y);
            assert!(a.velocities[i] >= RAIN_MIN_FALL && a.velocities[i] < RAIN_MAX_FALL);
        }
        assert_eq!(a.position(64), None);
    }

    #[test]
    fn from_parts_truncates_to_common_count() {
        let b = ParticleBatch::from_parts(ParticleKind::Mist, vec![0.0; 10], vec![1.0; 5], vec![0.0; 2]);
        assert_eq!(b.count(), 2);
        assert_eq!(b.positions.len(), 6);
    }
}
