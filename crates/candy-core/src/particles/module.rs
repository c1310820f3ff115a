//! The optional accelerated module as seen from the particle systems.
//!
//! Every export is optional and probed at runtime; [`Capabilities`] records
//! what the attached module offers. [`InProcessModule`] implements the same
//! export surface over a [`HeapMemory`] for native builds and tests.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use thiserror::Error;

use super::batch::ParticleKind;
use super::kernels;
use super::memory::{BatchLayout, ComputeLayout, HeapMemory, LinearMemory, MemoryError};

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module does not export `{0}`")]
    MissingExport(&'static str),
    #[error("module could not allocate {0} bytes")]
    OutOfMemory(u32),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("call into module failed: {0}")]
    Call(String),
}

/// Which parts of the export surface are usable right now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Module finished instantiating.
    pub ready: bool,
    pub allocate: bool,
    pub rain_batch: bool,
    pub mist_batch: bool,
    pub compute_batch: bool,
    pub distance_cull: bool,
    pub distances: bool,
    pub rain_drop_y: bool,
    pub floating_particle: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            ready: true,
            allocate: true,
            rain_batch: true,
            mist_batch: true,
            compute_batch: true,
            distance_cull: true,
            distances: true,
            rain_drop_y: true,
            floating_particle: true,
        }
    }

    /// Whether a whole rain/mist batch can go through the module.
    pub fn supports_batch(&self, kind: ParticleKind) -> bool {
        self.ready
            && self.allocate
            && match kind {
                ParticleKind::Rain => self.rain_batch,
                ParticleKind::Mist => self.mist_batch,
            }
    }

    pub fn supports_compute(&self) -> bool {
        self.ready && self.allocate && self.compute_batch
    }
}

/// Whether a batch export's return value reports success. Raw exports
/// return `1` or `0`; wrapped ones may return a boolean or nothing at all.
pub fn batch_accepted(number: Option<f64>, boolean: Option<bool>) -> bool {
    number != Some(0.0) && boolean != Some(false)
}

/// A module handle shared by every particle system on the render thread.
pub type SharedModule = Rc<RefCell<dyn ParticleModule>>;

pub trait ParticleModule {
    fn capabilities(&self) -> Capabilities;

    fn allocate(&mut self, bytes: u32) -> Result<u32, ModuleError>;
    fn free(&mut self, ptr: u32);

    fn memory(&self) -> &dyn LinearMemory;
    fn memory_mut(&mut self) -> &mut dyn LinearMemory;

    fn update_rain_batch(
        &mut self,
        layout: &BatchLayout,
        time: f32,
        bass: f32,
        rain_intensity: f32,
    ) -> Result<(), ModuleError>;

    fn update_mist_batch(&mut self, layout: &BatchLayout, time: f32, melody: f32) -> Result<(), ModuleError>;

    #[allow(clippy::too_many_arguments)]
    fn update_compute_batch(
        &mut self,
        layout: &ComputeLayout,
        dt: f32,
        gravity: f32,
        pulse: f32,
        spawn: Vec3,
        global_time: f32,
    ) -> Result<(), ModuleError>;

    fn distance_cull(
        &mut self,
        positions_ptr: u32,
        flags_ptr: u32,
        count: usize,
        reference: Vec3,
        max_dist_sq: f32,
    ) -> Result<usize, ModuleError>;

    /// Write the distance from each point to `reference` into `results_ptr`.
    fn batch_distances(
        &mut self,
        positions_ptr: u32,
        results_ptr: u32,
        count: usize,
        reference: Vec3,
    ) -> Result<(), ModuleError>;

    fn calc_rain_drop_y(
        &mut self,
        start_y: f32,
        time: f32,
        speed: f32,
        cycle_height: f32,
    ) -> Result<f32, ModuleError>;

    fn calc_floating_particle(
        &mut self,
        base: Vec3,
        time: f32,
        offset: f32,
        amplitude: f32,
    ) -> Result<Vec3, ModuleError>;
}

/// Export surface implemented in-process over a [`HeapMemory`].
#[derive(Debug)]
pub struct InProcessModule {
    memory: HeapMemory,
    caps: Capabilities,
    batch_calls: usize,
}

impl Default for InProcessModule {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessModule {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::all())
    }

    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self::with_memory(HeapMemory::default(), caps)
    }

    pub fn with_memory(memory: HeapMemory, caps: Capabilities) -> Self {
        Self {
            memory,
            caps,
            batch_calls: 0,
        }
    }

    pub fn capabilities_mut(&mut self) -> &mut Capabilities {
        &mut self.caps
    }

    /// Number of successful batch export calls so far.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls
    }

    pub fn live_allocations(&self) -> usize {
        self.memory.live_allocations()
    }

    fn require(&self, present: bool, name: &'static str) -> Result<(), ModuleError> {
        if present {
            Ok(())
        } else {
            Err(ModuleError::MissingExport(name))
        }
    }
}

impl ParticleModule for InProcessModule {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn allocate(&mut self, bytes: u32) -> Result<u32, ModuleError> {
        self.require(self.caps.allocate, "allocate")?;
        self.memory.allocate(bytes).ok_or(ModuleError::OutOfMemory(bytes))
    }

    fn free(&mut self, ptr: u32) {
        self.memory.free(ptr);
    }

    fn memory(&self) -> &dyn LinearMemory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut dyn LinearMemory {
        &mut self.memory
    }

    fn update_rain_batch(
        &mut self,
        layout: &BatchLayout,
        time: f32,
        bass: f32,
        rain_intensity: f32,
    ) -> Result<(), ModuleError> {
        self.require(self.caps.rain_batch, "updateRainBatch")?;
        let n = layout.count;
        let (positions, attrs) = self
            .memory
            .f32_pair_mut((layout.positions(), n * 3), (layout.velocities(), n * 2))?;
        let (velocities, offsets) = attrs.split_at(n);
        kernels::update_rain_batch(positions, velocities, offsets, time, bass, rain_intensity);
        self.batch_calls += 1;
        Ok(())
    }

    fn update_mist_batch(&mut self, layout: &BatchLayout, time: f32, melody: f32) -> Result<(), ModuleError> {
        self.require(self.caps.mist_batch, "updateMistBatch")?;
        let n = layout.count;
        let (positions, attrs) = self
            .memory
            .f32_pair_mut((layout.positions(), n * 3), (layout.velocities(), n * 2))?;
        let (drifts, offsets) = attrs.split_at(n);
        kernels::update_mist_batch(positions, drifts, offsets, time, melody);
        self.batch_calls += 1;
        Ok(())
    }

    fn update_compute_batch(
        &mut self,
        layout: &ComputeLayout,
        dt: f32,
        gravity: f32,
        pulse: f32,
        spawn: Vec3,
        global_time: f32,
    ) -> Result<(), ModuleError> {
        self.require(self.caps.compute_batch, "updateParticlesWasm")?;
        let n = layout.count;
        let (positions, velocities) = self
            .memory
            .f32_pair_mut((layout.positions(), n * 4), (layout.velocities(), n * 4))?;
        kernels::update_compute_batch(positions, velocities, dt, gravity, pulse, spawn, global_time);
        self.batch_calls += 1;
        Ok(())
    }

    fn distance_cull(
        &mut self,
        positions_ptr: u32,
        flags_ptr: u32,
        count: usize,
        reference: Vec3,
        max_dist_sq: f32,
    ) -> Result<usize, ModuleError> {
        self.require(self.caps.distance_cull, "batchDistanceCull")?;
        let mut positions = vec![0.0; count * 3];
        self.memory.read_f32s(positions_ptr, &mut positions)?;
        let flags = self.memory.f32_slice_mut(flags_ptr, count)?;
        Ok(kernels::distance_cull(&positions, flags, reference, max_dist_sq))
    }

    fn batch_distances(
        &mut self,
        positions_ptr: u32,
        results_ptr: u32,
        count: usize,
        reference: Vec3,
    ) -> Result<(), ModuleError> {
        self.require(self.caps.distances, "batchDistances")?;
        let mut positions = vec![0.0; count * 3];
        self.memory.read_f32s(positions_ptr, &mut positions)?;
        let out = self.memory.f32_slice_mut(results_ptr, count)?;
        kernels::distances(&positions, out, reference);
        Ok(())
    }

    fn calc_rain_drop_y(
        &mut self,
        start_y: f32,
        time: f32,
        speed: f32,
        cycle_height: f32,
    ) -> Result<f32, ModuleError> {
        self.require(self.caps.rain_drop_y, "calcRainDropY")?;
        Ok(kernels::calc_rain_drop_y(start_y, time, speed, cycle_height))
    }

    fn calc_floating_particle(
        &mut self,
        base: Vec3,
        time: f32,
        offset: f32,
        amplitude: f32,
    ) -> Result<Vec3, ModuleError> {
        self.require(self.caps.floating_particle, "calcFloatingParticle")?;
        Ok(kernels::calc_floating_particle(base, time, offset, amplitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_false_reject_a_batch() {
        assert!(batch_accepted(Some(1.0), None));
        assert!(batch_accepted(None, Some(true)));
        assert!(batch_accepted(None, None));
        assert!(!batch_accepted(Some(0.0), None));
        assert!(!batch_accepted(None, Some(false)));
    }
}
