use glam::Vec3;
use rand::prelude::*;

use super::accelerated::UpdatePath;
use super::kernels;
use super::memory::ComputeLayout;
use super::module::{ModuleError, ParticleModule, SharedModule};
use crate::constants::COMPUTE_GRAVITY;

/// Audio-reactive sparkle fountain with gravity, life decay and respawn.
///
/// Uses the same per-call path selection as
/// [`WasmParticleSystem`](super::accelerated::WasmParticleSystem): the
/// module's `updateParticlesWasm` export when available, otherwise the scalar
/// kernel.
pub struct ComputeParticles {
    /// `[x, y, z, life]` per particle.
    pub positions: Vec<f32>,
    /// `[vx, vy, vz, speed]` per particle.
    pub velocities: Vec<f32>,
    pub spawn: Vec3,
    pub gravity: f32,
    global_time: f32,
    layout: Option<ComputeLayout>,
    module: Option<SharedModule>,
    last_path: UpdatePath,
}

impl ComputeParticles {
    pub fn new(count: usize, spawn: Vec3, seed: u64) -> Self {
        let (positions, velocities) = scatter(count, spawn, seed);
        Self {
            positions,
            velocities,
            spawn,
            gravity: COMPUTE_GRAVITY,
            global_time: 0.0,
            layout: None,
            module: None,
            last_path: UpdatePath::Skipped,
        }
    }

    /// Re-scatter every particle from `seed` and restart the respawn clock.
    /// The module allocation is kept since the count does not change.
    pub fn reset(&mut self, seed: u64) {
        let (positions, velocities) = scatter(self.count(), self.spawn, seed);
        self.positions = positions;
        self.velocities = velocities;
        self.global_time = 0.0;
    }

    pub fn count(&self) -> usize {
        self.positions.len() / 4
    }

    pub fn global_time(&self) -> f32 {
        self.global_time
    }

    pub fn last_path(&self) -> UpdatePath {
        self.last_path
    }

    pub fn attach_module(&mut self, module: SharedModule) {
        self.detach_module();
        self.module = Some(module);
    }

    pub fn detach_module(&mut self) -> Option<SharedModule> {
        let module = self.module.take()?;
        if let Some(layout) = self.layout.take() {
            match module.try_borrow_mut() {
                Ok(mut m) => m.free(layout.base),
                Err(_) => log::warn!("[compute] module busy during detach; allocation leaked"),
            }
        }
        Some(module)
    }

    /// Advance by `dt` seconds with the current audio `pulse` in \[0, 1\].
    pub fn update(&mut self, dt: f32, pulse: f32) {
        self.global_time += kernels::clamp_dt(dt);

        let mut path = UpdatePath::Scalar;
        if let Some(module) = self.module.clone() {
            if let Ok(mut m) = module.try_borrow_mut() {
                if self.count() > 0 && m.capabilities().supports_compute() {
                    match self.run_batch(&mut *m, dt, pulse) {
                        Ok(()) => path = UpdatePath::Accelerated,
                        Err(e) => log::warn!("[compute] batch failed, using scalar loop: {}", e),
                    }
                }
            }
        }
        if path == UpdatePath::Scalar {
            kernels::update_compute_batch(
                &mut self.positions,
                &mut self.velocities,
                dt,
                self.gravity,
                pulse,
                self.spawn,
                self.global_time,
            );
        }
        if path != self.last_path {
            log::info!("[compute] now updating via {:?} path", path);
        }
        self.last_path = path;
    }

    fn run_batch(&mut self, module: &mut dyn ParticleModule, dt: f32, pulse: f32) -> Result<(), ModuleError> {
        let layout = match self.layout {
            Some(l) => l,
            None => {
                let count = self.count();
                let base = module.allocate(ComputeLayout::bytes_for(count))?;
                let l = ComputeLayout { base, count };
                self.layout = Some(l);
                l
            }
        };
        {
            let mem = module.memory_mut();
            mem.write_f32s(layout.positions(), &self.positions)?;
            mem.write_f32s(layout.velocities(), &self.velocities)?;
        }
        module.update_compute_batch(&layout, dt, self.gravity, pulse, self.spawn, self.global_time)?;
        let mem = module.memory();
        // Read into scratch first so a failed read leaves both arrays untouched
        let mut positions = vec![0.0; self.positions.len()];
        let mut velocities = vec![0.0; self.velocities.len()];
        mem.read_f32s(layout.positions(), &mut positions)?;
        mem.read_f32s(layout.velocities(), &mut velocities)?;
        self.positions = positions;
        self.velocities = velocities;
        Ok(())
    }
}

fn scatter(count: usize, spawn: Vec3, seed: u64) -> (Vec<f32>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut positions = Vec::with_capacity(count * 4);
    let mut velocities = Vec::with_capacity(count * 4);
    for _ in 0..count {
        positions.extend_from_slice(&[spawn.x, spawn.y, spawn.z, rng.gen_range(0.0..1.0)]);
        velocities.extend_from_slice(&[
            rng.gen_range(-2.0..2.0),
            rng.gen_range(3.0..7.0),
            rng.gen_range(-2.0..2.0),
            1.0,
        ]);
    }
    (positions, velocities)
}

impl Drop for ComputeParticles {
    fn drop(&mut self) {
        self.detach_module();
    }
}
