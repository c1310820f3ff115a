//! Weather particles with an optional batch path through a foreign module.
//!
//! Each frame and for each batch the path is chosen afresh: if a module is
//! attached, reports itself ready and offers allocation plus the batch export
//! for that kind, the batch arrays are copied into module memory, updated by a
//! single call, and the positions copied back. Otherwise, or when any module
//! call fails, the scalar loop runs for that batch instead.

use glam::Vec3;

use super::batch::{FrameSignals, ParticleBatch, ParticleConfig, ParticleKind};
use super::kernels;
use super::legacy::{advance_mist, advance_rain, refresh_mist, refresh_rain};
use super::memory::BatchLayout;
use super::module::{Capabilities, ModuleError, ParticleModule, SharedModule};

/// How a batch was handled on the most recent update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdatePath {
    /// Batch was invisible; positions were left as they were.
    #[default]
    Skipped,
    Scalar,
    Accelerated,
}

/// Module-side allocations belonging to one batch.
#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    layout: Option<BatchLayout>,
    scratch: Option<u32>,
    last_path: UpdatePath,
    last_active_path: Option<UpdatePath>,
}

pub struct WasmParticleSystem {
    rain: ParticleBatch,
    mist: ParticleBatch,
    rain_slot: Slot,
    mist_slot: Slot,
    module: Option<SharedModule>,
}

impl WasmParticleSystem {
    pub fn new(config: &ParticleConfig) -> Self {
        Self::from_batches(
            ParticleBatch::rain(config.rain_count, config.seed),
            ParticleBatch::mist(config.mist_count, config.seed),
        )
    }

    pub fn from_batches(rain: ParticleBatch, mist: ParticleBatch) -> Self {
        Self {
            rain,
            mist,
            rain_slot: Slot::default(),
            mist_slot: Slot::default(),
            module: None,
        }
    }

    pub fn rain(&self) -> &ParticleBatch {
        &self.rain
    }

    pub fn mist(&self) -> &ParticleBatch {
        &self.mist
    }

    pub fn last_path(&self, kind: ParticleKind) -> UpdatePath {
        match kind {
            ParticleKind::Rain => self.rain_slot.last_path,
            ParticleKind::Mist => self.mist_slot.last_path,
        }
    }

    pub fn has_module(&self) -> bool {
        self.module.is_some()
    }

    /// Attach a module; any previously attached module is released first.
    pub fn attach_module(&mut self, module: SharedModule) {
        self.detach_module();
        self.module = Some(module);
    }

    /// Release this system's allocations and hand the module back.
    pub fn detach_module(&mut self) -> Option<SharedModule> {
        let module = self.module.take()?;
        match module.try_borrow_mut() {
            Ok(mut m) => {
                for slot in [&mut self.rain_slot, &mut self.mist_slot] {
                    release_slot(&mut *m, slot);
                }
            }
            Err(_) => {
                log::warn!("[particles] module busy during detach; allocations leaked");
                self.rain_slot = Slot::default();
                self.mist_slot = Slot::default();
            }
        }
        Some(module)
    }

    pub fn update(&mut self, signals: &FrameSignals) {
        self.update_kind(ParticleKind::Rain, signals);
        self.update_kind(ParticleKind::Mist, signals);
    }

    fn update_kind(&mut self, kind: ParticleKind, signals: &FrameSignals) {
        let (batch, slot) = match kind {
            ParticleKind::Rain => (&mut self.rain, &mut self.rain_slot),
            ParticleKind::Mist => (&mut self.mist, &mut self.mist_slot),
        };

        let advance = match kind {
            ParticleKind::Rain => refresh_rain(batch, signals),
            ParticleKind::Mist => refresh_mist(batch, signals),
        };
        if !advance {
            slot.last_path = UpdatePath::Skipped;
            return;
        }

        let mut path = UpdatePath::Scalar;
        if let Some(module) = &self.module {
            if let Ok(mut m) = module.try_borrow_mut() {
                if batch.count() > 0 && m.capabilities().supports_batch(kind) {
                    match run_batch(&mut *m, slot, batch, signals) {
                        Ok(()) => path = UpdatePath::Accelerated,
                        Err(e) => log::warn!("[particles] {:?} batch failed, using scalar loop: {}", kind, e),
                    }
                }
            }
        }

        if path == UpdatePath::Scalar {
            match kind {
                ParticleKind::Rain => advance_rain(batch, signals),
                ParticleKind::Mist => advance_mist(batch, signals),
            }
        }

        if slot.last_active_path != Some(path) {
            log::info!("[particles] {:?} now updating via {:?} path", kind, path);
            slot.last_active_path = Some(path);
        }
        slot.last_path = path;
    }

    /// Single-value drop height, preferring the module's export.
    pub fn rain_drop_y(&self, start_y: f32, time: f32, speed: f32, cycle_height: f32) -> f32 {
        self.with_module(
            |caps| caps.rain_drop_y,
            |m| m.calc_rain_drop_y(start_y, time, speed, cycle_height),
        )
        .unwrap_or_else(|| kernels::calc_rain_drop_y(start_y, time, speed, cycle_height))
    }

    /// Single floating-particle position, preferring the module's export.
    pub fn floating_particle(&self, base: Vec3, time: f32, offset: f32, amplitude: f32) -> Vec3 {
        self.with_module(
            |caps| caps.floating_particle,
            |m| m.calc_floating_particle(base, time, offset, amplitude),
        )
        .unwrap_or_else(|| kernels::calc_floating_particle(base, time, offset, amplitude))
    }

    /// Number of points of `kind` within `radius` of `reference`.
    pub fn count_within(&mut self, kind: ParticleKind, reference: Vec3, radius: f32) -> usize {
        let max_dist_sq = radius * radius;
        let (batch, slot) = match kind {
            ParticleKind::Rain => (&self.rain, &mut self.rain_slot),
            ParticleKind::Mist => (&self.mist, &mut self.mist_slot),
        };
        if let Some(module) = &self.module {
            if let Ok(mut m) = module.try_borrow_mut() {
                let caps = m.capabilities();
                if batch.count() > 0 && caps.ready && caps.allocate && caps.distance_cull {
                    match cull_batch(&mut *m, slot, batch, reference, max_dist_sq) {
                        Ok(n) => return n,
                        Err(e) => log::warn!("[particles] distance cull failed, using scalar loop: {}", e),
                    }
                }
            }
        }
        let mut flags = vec![0.0; batch.count()];
        kernels::distance_cull(&batch.positions, &mut flags, reference, max_dist_sq)
    }

    /// Distance from every point of `kind` to `reference`.
    pub fn distances_to(&mut self, kind: ParticleKind, reference: Vec3) -> Vec<f32> {
        let (batch, slot) = match kind {
            ParticleKind::Rain => (&self.rain, &mut self.rain_slot),
            ParticleKind::Mist => (&self.mist, &mut self.mist_slot),
        };
        if let Some(module) = &self.module {
            if let Ok(mut m) = module.try_borrow_mut() {
                let caps = m.capabilities();
                if batch.count() > 0 && caps.ready && caps.allocate && caps.distances {
                    match distances_batch(&mut *m, slot, batch, reference) {
                        Ok(d) => return d,
                        Err(e) => log::warn!("[particles] distance batch failed, using scalar loop: {}", e),
                    }
                }
            }
        }
        let mut out = vec![0.0; batch.count()];
        kernels::distances(&batch.positions, &mut out, reference);
        out
    }

    /// Free module allocations and drop the particle arrays.
    pub fn dispose(mut self) {
        self.detach_module();
    }

    fn with_module<T>(
        &self,
        has_export: impl Fn(&Capabilities) -> bool,
        call: impl FnOnce(&mut dyn ParticleModule) -> Result<T, ModuleError>,
    ) -> Option<T> {
        let module = self.module.as_ref()?;
        let mut m = module.try_borrow_mut().ok()?;
        let caps = m.capabilities();
        if !caps.ready || !has_export(&caps) {
            return None;
        }
        match call(&mut *m) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("[particles] module helper failed: {}", e);
                None
            }
        }
    }
}

impl Drop for WasmParticleSystem {
    fn drop(&mut self) {
        self.detach_module();
    }
}

fn ensure_layout(
    module: &mut dyn ParticleModule,
    slot: &mut Slot,
    count: usize,
) -> Result<BatchLayout, ModuleError> {
    if let Some(layout) = slot.layout {
        return Ok(layout);
    }
    let bytes = BatchLayout::bytes_for(count);
    let base = module.allocate(bytes)?;
    let layout = BatchLayout { base, count };
    log::debug!("[particles] allocated {} bytes at {} for {} points", bytes, base, count);
    slot.layout = Some(layout);
    Ok(layout)
}

fn run_batch(
    module: &mut dyn ParticleModule,
    slot: &mut Slot,
    batch: &mut ParticleBatch,
    signals: &FrameSignals,
) -> Result<(), ModuleError> {
    let layout = ensure_layout(module, slot, batch.count())?;
    {
        let mem = module.memory_mut();
        mem.write_f32s(layout.positions(), &batch.positions)?;
        mem.write_f32s(layout.velocities(), &batch.velocities)?;
        mem.write_f32s(layout.offsets(), &batch.offsets)?;
    }
    match batch.kind() {
        ParticleKind::Rain => module.update_rain_batch(
            &layout,
            signals.time,
            signals.bass_intensity,
            signals.weather.rain_intensity(),
        )?,
        ParticleKind::Mist => module.update_mist_batch(&layout, signals.time, signals.melody_volume)?,
    }
    module.memory().read_f32s(layout.positions(), &mut batch.positions)?;
    Ok(())
}

fn cull_batch(
    module: &mut dyn ParticleModule,
    slot: &mut Slot,
    batch: &ParticleBatch,
    reference: Vec3,
    max_dist_sq: f32,
) -> Result<usize, ModuleError> {
    let layout = ensure_layout(module, slot, batch.count())?;
    let flags = ensure_scratch(module, slot, batch.count())?;
    module
        .memory_mut()
        .write_f32s(layout.positions(), &batch.positions)?;
    module.distance_cull(layout.positions(), flags, batch.count(), reference, max_dist_sq)
}

fn distances_batch(
    module: &mut dyn ParticleModule,
    slot: &mut Slot,
    batch: &ParticleBatch,
    reference: Vec3,
) -> Result<Vec<f32>, ModuleError> {
    let layout = ensure_layout(module, slot, batch.count())?;
    let results = ensure_scratch(module, slot, batch.count())?;
    module
        .memory_mut()
        .write_f32s(layout.positions(), &batch.positions)?;
    module.batch_distances(layout.positions(), results, batch.count(), reference)?;
    let mut out = vec![0.0; batch.count()];
    module.memory().read_f32s(results, &mut out)?;
    Ok(out)
}

/// One float per point, shared by cull flags and distance results.
fn ensure_scratch(module: &mut dyn ParticleModule, slot: &mut Slot, count: usize) -> Result<u32, ModuleError> {
    if let Some(ptr) = slot.scratch {
        return Ok(ptr);
    }
    let ptr = module.allocate((count as u32).saturating_mul(4))?;
    slot.scratch = Some(ptr);
    Ok(ptr)
}

fn release_slot(module: &mut dyn ParticleModule, slot: &mut Slot) {
    if let Some(layout) = slot.layout.take() {
        module.free(layout.base);
    }
    if let Some(ptr) = slot.scratch.take() {
        module.free(ptr);
    }
}
