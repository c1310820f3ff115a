//! [`ParticleModule`] over a WebAssembly instance's export object.

use anyhow::anyhow;
use candy_core::particles::memory::check_f32_access;
use candy_core::{
    batch_accepted, BatchLayout, Capabilities, ComputeLayout, LinearMemory, MemoryError, ModuleError, ParticleModule,
};
use glam::Vec3;
use js_sys::{Array, ArrayBuffer, Float32Array, Function, Object, Reflect, WebAssembly};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

/// The instance's `memory` export. The buffer is re-read on every access
/// because growing the memory detaches the previous one.
pub struct JsMemory {
    memory: WebAssembly::Memory,
}

impl JsMemory {
    fn buffer(&self) -> ArrayBuffer {
        self.memory.buffer().unchecked_into()
    }
}

impl LinearMemory for JsMemory {
    fn size(&self) -> u32 {
        self.buffer().byte_length()
    }

    fn write_f32s(&mut self, byte_offset: u32, data: &[f32]) -> Result<(), MemoryError> {
        check_f32_access(self.size(), byte_offset, data.len())?;
        Float32Array::new_with_byte_offset_and_length(&self.buffer(), byte_offset, data.len() as u32)
            .copy_from(data);
        Ok(())
    }

    fn read_f32s(&self, byte_offset: u32, out: &mut [f32]) -> Result<(), MemoryError> {
        check_f32_access(self.size(), byte_offset, out.len())?;
        Float32Array::new_with_byte_offset_and_length(&self.buffer(), byte_offset, out.len() as u32)
            .copy_to(out);
        Ok(())
    }
}

#[derive(Default)]
struct Exports {
    allocate: Option<Function>,
    deallocate: Option<Function>,
    update_rain_batch: Option<Function>,
    update_mist_batch: Option<Function>,
    update_particles: Option<Function>,
    distance_cull: Option<Function>,
    distances: Option<Function>,
    rain_drop_y: Option<Function>,
    floating_particle: Option<Function>,
}

fn export(exports: &JsValue, name: &str) -> Option<Function> {
    Reflect::get(exports, &JsValue::from_str(name))
        .ok()?
        .dyn_into::<Function>()
        .ok()
}

fn call(f: &Option<Function>, name: &'static str, args: &[f64]) -> Result<JsValue, ModuleError> {
    let f = f.as_ref().ok_or(ModuleError::MissingExport(name))?;
    let args: Array = args.iter().map(|a| JsValue::from_f64(*a)).collect();
    f.apply(&JsValue::NULL, &args)
        .map_err(|e| ModuleError::Call(format!("{name}: {e:?}")))
}

fn check_status(value: JsValue, name: &'static str) -> Result<(), ModuleError> {
    if !batch_accepted(value.as_f64(), value.as_bool()) {
        return Err(ModuleError::Call(format!("{name} rejected its arguments")));
    }
    Ok(())
}

fn as_f32(value: JsValue, name: &'static str) -> Result<f32, ModuleError> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| ModuleError::Call(format!("{name} returned a non-number")))
}

pub struct JsParticleModule {
    memory: JsMemory,
    exports: Exports,
    ready: bool,
    /// Three-float output block for `calcFloatingParticle`.
    scratch: Option<u32>,
}

impl JsParticleModule {
    /// Probe an export object. Only `memory` is required; every function is optional.
    pub fn from_exports(exports: &JsValue) -> Result<Self, ModuleError> {
        let memory = Reflect::get(exports, &JsValue::from_str("memory"))
            .ok()
            .and_then(|m| m.dyn_into::<WebAssembly::Memory>().ok())
            .ok_or(ModuleError::MissingExport("memory"))?;
        let found = Exports {
            allocate: export(exports, "allocate"),
            deallocate: export(exports, "deallocate"),
            update_rain_batch: export(exports, "updateRainBatch"),
            update_mist_batch: export(exports, "updateMistBatch"),
            update_particles: export(exports, "updateParticlesWasm"),
            distance_cull: export(exports, "batchDistanceCull"),
            distances: export(exports, "batchDistances"),
            rain_drop_y: export(exports, "calcRainDropY"),
            floating_particle: export(exports, "calcFloatingParticle"),
        };
        let module = Self {
            memory: JsMemory { memory },
            exports: found,
            ready: true,
            scratch: None,
        };
        log::info!("[module] probed exports: {:?}", module.capabilities());
        Ok(module)
    }

    /// Compile and instantiate module bytes, then probe the resulting exports.
    pub async fn instantiate(bytes: &[u8]) -> anyhow::Result<Self> {
        let imports = Object::new();
        let env = Object::new();
        // AssemblyScript builds import an abort hook
        Reflect::set(&env, &"abort".into(), &Function::new_no_args(""))
            .map_err(|e| anyhow!("imports: {:?}", e))?;
        Reflect::set(&imports, &"env".into(), &env).map_err(|e| anyhow!("imports: {:?}", e))?;

        let result = JsFuture::from(WebAssembly::instantiate_buffer(bytes, &imports))
            .await
            .map_err(|e| anyhow!("instantiate: {:?}", e))?;
        let instance =
            Reflect::get(&result, &"instance".into()).map_err(|e| anyhow!("instance: {:?}", e))?;
        let exports =
            Reflect::get(&instance, &"exports".into()).map_err(|e| anyhow!("exports: {:?}", e))?;
        Ok(Self::from_exports(&exports)?)
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn ensure_scratch(&mut self) -> Result<u32, ModuleError> {
        if let Some(ptr) = self.scratch {
            return Ok(ptr);
        }
        let ptr = self.allocate(3 * 4)?;
        self.scratch = Some(ptr);
        Ok(ptr)
    }
}

impl Drop for JsParticleModule {
    fn drop(&mut self) {
        if let Some(ptr) = self.scratch.take() {
            self.free(ptr);
        }
    }
}

impl ParticleModule for JsParticleModule {
    fn capabilities(&self) -> Capabilities {
        let e = &self.exports;
        let allocate = e.allocate.is_some() && e.deallocate.is_some();
        Capabilities {
            ready: self.ready,
            allocate,
            rain_batch: e.update_rain_batch.is_some(),
            mist_batch: e.update_mist_batch.is_some(),
            compute_batch: e.update_particles.is_some(),
            distance_cull: e.distance_cull.is_some(),
            distances: e.distances.is_some(),
            rain_drop_y: e.rain_drop_y.is_some(),
            floating_particle: allocate && e.floating_particle.is_some(),
        }
    }

    fn allocate(&mut self, bytes: u32) -> Result<u32, ModuleError> {
        let ptr = call(&self.exports.allocate, "allocate", &[bytes as f64])?
            .as_f64()
            .unwrap_or(0.0) as u32;
        if ptr == 0 {
            return Err(ModuleError::OutOfMemory(bytes));
        }
        Ok(ptr)
    }

    fn free(&mut self, ptr: u32) {
        if let Err(e) = call(&self.exports.deallocate, "deallocate", &[ptr as f64]) {
            log::warn!("[module] {}", e);
        }
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
        let status = call(
            &self.exports.update_rain_batch,
            "updateRainBatch",
            &[
                layout.positions() as f64,
                layout.velocities() as f64,
                layout.offsets() as f64,
                layout.count as f64,
                time as f64,
                bass as f64,
                rain_intensity as f64,
            ],
        )?;
        check_status(status, "updateRainBatch")
    }

    fn update_mist_batch(&mut self, layout: &BatchLayout, time: f32, melody: f32) -> Result<(), ModuleError> {
        let status = call(
            &self.exports.update_mist_batch,
            "updateMistBatch",
            &[
                layout.positions() as f64,
                layout.velocities() as f64,
                layout.offsets() as f64,
                layout.count as f64,
                time as f64,
                melody as f64,
            ],
        )?;
        check_status(status, "updateMistBatch")
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
        let status = call(
            &self.exports.update_particles,
            "updateParticlesWasm",
            &[
                layout.positions() as f64,
                layout.velocities() as f64,
                layout.count as f64,
                dt as f64,
                gravity as f64,
                pulse as f64,
                spawn.x as f64,
                spawn.y as f64,
                spawn.z as f64,
                global_time as f64,
            ],
        )?;
        check_status(status, "updateParticlesWasm")
    }

    fn distance_cull(
        &mut self,
        positions_ptr: u32,
        flags_ptr: u32,
        count: usize,
        reference: Vec3,
        max_dist_sq: f32,
    ) -> Result<usize, ModuleError> {
        let n = call(
            &self.exports.distance_cull,
            "batchDistanceCull",
            &[
                positions_ptr as f64,
                flags_ptr as f64,
                count as f64,
                reference.x as f64,
                reference.y as f64,
                reference.z as f64,
                max_dist_sq as f64,
            ],
        )?;
        Ok(as_f32(n, "batchDistanceCull")? as usize)
    }

    fn calc_rain_drop_y(
        &mut self,
        start_y: f32,
        time: f32,
        speed: f32,
        cycle_height: f32,
    ) -> Result<f32, ModuleError> {
        let y = call(
            &self.exports.rain_drop_y,
            "calcRainDropY",
            &[start_y as f64, time as f64, speed as f64, cycle_height as f64],
        )?;
        as_f32(y, "calcRainDropY")
    }

    fn batch_distances(
        &mut self,
        positions_ptr: u32,
        results_ptr: u32,
        count: usize,
        reference: Vec3,
    ) -> Result<(), ModuleError> {
        let status = call(
            &self.exports.distances,
            "batchDistances",
            &[
                positions_ptr as f64,
                results_ptr as f64,
                count as f64,
                reference.x as f64,
                reference.y as f64,
                reference.z as f64,
            ],
        )?;
        check_status(status, "batchDistances")
    }

    fn calc_floating_particle(
        &mut self,
        base: Vec3,
        time: f32,
        offset: f32,
        amplitude: f32,
    ) -> Result<Vec3, ModuleError> {
        if self.exports.floating_particle.is_none() {
            return Err(ModuleError::MissingExport("calcFloatingParticle"));
        }
        let out = self.ensure_scratch()?;
        let status = call(
            &self.exports.floating_particle,
            "calcFloatingParticle",
            &[
                out as f64,
                base.x as f64,
                base.y as f64,
                base.z as f64,
                time as f64,
                offset as f64,
                amplitude as f64,
            ],
        )?;
        check_status(status, "calcFloatingParticle")?;
        let mut xyz = [0.0; 3];
        self.memory.read_f32s(out, &mut xyz)?;
        Ok(Vec3::from_array(xyz))
    }
}
