//! JavaScript-facing particle systems.

use std::cell::RefCell;
use std::rc::Rc;

use candy_core::{
    ComputeParticles, FrameSignals, MaterialParams, ParticleConfig, ParticleKind, SharedModule, UpdatePath,
    WasmParticleSystem, WeatherKind, WeatherState,
};
use glam::Vec3;
use js_sys::Float32Array;
use wasm_bindgen::prelude::*;

use crate::module::JsParticleModule;

/// A probed accelerated module that particle systems can share.
#[wasm_bindgen]
pub struct ParticleModuleHandle {
    inner: Rc<RefCell<JsParticleModule>>,
}

#[wasm_bindgen]
impl ParticleModuleHandle {
    /// Wrap an already instantiated module's `exports` object.
    #[wasm_bindgen(js_name = fromExports)]
    pub fn from_exports(exports: JsValue) -> Result<ParticleModuleHandle, JsError> {
        let module = JsParticleModule::from_exports(&exports)?;
        Ok(Self::wrap(module))
    }

    /// Use this crate's own raw instance exports as the accelerated module.
    /// They take and return plain numbers, so no generated glue is involved.
    #[wasm_bindgen(js_name = builtIn)]
    pub fn built_in() -> Result<ParticleModuleHandle, JsError> {
        Self::from_exports(wasm_bindgen::exports())
    }

    #[wasm_bindgen(getter)]
    pub fn ready(&self) -> bool {
        self.inner.borrow().is_ready()
    }

    /// Mark the module (un)usable; systems fall back to the scalar path while not ready.
    #[wasm_bindgen(js_name = setReady)]
    pub fn set_ready(&self, ready: bool) {
        match self.inner.try_borrow_mut() {
            Ok(mut m) => m.set_ready(ready),
            Err(_) => log::warn!("[module] busy; ready flag unchanged"),
        }
    }
}

impl ParticleModuleHandle {
    fn wrap(module: JsParticleModule) -> Self {
        Self {
            inner: Rc::new(RefCell::new(module)),
        }
    }

    fn shared(&self) -> SharedModule {
        self.inner.clone()
    }
}

/// Fetch-free instantiation from module bytes.
#[wasm_bindgen(js_name = instantiateParticleModule)]
pub async fn instantiate_particle_module(bytes: Vec<u8>) -> Result<ParticleModuleHandle, JsValue> {
    match JsParticleModule::instantiate(&bytes).await {
        Ok(module) => Ok(ParticleModuleHandle::wrap(module)),
        Err(e) => {
            log::warn!("[module] instantiation failed, particles stay on the scalar path: {:#}", e);
            Err(JsValue::from_str(&format!("{e:#}")))
        }
    }
}

fn parse_kind(kind: &str) -> Result<ParticleKind, JsError> {
    match kind {
        "rain" => Ok(ParticleKind::Rain),
        "mist" => Ok(ParticleKind::Mist),
        other => Err(JsError::new(&format!("unknown particle kind {other:?}"))),
    }
}

fn material_array(m: &MaterialParams) -> Vec<f32> {
    vec![m.color[0], m.color[1], m.color[2], m.opacity, m.size]
}

fn path_name(path: UpdatePath) -> String {
    match path {
        UpdatePath::Skipped => "skipped",
        UpdatePath::Scalar => "scalar",
        UpdatePath::Accelerated => "accelerated",
    }
    .to_string()
}

/// Rain, mist and the sparkle fountain for one scene.
#[wasm_bindgen]
pub struct WeatherParticles {
    system: WasmParticleSystem,
    sparkles: ComputeParticles,
}

#[wasm_bindgen]
impl WeatherParticles {
    #[wasm_bindgen(constructor)]
    pub fn new(rain_count: u32, mist_count: u32, sparkle_count: u32, seed: u32) -> WeatherParticles {
        let config = ParticleConfig {
            rain_count: rain_count as usize,
            mist_count: mist_count as usize,
            compute_count: sparkle_count as usize,
            seed: seed as u64,
        };
        Self::from_config(&config)
    }

    #[wasm_bindgen(js_name = withDefaults)]
    pub fn with_defaults() -> WeatherParticles {
        Self::from_config(&ParticleConfig::default())
    }

    #[wasm_bindgen(js_name = attachModule)]
    pub fn attach_module(&mut self, module: &ParticleModuleHandle) {
        self.system.attach_module(module.shared());
        self.sparkles.attach_module(module.shared());
    }

    #[wasm_bindgen(js_name = detachModule)]
    pub fn detach_module(&mut self) {
        self.system.detach_module();
        self.sparkles.detach_module();
    }

    /// Per-frame update. `weather` is one of `clear`, `mist`, `drizzle`,
    /// `thunderstorm`, `storm`.
    pub fn update(&mut self, time: f32, bass: f32, melody: f32, weather: &str, intensity: f32) -> Result<(), JsError> {
        let kind: WeatherKind = weather.parse()?;
        self.system.update(&FrameSignals {
            time,
            bass_intensity: bass,
            melody_volume: melody,
            weather: WeatherState::new(kind, intensity),
        });
        Ok(())
    }

    #[wasm_bindgen(js_name = updateSparkles)]
    pub fn update_sparkles(&mut self, dt: f32, pulse: f32) {
        self.sparkles.update(dt, pulse);
    }

    /// Re-scatter the sparkles from `seed` and restart their clock, e.g. on scene restart.
    #[wasm_bindgen(js_name = resetSparkles)]
    pub fn reset_sparkles(&mut self, seed: u32) {
        self.sparkles.reset(seed as u64);
    }

    #[wasm_bindgen(js_name = setSparkleSpawn)]
    pub fn set_sparkle_spawn(&mut self, x: f32, y: f32, z: f32) {
        self.sparkles.spawn = Vec3::new(x, y, z);
    }

    #[wasm_bindgen(js_name = rainPositions)]
    pub fn rain_positions(&self) -> Float32Array {
        Float32Array::from(self.system.rain().positions.as_slice())
    }

    #[wasm_bindgen(js_name = mistPositions)]
    pub fn mist_positions(&self) -> Float32Array {
        Float32Array::from(self.system.mist().positions.as_slice())
    }

    /// `[x, y, z, life]` per sparkle.
    #[wasm_bindgen(js_name = sparklePositions)]
    pub fn sparkle_positions(&self) -> Float32Array {
        Float32Array::from(self.sparkles.positions.as_slice())
    }

    /// `[r, g, b, opacity, size]`.
    #[wasm_bindgen(js_name = rainMaterial)]
    pub fn rain_material(&self) -> Vec<f32> {
        material_array(&self.system.rain().material)
    }

    #[wasm_bindgen(js_name = mistMaterial)]
    pub fn mist_material(&self) -> Vec<f32> {
        material_array(&self.system.mist().material)
    }

    #[wasm_bindgen(getter, js_name = rainVisible)]
    pub fn rain_visible(&self) -> bool {
        self.system.rain().visible
    }

    #[wasm_bindgen(getter, js_name = mistVisible)]
    pub fn mist_visible(&self) -> bool {
        self.system.mist().visible
    }

    /// `skipped`, `scalar` or `accelerated`.
    #[wasm_bindgen(js_name = lastPath)]
    pub fn last_path(&self, kind: &str) -> Result<String, JsError> {
        Ok(path_name(self.system.last_path(parse_kind(kind)?)))
    }

    #[wasm_bindgen(js_name = rainDropY)]
    pub fn rain_drop_y(&self, start_y: f32, time: f32, speed: f32, cycle_height: f32) -> f32 {
        self.system.rain_drop_y(start_y, time, speed, cycle_height)
    }

    #[wasm_bindgen(js_name = floatingParticle)]
    pub fn floating_particle(&self, x: f32, y: f32, z: f32, time: f32, offset: f32, amplitude: f32) -> Vec<f32> {
        self.system
            .floating_particle(Vec3::new(x, y, z), time, offset, amplitude)
            .to_array()
            .to_vec()
    }

    #[wasm_bindgen(js_name = countWithin)]
    pub fn count_within(&mut self, kind: &str, x: f32, y: f32, z: f32, radius: f32) -> Result<u32, JsError> {
        let kind = parse_kind(kind)?;
        Ok(self.system.count_within(kind, Vec3::new(x, y, z), radius) as u32)
    }

    #[wasm_bindgen(js_name = distancesTo)]
    pub fn distances_to(&mut self, kind: &str, x: f32, y: f32, z: f32) -> Result<Float32Array, JsError> {
        let kind = parse_kind(kind)?;
        Ok(Float32Array::from(self.system.distances_to(kind, Vec3::new(x, y, z)).as_slice()))
    }

    /// Free module memory; the object is unusable afterwards.
    pub fn dispose(self) {
        let Self { system, mut sparkles } = self;
        sparkles.detach_module();
        system.dispose();
    }
}

impl WeatherParticles {
    fn from_config(config: &ParticleConfig) -> Self {
        Self {
            system: WasmParticleSystem::new(config),
            sparkles: ComputeParticles::new(config.compute_count, Vec3::ZERO, config.seed),
        }
    }
}
