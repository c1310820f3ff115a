#![cfg(target_arch = "wasm32")]
//! Browser front end: the accelerated particle exports, JS-facing particle
//! systems and the tracker audio worklet.

use wasm_bindgen::prelude::*;

pub mod exports;
pub mod module;
pub mod particles;
pub mod worklet;

pub use module::{JsMemory, JsParticleModule};
pub use particles::{ParticleModuleHandle, WeatherParticles};
pub use worklet::{OpenMptDecoder, OpenMptFactory, PortSink, TrackerWorklet};

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info).ok();
    log::info!("candy-web starting");
    Ok(())
}
