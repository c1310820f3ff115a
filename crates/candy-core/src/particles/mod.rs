//! Weather particles (rain, mist, sparkles) with scalar and batch update paths.

pub mod accelerated;
pub mod batch;
pub mod compute;
pub mod kernels;
pub mod legacy;
pub mod material;
pub mod memory;
pub mod module;

pub use accelerated::{UpdatePath, WasmParticleSystem};
pub use batch::{FrameSignals, ParticleBatch, ParticleConfig, ParticleKind};
pub use compute::ComputeParticles;
pub use legacy::LegacyParticleSystem;
pub use material::MaterialParams;
pub use memory::{BatchLayout, ComputeLayout, HeapMemory, LinearMemory, LiveBlocks, MemoryError};
pub use module::{batch_accepted, Capabilities, InProcessModule, ModuleError, ParticleModule, SharedModule};
