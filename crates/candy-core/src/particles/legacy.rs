use super::batch::{FrameSignals, ParticleBatch, ParticleConfig};
use super::kernels;
use super::material::{mist_material, mist_visible, rain_material, rain_visible};

/// Scalar weather particles: one loop iteration per point, mutated in place.
#[derive(Clone, Debug)]
pub struct LegacyParticleSystem {
    rain: ParticleBatch,
    mist: ParticleBatch,
}

impl LegacyParticleSystem {
    pub fn new(config: &ParticleConfig) -> Self {
        Self::from_batches(
            ParticleBatch::rain(config.rain_count, config.seed),
            ParticleBatch::mist(config.mist_count, config.seed),
        )
    }

    pub fn from_batches(rain: ParticleBatch, mist: ParticleBatch) -> Self {
        Self { rain, mist }
    }

    pub fn rain(&self) -> &ParticleBatch {
        &self.rain
    }

    pub fn mist(&self) -> &ParticleBatch {
        &self.mist
    }

    pub fn update(&mut self, signals: &FrameSignals) {
        update_rain_scalar(&mut self.rain, signals);
        update_mist_scalar(&mut self.mist, signals);
    }

    pub fn dispose(self) {
        log::debug!(
            "[particles] legacy system released ({} rain, {} mist)",
            self.rain.count(),
            self.mist.count()
        );
    }
}

/// Refresh rain material/visibility and, when visible, advance every drop.
pub(crate) fn update_rain_scalar(batch: &mut ParticleBatch, signals: &FrameSignals) {
    if refresh_rain(batch, signals) {
        advance_rain(batch, signals);
    }
}

pub(crate) fn update_mist_scalar(batch: &mut ParticleBatch, signals: &FrameSignals) {
    if refresh_mist(batch, signals) {
        advance_mist(batch, signals);
    }
}

pub(crate) fn advance_rain(batch: &mut ParticleBatch, signals: &FrameSignals) {
    kernels::update_rain_batch(
        &mut batch.positions,
        &batch.velocities,
        &batch.offsets,
        signals.time,
        signals.bass_intensity,
        signals.weather.rain_intensity(),
    );
}

pub(crate) fn advance_mist(batch: &mut ParticleBatch, signals: &FrameSignals) {
    kernels::update_mist_batch(
        &mut batch.positions,
        &batch.velocities,
        &batch.offsets,
        signals.time,
        signals.melody_volume,
    );
}

/// Returns whether positions should be advanced this frame.
pub(crate) fn refresh_rain(batch: &mut ParticleBatch, signals: &FrameSignals) -> bool {
    batch.material = rain_material(&signals.weather, signals.bass_intensity);
    batch.visible = rain_visible(&signals.weather);
    batch.visible
}

pub(crate) fn refresh_mist(batch: &mut ParticleBatch, signals: &FrameSignals) -> bool {
    batch.material = mist_material(&signals.weather, signals.melody_volume);
    batch.visible = mist_visible(&signals.weather);
    batch.visible
}
