// Shared weather/particle tuning constants used by both web and native frontends.

// Particle counts
pub const DEFAULT_RAIN_COUNT: usize = 500;
pub const DEFAULT_MIST_COUNT: usize = 300;
pub const DEFAULT_COMPUTE_COUNT: usize = 256;
pub const DEFAULT_PARTICLE_SEED: u64 = 0xC0FF_EE15_CA4D_1E5;

// Rain volume (world units)
pub const RAIN_EXTENT: f32 = 50.0; // half-width of the x/z square
pub const RAIN_FLOOR_Y: f32 = 0.0;
pub const RAIN_CEILING_Y: f32 = 50.0;

// Rain motion
pub const RAIN_MIN_FALL: f32 = 0.3; // units per frame
pub const RAIN_MAX_FALL: f32 = 0.8;
pub const RAIN_STORM_SPEEDUP: f32 = 1.5; // extra fall speed at full rain intensity
pub const RAIN_SWAY: f32 = 0.02; // lateral sway amplitude per frame

// Mist volume
pub const MIST_EXTENT: f32 = 40.0;
pub const MIST_MIN_Y: f32 = 0.5;
pub const MIST_MAX_Y: f32 = 6.0;

// Mist motion
pub const MIST_DRIFT: f32 = 0.01;
pub const MIST_BOB: f32 = 0.005;
pub const MIST_MIN_DRIFT_SCALE: f32 = 0.5;
pub const MIST_MAX_DRIFT_SCALE: f32 = 1.5;

// Visibility thresholds on the triggering signal
pub const RAIN_VISIBILITY_THRESHOLD: f32 = 0.05;
pub const MIST_VISIBILITY_THRESHOLD: f32 = 0.05;

// Pastel palette
pub const RAIN_COLOR: [f32; 3] = [0.6, 0.8, 1.0];
pub const STORM_RAIN_COLOR: [f32; 3] = [0.45, 0.55, 0.75];
pub const MIST_COLOR: [f32; 3] = [0.9, 0.9, 1.0];
pub const MIST_MELODY_COLOR: [f32; 3] = [1.0, 0.85, 0.95];

// Compute particles (sparkle fountains)
pub const COMPUTE_MAX_DT: f32 = 0.1; // clamp to avoid explosions after tab switches
pub const COMPUTE_LIFE_DECAY: f32 = 0.3; // life per second
pub const COMPUTE_AUDIO_BOOST: f32 = 2.0;
pub const COMPUTE_RESPAWN_RADIUS: f32 = 10.0;
pub const COMPUTE_GRAVITY: f32 = -9.8;

// Tracker timing
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_TRACKER_SPEED: u32 = 6; // ticks per row
pub const DEFAULT_TRACKER_BPM: f32 = 125.0;
