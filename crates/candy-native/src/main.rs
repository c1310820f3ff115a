use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context;
use candy_core::constants::{DEFAULT_PARTICLE_SEED, DEFAULT_SAMPLE_RATE};
use candy_core::tracker::{ProcessorConfig, ReplayFactory, TrackerProcessor};
use candy_core::{
    ComputeParticles, FrameSignals, InProcessModule, Inbound, LegacyParticleSystem, LoadRequest, Outbound,
    ParticleConfig, ParticleKind, SharedModule, UpdatePath, WasmParticleSystem, WeatherKind, WeatherState,
};
use clap::{Parser, Subcommand};
use glam::Vec3;
use instant::Instant;

#[derive(Parser)]
#[command(name = "candy-native")]
#[command(about = "Headless checks for the candy world particles and tracker visuals", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both particle update paths through every weather mode and compare them
    Particles {
        /// Frames to simulate per weather mode
        #[arg(long, default_value_t = 600)]
        frames: usize,

        /// Seed for the initial point clouds
        #[arg(long, default_value_t = DEFAULT_PARTICLE_SEED)]
        seed: u64,
    },

    /// Replay a JSON pattern dump through the worklet processor, printing messages as JSON lines
    Replay {
        /// Pattern dump file
        dump: PathBuf,

        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        /// Frames per audio block
        #[arg(long, default_value_t = 128)]
        block: usize,

        /// Only print updates where some channel triggered
        #[arg(long)]
        triggers_only: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Particles { frames, seed } => run_particles(frames, seed),
        Commands::Replay {
            dump,
            sample_rate,
            block,
            triggers_only,
        } => run_replay(&dump, sample_rate, block, triggers_only),
    }
}

fn max_divergence(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

fn run_particles(frames: usize, seed: u64) -> anyhow::Result<()> {
    let config = ParticleConfig {
        seed,
        ..ParticleConfig::default()
    };
    let started = Instant::now();
    let mut worst = 0.0f32;

    for kind in WeatherKind::ALL {
        let mut legacy = LegacyParticleSystem::new(&config);
        let mut accelerated = WasmParticleSystem::new(&config);
        let module: SharedModule = Rc::new(RefCell::new(InProcessModule::new()));
        accelerated.attach_module(module);

        let mut rain_frames = 0;
        let mut mist_frames = 0;
        for frame in 0..frames {
            let t = frame as f32 / 60.0;
            // Ramp intensity up then down so visibility crosses its threshold both ways
            let ramp = 1.0 - (2.0 * frame as f32 / frames.max(1) as f32 - 1.0).abs();
            let signals = FrameSignals {
                time: t,
                bass_intensity: (t * 2.0).sin().abs(),
                melody_volume: (t * 0.7).cos().abs(),
                weather: WeatherState::new(kind, ramp),
            };
            legacy.update(&signals);
            accelerated.update(&signals);
            rain_frames += usize::from(legacy.rain().visible);
            mist_frames += usize::from(legacy.mist().visible);
        }

        let rain_div = max_divergence(&legacy.rain().positions, &accelerated.rain().positions);
        let mist_div = max_divergence(&legacy.mist().positions, &accelerated.mist().positions);
        worst = worst.max(rain_div).max(mist_div);
        println!(
            "{:<13} rain visible {:>4}/{frames} ({:?})  mist visible {:>4}/{frames} ({:?})  divergence {:.2e}",
            kind.as_str(),
            rain_frames,
            accelerated.last_path(ParticleKind::Rain),
            mist_frames,
            accelerated.last_path(ParticleKind::Mist),
            rain_div.max(mist_div),
        );
        accelerated.dispose();
    }

    let mut scalar = ComputeParticles::new(config.compute_count, Vec3::Y, seed);
    let mut batched = ComputeParticles::new(config.compute_count, Vec3::Y, seed);
    batched.attach_module(Rc::new(RefCell::new(InProcessModule::new())));
    for frame in 0..frames {
        let pulse = if frame % 30 == 0 { 1.0 } else { 0.1 };
        scalar.update(1.0 / 60.0, pulse);
        batched.update(1.0 / 60.0, pulse);
    }
    let compute_div = max_divergence(&scalar.positions, &batched.positions);
    worst = worst.max(compute_div);
    println!(
        "{:<13} {} particles via {:?}  divergence {:.2e}",
        "sparkles",
        batched.count(),
        batched.last_path(),
        compute_div
    );

    log::info!("[harness] {} frames per mode in {:?}", frames, started.elapsed());
    if batched.count() > 0 && batched.last_path() != UpdatePath::Accelerated {
        log::warn!("[harness] sparkles never took the accelerated path");
    }
    anyhow::ensure!(worst < 1e-4, "update paths diverged by {worst}");
    Ok(())
}

fn run_replay(dump: &Path, sample_rate: u32, block: usize, triggers_only: bool) -> anyhow::Result<()> {
    anyhow::ensure!(block > 0, "block size must be positive");
    let bytes = std::fs::read(dump).with_context(|| format!("reading {}", dump.display()))?;
    let file_name = dump
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut processor = TrackerProcessor::new(ReplayFactory, ProcessorConfig { sample_rate });
    let mut outbox: Vec<Outbound> = Vec::new();
    processor.announce_ready(&mut outbox);
    processor.handle_message(Inbound::Load(LoadRequest { file_data: bytes, file_name }));
    anyhow::ensure!(processor.is_playing(), "could not load {}", dump.display());

    let mut left = vec![0.0f32; block];
    let mut right = vec![0.0f32; block];
    let mut blocks = 0usize;
    let mut ended = false;
    while !ended {
        processor.process(&mut left, &mut right, &mut outbox);
        blocks += 1;
        for message in outbox.drain(..) {
            ended |= message == Outbound::SongEnd;
            let skip = triggers_only && matches!(&message, Outbound::VisualUpdate(u) if !u.any_trigger);
            if !skip {
                println!("{}", message.to_json()?);
            }
        }
    }
    log::info!(
        "[harness] replayed {} blocks ({:.1}s of audio)",
        blocks,
        (blocks * block) as f64 / sample_rate.max(1) as f64
    );
    Ok(())
}
