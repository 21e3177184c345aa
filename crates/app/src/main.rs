use std::{
    path::{Path, PathBuf},
    thread,
};

use beatlight_core::{
    hardware_check, ActuationSink, BeatlightError, CancelToken, Config, ConsoleSink, CpalEmitter,
    FrameSource, PlaybackSession, SysfsPwmSink, WavFrameSource,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> beatlight_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            asset,
            looped,
            config,
            pwm_chip,
            dry_run,
        } => run_play(&asset, looped, config.as_deref(), pwm_chip, dry_run),
        Commands::Check { pwm_chip, dry_run } => run_check(pwm_chip, dry_run),
    }
}

fn run_play(
    asset: &Path,
    looped: bool,
    config_path: Option<&Path>,
    pwm_chip: u32,
    dry_run: bool,
) -> beatlight_core::Result<()> {
    let config = load_config(config_path)?;

    // Fail on missing asset or missing hardware before anything plays.
    let source = WavFrameSource::open(asset, &config.audio)?;
    let sink = open_sink(pwm_chip, dry_run, &config)?;
    let emitter = CpalEmitter::open(source.sample_rate(), config.audio.chunk_size)?;

    let cancel = CancelToken::new();
    install_stop_handler(cancel.clone())?;

    tracing::info!(asset = %asset.display(), looped, dry_run, "starting playback");

    let session = PlaybackSession::new(&config, source, emitter, sink, looped, cancel)?;
    let report = session.run()?;

    tracing::info!(
        frames = report.stats.frames_processed,
        beats = report.stats.beats_fired,
        loops = report.stats.loops_completed,
        skipped = report.stats.frames_skipped,
        outcome = ?report.outcome,
        "playback finished"
    );
    Ok(())
}

fn run_check(pwm_chip: u32, dry_run: bool) -> beatlight_core::Result<()> {
    let config = Config::default();
    let mut sink = open_sink(pwm_chip, dry_run, &config)?;

    tracing::info!(dry_run, "running hardware verification sequence");
    hardware_check(&mut sink, &config.lights, thread::sleep)?;
    tracing::info!("verification complete");
    Ok(())
}

fn load_config(path: Option<&Path>) -> beatlight_core::Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn open_sink(
    pwm_chip: u32,
    dry_run: bool,
    config: &Config,
) -> beatlight_core::Result<Box<dyn ActuationSink>> {
    if dry_run {
        Ok(Box::new(ConsoleSink::new(&config.lights)))
    } else {
        Ok(Box::new(SysfsPwmSink::open(pwm_chip, &config.lights)?))
    }
}

fn install_stop_handler(cancel: CancelToken) -> beatlight_core::Result<()> {
    ctrlc::set_handler(move || cancel.cancel())
        .map_err(|err| BeatlightError::device(format!("cannot install stop handler: {err}")))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive PWM light controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a WAV asset while driving the light channels from its energy.
    Play {
        /// Path to the audio asset.
        asset: PathBuf,
        /// Restart the asset from the beginning when it ends.
        #[arg(long = "loop")]
        looped: bool,
        /// Optional JSON configuration file overriding the defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Index of the sysfs PWM chip driving the lights.
        #[arg(long, default_value_t = 0)]
        pwm_chip: u32,
        /// Log duty cycles instead of touching hardware.
        #[arg(long)]
        dry_run: bool,
    },
    /// Drive the lights through the hardware verification sequence.
    Check {
        /// Index of the sysfs PWM chip driving the lights.
        #[arg(long, default_value_t = 0)]
        pwm_chip: u32,
        /// Log duty cycles instead of touching hardware.
        #[arg(long)]
        dry_run: bool,
    },
}
