use volplay::cli::Args;
use volplay::config::{self, Settings};
use volplay::core::event_bus::{EventBus, SequenceEventEmitter, downcast_event};
use volplay::core::events::{FrameLoadFailedEvent, PlayStateChangedEvent};
use volplay::core::{PlaybackState, VolumeSequence};
use volplay::entities::{RawVolumeSource, VolumeFrame, resolve_data_dir};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound for frame auto-detection
const MAX_DETECTED_FRAMES: usize = 100_000;

fn init_logging(args: &Args, path_config: &config::PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Sink for headless runs: reports what would be uploaded
fn log_frame(index: usize, frame: &VolumeFrame) {
    match frame.value_range() {
        Some((min, max)) => info!(
            "Display frame {} '{}': {} {:?}, range [{:.3}, {:.3}]",
            index,
            frame.name(),
            frame.dims(),
            frame.format(),
            min,
            max
        ),
        None => info!("Display frame {} '{}': empty volume", index, frame.name()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());

    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;

    info!("volplay starting...");
    debug!("Command-line args: {:?}", args);

    let settings_path = config::config_file(config::SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());
    let mut settings = Settings::load(&settings_path)?;
    args.apply_to(&mut settings);
    if args.save_settings {
        settings.save(&settings_path)?;
    }

    let search_roots = [config::config_dir(&path_config)];
    let data_dir = resolve_data_dir(&settings.data_dir, &search_roots);
    let source = RawVolumeSource::new(data_dir, settings.file_pattern.clone());

    let total_frames = match settings.total_frames {
        0 => {
            let detected = source.count_frames(MAX_DETECTED_FRAMES);
            info!("Detected {} frames in {}", detected, source.data_dir().display());
            detected
        }
        n => n,
    };
    if total_frames == 0 {
        bail!(
            "No frames found in {} (pattern {})",
            source.data_dir().display(),
            settings.file_pattern
        );
    }

    let bus = EventBus::new();
    bus.subscribe::<PlayStateChangedEvent, _>(|e| info!("Playback state: {:?}", e.state));
    bus.subscribe::<FrameLoadFailedEvent, _>(|e| warn!("Frame {} failed: {}", e.index, e.error));

    let mut sequence = VolumeSequence::new(Arc::new(source), settings.sequence_options(total_frames));
    sequence.set_event_emitter(SequenceEventEmitter::from_emitter(bus.emitter()));
    sequence.add_sink(log_frame);

    sequence.initialize(settings.autoplay);
    if settings.preload_on_start {
        sequence.preload_all();
    }

    // Default: one pass over the sequence
    let run_for = args.run_duration(total_frames as f32 * sequence.player().seconds_per_frame())?;
    let dt = Duration::from_secs_f64(1.0 / f64::from(args.tick_hz.max(1)));

    println!("{}", sequence.status_line());
    let mut simulated = Duration::ZERO;
    let mut since_status = Duration::ZERO;
    while simulated < run_for {
        let tick_start = Instant::now();
        sequence.update(dt);
        simulated += dt;
        since_status += dt;

        if since_status >= Duration::from_secs(1) {
            since_status = Duration::ZERO;
            println!("{}", sequence.status_line());
        }
        if sequence.state() != PlaybackState::Playing && !sequence.is_loading() && !sequence.is_preloading() {
            break;
        }
        if let Some(rest) = dt.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let stats = sequence.cache_stats();
    let failures = bus
        .poll()
        .iter()
        .filter(|e| downcast_event::<FrameLoadFailedEvent>(e).is_some())
        .count();
    println!("{}", sequence.status_line());
    println!(
        "Cache: {} / {} frames, {} MB, hits {}, misses {}, evictions {}, failed loads {}",
        sequence.cache().len(),
        total_frames,
        sequence.cache().mem() / 1024 / 1024,
        stats.hits(),
        stats.misses(),
        stats.evictions(),
        failures
    );
    Ok(())
}
