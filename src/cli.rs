use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Settings;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "Target: ",
    std::env::consts::ARCH,
    "-",
    std::env::consts::OS
);

/// Time-varying volume sequence player (headless)
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Folder with the frame files and their .ini descriptors
    #[arg(value_name = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Frame file pattern, {0} is replaced by the frame index
    #[arg(short = 'p', long = "pattern", value_name = "PATTERN")]
    pub pattern: Option<String>,

    /// Number of frames (0 = count files on disk)
    #[arg(short = 'n', long = "frames", value_name = "N")]
    pub frames: Option<usize>,

    /// Seconds each frame stays on screen (0.1-5.0)
    #[arg(short = 's', long = "seconds-per-frame", value_name = "SECS")]
    pub seconds_per_frame: Option<f32>,

    /// Enable looping
    #[arg(short = 'o', long = "loop", value_name = "0|1")]
    pub loop_playback: Option<u8>,

    /// Decode frames on the background worker instead of the tick
    #[arg(long = "async")]
    pub async_loading: bool,

    /// Background load timeout in seconds
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Auto-play on startup
    #[arg(short = 'a', long = "autoplay")]
    pub autoplay: bool,

    /// Preload every frame on startup
    #[arg(long = "preload")]
    pub preload: bool,

    /// Stop after this many seconds of simulated time (default: one pass)
    #[arg(short = 'd', long = "duration", value_name = "SECS")]
    pub duration: Option<f32>,

    /// Tick rate of the headless loop
    #[arg(long = "tick-hz", value_name = "HZ", default_value = "60")]
    pub tick_hz: u32,

    /// Save the effective settings to volplay.json
    #[arg(long = "save-settings")]
    pub save_settings: bool,

    /// Enable debug logging to file (default: volplay.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Args {
    /// Simulated run time: `--duration`, else `default_secs`.
    /// Negative, NaN and infinite values are rejected.
    pub fn run_duration(&self, default_secs: f32) -> Result<Duration> {
        let secs = self.duration.unwrap_or(default_secs);
        Duration::try_from_secs_f32(secs).with_context(|| format!("invalid duration: {} s", secs))
    }

    /// Apply command-line overrides on top of persisted settings
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(dir) = &self.data_dir {
            settings.data_dir = dir.clone();
        }
        if let Some(pattern) = &self.pattern {
            settings.file_pattern = pattern.clone();
        }
        if let Some(frames) = self.frames {
            settings.total_frames = frames;
        }
        if let Some(secs) = self.seconds_per_frame {
            settings.seconds_per_frame = secs;
        }
        if let Some(flag) = self.loop_playback {
            settings.loop_enabled = flag != 0;
        }
        if self.async_loading {
            settings.sync_loading = false;
        }
        if let Some(secs) = self.timeout_secs {
            settings.load_timeout_secs = secs;
        }
        if self.autoplay {
            settings.autoplay = true;
        }
        if self.preload {
            settings.preload_on_start = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "volplay", "data", "--frames", "8", "--async", "--loop", "0", "-s", "0.5", "-vv",
        ]);
        let mut settings = Settings::default();
        args.apply_to(&mut settings);

        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.total_frames, 8);
        assert!(!settings.sync_loading);
        assert!(!settings.loop_enabled);
        assert_eq!(settings.seconds_per_frame, 0.5);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.tick_hz, 60);
    }

    #[test]
    fn test_run_duration() {
        let args = Args::parse_from(["volplay"]);
        assert_eq!(args.run_duration(12.0).unwrap(), Duration::from_secs(12));

        let args = Args::parse_from(["volplay", "-d", "2.5"]);
        assert_eq!(args.run_duration(12.0).unwrap(), Duration::from_millis(2500));

        for bad in ["inf", "NaN"] {
            let args = Args::parse_from(["volplay", "--duration", bad]);
            assert!(args.run_duration(12.0).is_err(), "{} accepted", bad);
        }
        let args = Args::parse_from(["volplay", "--duration=-1"]);
        assert!(args.run_duration(12.0).is_err());
    }

    #[test]
    fn test_no_overrides_keep_settings() {
        let args = Args::parse_from(["volplay"]);
        let mut settings = Settings {
            autoplay: false,
            ..Settings::default()
        };
        args.apply_to(&mut settings);
        assert!(!settings.autoplay);
        assert!(settings.sync_loading);
        assert!(args.log_file.is_none());
    }
}
