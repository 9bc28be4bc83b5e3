//! Persisted playback settings (`volplay.json`)
//!
//! Missing fields fall back to defaults, so older or hand-written files
//! keep loading as new fields are added.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::frame_cache::CachePolicy;
use crate::core::loader::LoadMode;
use crate::core::sequence::SequenceOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder holding the frame files (relative paths resolve against the config dir)
    pub data_dir: PathBuf,
    /// File name pattern, `{0}` is replaced by the frame index
    pub file_pattern: String,
    /// Number of frames; 0 = count files on disk
    pub total_frames: usize,
    pub seconds_per_frame: f32,
    pub autoplay: bool,
    pub loop_enabled: bool,
    /// Decode on the tick (true) or on the load worker (false)
    pub sync_loading: bool,
    /// Background load timeout
    pub load_timeout_secs: u64,
    pub cache_policy: CachePolicy,
    pub preload_on_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("WaterMassData"),
            file_pattern: "water_mass_highlighted_t{0}.raw".to_string(),
            total_frames: 0,
            seconds_per_frame: 1.0,
            autoplay: true,
            loop_enabled: true,
            sync_loading: true,
            load_timeout_secs: 30,
            cache_policy: CachePolicy::KeepAll,
            preload_on_start: false,
        }
    }
}

impl Settings {
    /// Load settings; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write settings: {}", path.display()))?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn load_mode(&self) -> LoadMode {
        if self.sync_loading { LoadMode::Sync } else { LoadMode::Async }
    }

    /// Sequence options for `total_frames` frames (after auto-detection)
    pub fn sequence_options(&self, total_frames: usize) -> SequenceOptions {
        SequenceOptions {
            total_frames,
            seconds_per_frame: self.seconds_per_frame,
            loop_enabled: self.loop_enabled,
            load_mode: self.load_mode(),
            load_timeout: Duration::from_secs(self.load_timeout_secs),
            cache_policy: self.cache_policy,
        }
    }
}
