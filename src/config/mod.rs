//! Application paths and persisted settings

pub mod settings;

pub use settings::Settings;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Settings file name
pub const SETTINGS_FILE: &str = "volplay.json";
/// Default log file name
pub const LOG_FILE: &str = "volplay.log";

const APP_DIR: &str = "volplay";

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (VOLPLAY_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var("VOLPLAY_CONFIG_DIR").ok().map(PathBuf::from));

        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. VOLPLAY_CONFIG_DIR environment variable
/// 3. Local folder IF volplay.json or volplay.log exist there
/// 4. Platform-specific config directory from dirs-next (default)
///
/// Platform paths:
/// - Linux: ~/.config/volplay/{name}
/// - macOS: ~/Library/Application Support/volplay/{name}
/// - Windows: %APPDATA%\volplay\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Get path to a data file (logs). Same priority as `config_file`, with
/// the platform data directory as the default.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Config directory (also the root for relative data folders)
pub fn config_dir(config: &PathConfig) -> PathBuf {
    get_config_dir(config)
}

/// Ensure that configuration and data directories exist
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

/// Resolve a directory: explicit override, then local folder, then platform default
fn resolve_dir(config: &PathConfig, cwd: Option<PathBuf>, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Some(cwd) = cwd.filter(|d| has_local_config_files(d)) {
        return cwd;
    }

    platform.map(|d| d.join(APP_DIR)).unwrap_or_else(|| PathBuf::from("."))
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, std::env::current_dir().ok(), dirs_next::config_dir())
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, std::env::current_dir().ok(), dirs_next::data_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_files_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };

        assert_eq!(config_file("test.json", &config), PathBuf::from("/custom/test.json"));
        assert_eq!(data_file(LOG_FILE, &config), PathBuf::from("/custom/volplay.log"));
    }

    #[test]
    fn test_platform_default() {
        let config = PathConfig::default();
        let dir = resolve_dir(&config, None, Some(PathBuf::from("/platform")));
        assert_eq!(dir, PathBuf::from("/platform/volplay"));
        assert_eq!(resolve_dir(&config, None, None), PathBuf::from("."));
    }

    #[test]
    fn test_local_files_priority() {
        let temp_dir = std::env::temp_dir().join(format!("volplay_paths_{}", std::process::id()));
        let _ = fs::remove_dir_all(&temp_dir);
        fs::create_dir_all(&temp_dir).unwrap();
        let config = PathConfig::default();
        let platform = Some(PathBuf::from("/platform"));

        // No local files: platform default
        let dir = resolve_dir(&config, Some(temp_dir.clone()), platform.clone());
        assert_eq!(dir, PathBuf::from("/platform/volplay"));

        // Local settings file: current directory wins
        fs::write(temp_dir.join(SETTINGS_FILE), "{}").unwrap();
        let dir = resolve_dir(&config, Some(temp_dir.clone()), platform);
        assert_eq!(dir, temp_dir);

        let _ = fs::remove_dir_all(&temp_dir);
    }
}
