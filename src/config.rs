//! Application paths and synchronization settings.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::camera::{DEFAULT_TOLERANCE, ZoomLimits};

/// Settings file name inside the config directory
pub const SETTINGS_FILE: &str = "viewsync.json";

/// Log file name inside the data directory
pub const LOG_FILE: &str = "viewsync.log";

/// Configuration for overriding default application paths
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Create PathConfig from CLI arguments and environment variables
    ///
    /// Priority: CLI args → ENV var (VIEWSYNC_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| {
            std::env::var("VIEWSYNC_CONFIG_DIR")
                .ok()
                .map(PathBuf::from)
        });

        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. VIEWSYNC_CONFIG_DIR environment variable
/// 3. Local folder IF any config files exist (viewsync.json, viewsync.log)
/// 4. Platform-specific config directory from dirs-next (default)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Get path to a data file (logs, etc.)
///
/// Same priority as [`config_file`], falling back to the platform data directory.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
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

fn resolve_dir(config: &PathConfig, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir()
        && has_local_config_files(&current_dir)
    {
        return current_dir;
    }

    if let Some(dir) = platform {
        return dir.join("viewsync");
    }

    PathBuf::from(".")
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir())
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir())
}

/// Synchronization settings, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Near-equality tolerance for camera comparison
    pub tolerance: f32,
    /// Align a newly joined viewport to the group on the next turn
    pub catch_up: bool,
    /// Zoom range for interactive zoom steps
    pub zoom_limits: ZoomLimits,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            catch_up: true,
            zoom_limits: ZoomLimits::default(),
        }
    }
}

impl SyncSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            bail!("tolerance must be a finite, non-negative number (got {})", self.tolerance);
        }
        let ZoomLimits { min, max } = self.zoom_limits;
        if !(min.is_finite() && max.is_finite()) || min <= 0.0 || min > max {
            bail!("invalid zoom limits {}..{}", min, max);
        }
        Ok(())
    }

    /// Load settings from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("viewsync_test_{}_{}", name, std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };

        assert_eq!(config_file("test.json", &config), PathBuf::from("/custom/test.json"));
        assert_eq!(data_file("sync.log", &config), PathBuf::from("/custom/sync.log"));
    }

    #[test]
    fn test_cli_dir_wins_over_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from-cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from-cli")));
    }

    #[test]
    fn test_missing_settings_yield_defaults() {
        let dir = temp_dir("missing");
        let settings = SyncSettings::load(&dir.join("nope.json")).unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.tolerance, DEFAULT_TOLERANCE);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_settings_save_load() {
        let dir = temp_dir("save");
        let path = dir.join(SETTINGS_FILE);
        let settings = SyncSettings {
            tolerance: 0.01,
            catch_up: false,
            ..SyncSettings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(SyncSettings::load(&path).unwrap(), settings);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let dir = temp_dir("partial");
        let path = dir.join(SETTINGS_FILE);
        std::fs::write(&path, r#"{ "tolerance": 0.02 }"#).unwrap();
        let settings = SyncSettings::load(&path).unwrap();
        assert_eq!(settings.tolerance, 0.02);
        assert!(settings.catch_up);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let dir = temp_dir("invalid");
        let path = dir.join(SETTINGS_FILE);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(SyncSettings::load(&path).is_err());

        std::fs::write(&path, r#"{ "tolerance": -1.0 }"#).unwrap();
        let err = SyncSettings::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("tolerance"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_validate_zoom_limits() {
        let mut settings = SyncSettings::default();
        settings.zoom_limits = ZoomLimits { min: 2.0, max: 1.0 };
        assert!(settings.validate().is_err());
        settings.zoom_limits = ZoomLimits { min: 0.0, max: 1.0 };
        assert!(settings.validate().is_err());
    }
}
