//! Runtime configuration for the driver
//!
//! Stored as TOML. A missing file yields defaults, so a fresh install runs
//! without any setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lightgun_guns::{JsonFileStore, SurfaceGeometry};
use lightgun_transport::ReaderConfig;
use serde::{Deserialize, Serialize};

/// Complete driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightgunConfig {
    /// Where gun profiles and calibration are kept
    /// (default: `<data_dir>/lightgun`)
    pub store_dir: Option<PathBuf>,
    /// How often presence is re-checked for hot-plug
    pub hotplug_interval_ms: u64,
    /// HID read timeout; bounds how long a closed reader takes to exit
    pub reader_timeout_ms: i32,
    /// How long `detect` and `map-button` wait for input
    pub input_timeout_secs: u64,
    /// Play surface placement on the desktop
    pub surface: SurfaceGeometry,
}

impl Default for LightgunConfig {
    fn default() -> Self {
        Self {
            store_dir: None,
            hotplug_interval_ms: 1000,
            reader_timeout_ms: ReaderConfig::default().read_timeout_ms,
            input_timeout_secs: 30,
            surface: SurfaceGeometry::default(),
        }
    }
}

impl LightgunConfig {
    /// Get default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lightgun")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: LightgunConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn store_dir(&self) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(JsonFileStore::default_dir)
    }

    pub fn hotplug_interval(&self) -> Duration {
        Duration::from_millis(self.hotplug_interval_ms.max(50))
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_secs(self.input_timeout_secs)
    }

    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            read_timeout_ms: self.reader_timeout_ms,
            ..ReaderConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LightgunConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, LightgunConfig::default());
        assert_eq!(config.hotplug_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lightgun").join("config.toml");
        let mut config = LightgunConfig::default();
        config.store_dir = Some(dir.path().join("store"));
        config.surface = SurfaceGeometry::fullscreen(2560.0, 1440.0);
        config.save(&path).unwrap();

        let loaded = LightgunConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.store_dir(), dir.path().join("store"));
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "hotplug_interval_ms = 10\n").unwrap();
        let config = LightgunConfig::load(&path).unwrap();
        // Clamped so a typo cannot spin the loop
        assert_eq!(config.hotplug_interval(), Duration::from_millis(50));
        assert_eq!(config.input_timeout_secs, 30);
    }
}
