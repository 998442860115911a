//! Simulation settings with persistence
//!
//! Settings are read from the path given on the command line, or from
//! `~/.config/traverse/sim.toml` when none is given.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};
use traverse_core::TimeConfig;
use traverse_movement::MovementSettings;

/// Everything the headless driver needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    pub time: TimeConfig,
    pub movement: MovementSettings,
    /// Maximum log level unless `RUST_LOG` is set
    pub log_level: String,
    /// Simulated seconds to run
    pub duration: f32,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            time: TimeConfig::default(),
            movement: MovementSettings::default(),
            log_level: "info".to_string(),
            duration: 12.0,
        }
    }
}

impl SimSettings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("traverse"))
    }

    /// Default settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("sim.toml"))
    }

    /// Load settings, or return defaults if the file does not exist
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => {
                    warn!("Could not determine config directory, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            info!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
        settings
            .movement
            .validate()
            .context("Movement settings are invalid")?;
        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to `path`, creating its directory if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Parsed log level, falling back to `INFO`
    pub fn level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("traverse-missing-settings.toml");
        let settings = SimSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.duration, 12.0);
        assert_eq!(settings.level(), Level::INFO);
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("traverse-settings-{}", std::process::id()));
        let path = dir.join("sim.toml");
        let mut settings = SimSettings::default();
        settings.duration = 3.0;
        settings.log_level = "debug".to_string();
        settings.movement.walking.max_walk_speed = 500.0;
        settings.save(&path).unwrap();

        let loaded = SimSettings::load(Some(&path)).unwrap();
        assert_eq!(loaded.duration, 3.0);
        assert_eq!(loaded.level(), Level::DEBUG);
        assert_eq!(loaded.movement.walking.max_walk_speed, 500.0);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_invalid_movement_rejected() {
        let dir = std::env::temp_dir().join(format!("traverse-invalid-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sim.toml");
        fs::write(&path, "[movement.engine]\nmax_simulation_iterations = 0\n").unwrap();
        assert!(SimSettings::load(Some(&path)).is_err());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_unknown_level_falls_back() {
        let settings = SimSettings {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.level(), Level::INFO);
    }
}
