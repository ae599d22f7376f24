//! Engine configuration.
//!
//! Provides the runner's frame, GPU and file settings plus the effects
//! tunables. Configuration can be loaded from and saved to a TOML file.

use flare_effects::EffectsConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration file name.
const CONFIG_FILE: &str = "flare.toml";

/// Engine configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Run Settings ===
    /// Number of frames to simulate
    pub frame_count: u32,
    /// Fixed frame delta time in seconds
    pub delta_time: f32,
    /// Effect document to load (None = built-in demo)
    pub document_path: Option<PathBuf>,
    /// Where to save the effect document after the run
    pub output_path: Option<PathBuf>,

    // === GPU Settings ===
    /// Enable GPU validation layers
    pub gpu_validation: bool,
    /// Record dispatches without a GPU when no adapter is available
    pub allow_dry_run: bool,

    // === Effects Settings ===
    /// Pool, extraction and dispatch tunables
    pub effects: EffectsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_count: 240,
            delta_time: 1.0 / 60.0,
            document_path: None,
            output_path: None,
            gpu_validation: cfg!(debug_assertions),
            allow_dry_run: true,
            effects: EffectsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                },
                Err(e) => {
                    warn!("Failed to parse config file: {e}");
                    Self::default()
                },
            },
            Err(e) => {
                warn!("Failed to read config file: {e}");
                Self::default()
            },
        }
    }

    /// Load configuration from the default file location, writing the
    /// defaults there first if no file exists yet.
    pub fn load_or_init() -> Self {
        let path = Self::config_path();
        if path.exists() {
            return Self::load_from(path);
        }

        let config = Self::default();
        if let Err(e) = config.save_to(&path) {
            warn!("Failed to write default config: {e}");
        }
        config
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path.
    fn config_path() -> PathBuf {
        config_path_in(dirs::config_dir().as_deref())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.frame_count = self.frame_count.clamp(1, 1_000_000);
        if !(self.delta_time.is_finite() && self.delta_time > 0.0) {
            self.delta_time = 1.0 / 60.0;
        }
        self.delta_time = self.delta_time.min(1.0);
        self.effects.validate();
    }
}

/// Config file under `base/flare`, or in the working directory without one.
fn config_path_in(base: Option<&Path>) -> PathBuf {
    match base {
        Some(dir) => dir.join("flare").join(CONFIG_FILE),
        None => PathBuf::from(CONFIG_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.frame_count, 240);
        assert!(config.document_path.is_none());
        assert_eq!(config.effects, EffectsConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig {
            frame_count: 0,
            delta_time: -1.0,
            ..EngineConfig::default()
        };
        config.effects.coplanar_threshold = 5.0;

        config.validate();

        assert_eq!(config.frame_count, 1);
        assert!((config.delta_time - 1.0 / 60.0).abs() < f32::EPSILON);
        assert!((config.effects.coplanar_threshold - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let mut config = EngineConfig::default();
        config.frame_count = 10;
        config.document_path = Some(PathBuf::from("effects/fire.json"));
        config.effects.pool_capacity = 4096;

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = EngineConfig::load_from(&config_path);
        assert_eq!(loaded.frame_count, 10);
        assert_eq!(loaded.document_path, Some(PathBuf::from("effects/fire.json")));
        assert_eq!(loaded.effects.pool_capacity, 4096);
    }

    #[test]
    fn test_config_path_layout() {
        let base = Path::new("/home/user/.config");
        assert_eq!(
            config_path_in(Some(base)),
            base.join("flare").join("flare.toml")
        );
        assert_eq!(config_path_in(None), PathBuf::from("flare.toml"));
        assert!(EngineConfig::config_path().ends_with("flare.toml"));
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = EngineConfig::load_from("/nonexistent/path/flare.toml");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_config_load_invalid_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("broken.toml");
        fs::write(&config_path, "frame_count = \"many\"").expect("write");

        let config = EngineConfig::load_from(&config_path);
        assert_eq!(config.frame_count, 240);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            frame_count = 5

            [effects]
            max_mesh_triangles = 64
            "#,
        )
        .expect("parse");

        assert_eq!(config.frame_count, 5);
        assert_eq!(config.effects.max_mesh_triangles, 64);
        assert_eq!(config.effects.pool_capacity, EffectsConfig::default().pool_capacity);
    }
}
