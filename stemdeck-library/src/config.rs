//! Simple configuration persistence for stemdeck
//!
//! Engine sizing, effect settings and the last used tracks, stored as
//! `key=value` lines.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use stemdeck_audio::{EffectsConfig, EngineConfig};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub sample_rate: u32,
    pub block_size: usize,
    pub command_batch: usize,
    pub status_interval_ms: u64,
    pub effects: bool,
    pub reverb_room: f32,
    pub delay_secs: f32,
    pub delay_feedback: f32,
    pub limiter_threshold_db: f32,
    pub limiter_ratio: f32,
    /// Root of cached stems: `<root>/<track stem>/<name>.wav`
    pub stems_dir: Option<PathBuf>,
    pub last_track_a: Option<PathBuf>,
    pub last_track_b: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            sample_rate: engine.sample_rate,
            block_size: engine.block_size,
            command_batch: engine.command_batch,
            status_interval_ms: engine.status_interval_ms,
            effects: engine.effects.enabled,
            reverb_room: engine.effects.reverb_room,
            delay_secs: engine.effects.delay_secs,
            delay_feedback: engine.effects.delay_feedback,
            limiter_threshold_db: engine.effects.compressor_threshold_db,
            limiter_ratio: engine.effects.compressor_ratio,
            stems_dir: None,
            last_track_a: None,
            last_track_b: None,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be read.
    pub fn load() -> Self {
        let path = Self::config_path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Config: using defaults ({})", e);
                Self::default()
            }
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, self.serialize()).map_err(write_err)
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stemdeck")
            .join("config.txt")
    }

    /// Engine parameters derived from this config
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            command_batch: self.command_batch,
            status_interval_ms: self.status_interval_ms,
            effects: EffectsConfig {
                enabled: self.effects,
                reverb_room: self.reverb_room,
                delay_secs: self.delay_secs,
                delay_feedback: self.delay_feedback,
                compressor_threshold_db: self.limiter_threshold_db,
                compressor_ratio: self.limiter_ratio,
            },
        }
    }

    /// Parse config from simple key=value format
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                match key {
                    "sample_rate" => set_number(&mut config.sample_rate, key, value),
                    "block_size" => set_number(&mut config.block_size, key, value),
                    "command_batch" => set_number(&mut config.command_batch, key, value),
                    "status_interval_ms" => set_number(&mut config.status_interval_ms, key, value),
                    "effects" => set_number(&mut config.effects, key, value),
                    "reverb_room" => set_number(&mut config.reverb_room, key, value),
                    "delay_secs" => set_number(&mut config.delay_secs, key, value),
                    "delay_feedback" => set_number(&mut config.delay_feedback, key, value),
                    "limiter_threshold_db" => set_number(&mut config.limiter_threshold_db, key, value),
                    "limiter_ratio" => set_number(&mut config.limiter_ratio, key, value),
                    "stems_dir" => config.stems_dir = path_value(value),
                    "last_track_a" => config.last_track_a = path_value(value),
                    "last_track_b" => config.last_track_b = path_value(value),
                    _ => {} // Ignore unknown keys
                }
            }
        }

        // Zero-sized blocks or batches would stall the engine
        config.block_size = config.block_size.max(1);
        config.command_batch = config.command_batch.max(1);
        config.sample_rate = config.sample_rate.max(1);
        config
    }

    /// Serialize config to simple key=value format
    pub fn serialize(&self) -> String {
        let mut lines = vec![
            "# stemdeck configuration".to_string(),
            format!("sample_rate={}", self.sample_rate),
            format!("block_size={}", self.block_size),
            format!("command_batch={}", self.command_batch),
            format!("status_interval_ms={}", self.status_interval_ms),
            format!("effects={}", self.effects),
            format!("reverb_room={}", self.reverb_room),
            format!("delay_secs={}", self.delay_secs),
            format!("delay_feedback={}", self.delay_feedback),
            format!("limiter_threshold_db={}", self.limiter_threshold_db),
            format!("limiter_ratio={}", self.limiter_ratio),
        ];
        for (key, path) in [
            ("stems_dir", &self.stems_dir),
            ("last_track_a", &self.last_track_a),
            ("last_track_b", &self.last_track_b),
        ] {
            if let Some(path) = path {
                lines.push(format!("{}={}", key, path.display()));
            }
        }
        lines.join("\n")
    }
}

fn set_number<T: FromStr>(slot: &mut T, key: &str, value: &str) {
    match value.parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!("Config: ignoring invalid value for {}: {:?}", key, value),
    }
}

fn path_value(value: &str) -> Option<PathBuf> {
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert_eq!(Config::parse(""), Config::default());
    }

    #[test]
    fn test_defaults_match_engine() {
        let config = Config::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.block_size, 2048);
        assert!(config.effects);
        assert_eq!(config.engine_config(), EngineConfig::default());
    }

    #[test]
    fn test_parse_values_and_comments() {
        let content = "# Comment\nblock_size=512\neffects=false\n  reverb_room = 0.5 \nstems_dir=/music/stems\n# end";
        let config = Config::parse(content);
        assert_eq!(config.block_size, 512);
        assert!(!config.effects);
        assert_eq!(config.reverb_room, 0.5);
        assert_eq!(config.stems_dir, Some(PathBuf::from("/music/stems")));
        assert!(!config.engine_config().effects.enabled);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = Config::parse("block_size=lots\ncommand_batch=0\nunknown=1\nlast_track_a=");
        assert_eq!(config.block_size, 2048);
        assert_eq!(config.command_batch, 1);
        assert!(config.last_track_a.is_none());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config {
            delay_secs: 0.5,
            last_track_b: Some(PathBuf::from("/test/track.flac")),
            ..Config::default()
        };
        assert_eq!(Config::parse(&config.serialize()), config);
    }
}
