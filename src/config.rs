// src/config.rs
//! Engine configuration, read from `<config dir>/redline/config.toml`.
//! Every key is optional; missing keys take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::conflict_detector::{DEFAULT_BYTE_ADJACENCY, DEFAULT_LINE_ADJACENCY};
use crate::error::ConfigError;
use crate::models::UNKNOWN_AUTHOR;
use crate::position_tracker::{LineMappingStrategy, DEFAULT_LOOKAHEAD};

pub const DEFAULT_HUNK_CONTEXT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Author of suggestions generated from a rewrite
    pub author: String,
    /// Re-sync window for greedy line mapping
    pub diff_lookahead: usize,
    pub byte_adjacency: usize,
    pub line_adjacency: usize,
    pub line_mapping: LineMappingStrategy,
    /// Context lines around generated hunks
    pub hunk_context: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            author: UNKNOWN_AUTHOR.to_string(),
            diff_lookahead: DEFAULT_LOOKAHEAD,
            byte_adjacency: DEFAULT_BYTE_ADJACENCY,
            line_adjacency: DEFAULT_LINE_ADJACENCY,
            line_mapping: LineMappingStrategy::default(),
            hunk_context: DEFAULT_HUNK_CONTEXT,
        }
    }
}

impl EngineConfig {
    /// Load from a file. A missing file is `Ok(None)`.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let config = toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
            config_path: config_path.to_path_buf(),
            source,
        })?;

        Ok(Some(config))
    }

    /// Load from the platform config directory, if there is one
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from_path(path),
            None => Ok(None),
        }
    }

    /// Load, falling back to defaults when no file exists
    pub fn load_or_default() -> Result<Self, ConfigError> {
        Ok(Self::load()?.unwrap_or_default())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        self.save_to_path(config_path)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("redline").join("config.toml"))
    }
}
