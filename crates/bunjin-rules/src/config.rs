//! Configuration for the rule engine.

use std::path::{Path, PathBuf};

use bunjin_core::RULE_TREE_MAX_DEPTH;
use chrono::FixedOffset;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{RulesError, RulesResult};

const ENV_STORE_DIR: &str = "BUNJIN_STORE_DIR";
const ENV_UTC_OFFSET: &str = "BUNJIN_UTC_OFFSET_MINUTES";

/// Largest offset chrono accepts, in minutes (just under a day).
const MAX_OFFSET_MINUTES: i32 = 24 * 60 - 1;

/// Rule engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for the file-backed store.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Offset applied to timestamps when a caller gives none.
    #[serde(default)]
    pub default_utc_offset_minutes: i32,

    /// Depth bound used when validating drafts (capped at the tree maximum).
    #[serde(default = "default_max_tree_depth")]
    pub max_tree_depth: usize,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".bunjin")
}

fn default_max_tree_depth() -> usize {
    RULE_TREE_MAX_DEPTH
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            default_utc_offset_minutes: 0,
            max_tree_depth: default_max_tree_depth(),
        }
    }
}

impl Config {
    /// Load configuration from disk with environment overrides.
    pub fn load() -> RulesResult<Self> {
        Self::load_file()?.with_env_overrides()
    }

    /// Load only what the config file says, without environment overrides.
    ///
    /// Use this before [`Config::save`] so overrides never end up persisted.
    pub fn load_file() -> RulesResult<Self> {
        match Self::config_file_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> RulesResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RulesError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| RulesError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply `BUNJIN_*` environment variables.
    pub fn with_env_overrides(mut self) -> RulesResult<Self> {
        if let Ok(dir) = std::env::var(ENV_STORE_DIR) {
            self.set("store_dir", &dir)?;
        }
        if let Ok(offset) = std::env::var(ENV_UTC_OFFSET) {
            self.set("default_utc_offset_minutes", &offset)?;
        }
        Ok(self)
    }

    /// Save configuration to disk.
    pub fn save(&self) -> RulesResult<()> {
        if let Some(path) = Self::config_file_path() {
            let write = || -> std::io::Result<()> {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let contents = serde_json::to_string_pretty(self)?;
                std::fs::write(&path, contents)
            };
            write().map_err(|e| RulesError::Config(format!("{}: {}", path.display(), e)))?;
        }
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_file_path() -> Option<PathBuf> {
        ProjectDirs::from("app", "bunjin", "bunjin").map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Default offset as a chrono offset.
    pub fn utc_offset(&self) -> RulesResult<FixedOffset> {
        offset_from_minutes(self.default_utc_offset_minutes)
    }

    /// Depth bound for validation, never above the tree maximum.
    pub fn effective_max_depth(&self) -> usize {
        self.max_tree_depth.min(RULE_TREE_MAX_DEPTH)
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "store_dir" => Some(self.store_dir.display().to_string()),
            "default_utc_offset_minutes" => Some(self.default_utc_offset_minutes.to_string()),
            "max_tree_depth" => Some(self.max_tree_depth.to_string()),
            _ => None,
        }
    }

    /// Set a configuration value by key.
    pub fn set(&mut self, key: &str, value: &str) -> RulesResult<()> {
        match key {
            "store_dir" => {
                self.store_dir = PathBuf::from(value);
            }
            "default_utc_offset_minutes" => {
                let minutes: i32 = value
                    .trim()
                    .parse()
                    .map_err(|_| RulesError::Config(format!("Invalid offset: {}", value)))?;
                offset_from_minutes(minutes)?;
                self.default_utc_offset_minutes = minutes;
            }
            "max_tree_depth" => {
                let depth: usize = value
                    .trim()
                    .parse()
                    .map_err(|_| RulesError::Config(format!("Invalid number: {}", value)))?;
                if depth == 0 || depth > RULE_TREE_MAX_DEPTH {
                    return Err(RulesError::Config(format!(
                        "max_tree_depth must be between 1 and {}",
                        RULE_TREE_MAX_DEPTH
                    )));
                }
                self.max_tree_depth = depth;
            }
            _ => {
                return Err(RulesError::Config(format!("Unknown config key: {}", key)));
            }
        }
        Ok(())
    }
}

/// Convert a minute offset east of UTC into a [`FixedOffset`].
pub fn offset_from_minutes(minutes: i32) -> RulesResult<FixedOffset> {
    if minutes.abs() > MAX_OFFSET_MINUTES {
        return Err(RulesError::Config(format!(
            "UTC offset out of range: {} minutes",
            minutes
        )));
    }
    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| RulesError::Config(format!("UTC offset out of range: {} minutes", minutes)))
}
