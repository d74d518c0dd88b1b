//! Agent settings deserialized from `imod-agent.toml`.
//!
//! These govern the agent itself (logging, where files live). The IMOD
//! register values are a separate file, see [`crate::config::parser`].

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level settings file. Every table is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub logging: LoggingConfig,
    pub paths: PathOverrides,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]            pub enable: bool,
    #[serde(default)]            pub file:   Option<String>,
    #[serde(default = "default_level")] pub level: String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// Mirror of the `[paths]` table
#[derive(Debug, Default, Deserialize)]
pub struct PathOverrides {
    /// Folder that receives the startup script.
    #[serde(default)] pub startup_dir: Option<PathBuf>,
    /// Folder that receives the helper driver image.
    #[serde(default)] pub driver_dir:  Option<PathBuf>,
}

/// All the ways settings loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
