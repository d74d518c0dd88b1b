// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads the optional `imod-agent.toml` and loads/saves the IMOD config
//! file kept in the Startup folder.

use crate::config::model::ImodConfig;
use crate::config::paths::ImodPaths;
use crate::config::parser::parse;
use crate::config::types::{AgentSettings, ConfigError};
use crate::config::writer::{render_block, render_script, replace_block, to_ascii_lossy};
use crate::imod_log;
use log::Level;
use std::{fs, io, path::Path};

/// Load agent settings from `path`. A missing file yields defaults.
pub fn load_agent_settings(path: &Path) -> Result<AgentSettings, ConfigError> {
    if !path.exists() {
        return Ok(AgentSettings::default());
    }
    let txt = fs::read_to_string(path)?;
    let settings: AgentSettings = toml::from_str(&txt)?;
    Ok(settings)
}

/// Load the IMOD config from `path`.
///
/// A missing or unreadable file yields the compiled-in defaults. Input is
/// decoded leniently so stray non-UTF-8 bytes never block a load.
pub fn load(path: &Path) -> ImodConfig {
    match fs::read(path) {
        Ok(bytes) => {
            let mut cfg = parse(&String::from_utf8_lossy(&bytes));
            cfg.has_persisted_script = true;
            imod_log!(Level::Debug, "imod.config", "Loaded IMOD config from {}", path.display());
            cfg
        }
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                imod_log!(Level::Warn, "imod.config", "Could not read {}: {}", path.display(), e);
            }
            ImodConfig::default()
        }
    }
}

/// Write `config` to `path`, replacing only the settings block when the
/// existing file supports it.
pub fn save(config: &ImodConfig, path: &Path, paths: &ImodPaths) -> io::Result<()> {
    // Only generated text is folded to ASCII; preserved bytes stay untouched.
    let block = to_ascii_lossy(&render_block(config, &paths.driver_image));

    let existing = fs::read(path).ok();
    let bytes = match existing.as_deref().and_then(|e| replace_block(e, &block)) {
        Some(updated) => {
            imod_log!(Level::Debug, "imod.config", "Updating settings block in {}", path.display());
            updated
        }
        None => to_ascii_lossy(&render_script(&block, &paths.agent_exe)).into_bytes(),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    imod_log!(Level::Info, "imod.config", "Saved IMOD config to {}", path.display());
    Ok(())
}
