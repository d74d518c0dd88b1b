//! Decides whether the startup artifact should exist and keeps it in sync
//! with the in-memory config.

use crate::config::{self, ImodConfig, ImodPaths};
use crate::imod_log;
use log::Level;
use std::{fs, io, path::Path};

/// What [`persist`] did on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The startup script now holds the config.
    Written,
    /// Nothing diverges from defaults, so prior artifacts were deleted.
    Removed,
}

/// Load the persisted config, or defaults when no script exists yet.
pub fn load(paths: &ImodPaths) -> ImodConfig {
    config::load(&paths.startup_script)
}

/// Write the config when it diverges from defaults, otherwise delete any
/// previously persisted files.
pub fn persist(config: &mut ImodConfig, paths: &ImodPaths) -> io::Result<PersistOutcome> {
    config.overrides.retain(|e| !e.hwid.trim().is_empty());

    if config.has_non_default_config() {
        config::save(config, &paths.startup_script, paths)?;
        config.has_persisted_script = true;
        return Ok(PersistOutcome::Written);
    }

    remove_persistence_files(paths)?;
    config.has_persisted_script = false;
    Ok(PersistOutcome::Removed)
}

/// Delete the startup script and both driver image locations. Missing files
/// are not an error.
pub fn remove_persistence_files(paths: &ImodPaths) -> io::Result<()> {
    remove_if_present(&paths.startup_script)?;
    remove_if_present(&paths.driver_image)?;
    if paths.legacy_driver_image != paths.driver_image {
        remove_if_present(&paths.legacy_driver_image)?;
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            imod_log!(Level::Info, "imod.config", "Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
