// src/config/paths.rs

//! Well-known file locations used by persistence and the driver session.

use crate::config::types::PathOverrides;
use shared::constants::{STARTUP_SCRIPT_NAME, WINIO_IMAGE_NAME};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImodPaths {
    /// `ApplyIMOD.ps1` in the user's Startup folder.
    pub startup_script: PathBuf,
    /// Helper driver image registered with the service manager.
    pub driver_image: PathBuf,
    /// Driver copy left beside the executable by older installs.
    pub legacy_driver_image: PathBuf,
    /// The running agent, referenced by the startup script.
    pub agent_exe: PathBuf,
}

impl ImodPaths {
    /// Resolve from the environment, falling back to the executable's
    /// directory. Explicit overrides win.
    pub fn resolve(exe_path: &Path, overrides: &PathOverrides) -> Self {
        let exe_dir = exe_path.parent().map(Path::to_path_buf).unwrap_or_default();

        let startup_dir = overrides
            .startup_dir
            .clone()
            .or_else(default_startup_dir)
            .unwrap_or_else(|| exe_dir.clone());
        let driver_dir = overrides
            .driver_dir
            .clone()
            .or_else(windows_dir)
            .unwrap_or_else(|| exe_dir.clone());

        Self {
            startup_script: startup_dir.join(STARTUP_SCRIPT_NAME),
            driver_image: driver_dir.join(WINIO_IMAGE_NAME),
            legacy_driver_image: exe_dir.join(WINIO_IMAGE_NAME),
            agent_exe: exe_path.to_path_buf(),
        }
    }

    /// Every location rooted in `dir`. Handy for tests and portable installs.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            startup_script: dir.join("startup").join(STARTUP_SCRIPT_NAME),
            driver_image: dir.join("system").join(WINIO_IMAGE_NAME),
            legacy_driver_image: dir.join(WINIO_IMAGE_NAME),
            agent_exe: dir.join("imod-agent.exe"),
        }
    }
}

fn default_startup_dir() -> Option<PathBuf> {
    let appdata = env::var_os("APPDATA").filter(|v| !v.is_empty())?;
    Some(
        PathBuf::from(appdata)
            .join("Microsoft")
            .join("Windows")
            .join("Start Menu")
            .join("Programs")
            .join("Startup"),
    )
}

fn windows_dir() -> Option<PathBuf> {
    env::var_os("WINDIR")
        .or_else(|| env::var_os("SystemRoot"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
