// src/engine/runner.rs

//! Full apply call: preconditions, enumeration, one driver session for the
//! batch, and the engine loop.

use crate::comms::session::{DriverBackend, DriverSession};
use crate::config::ImodConfig;
use crate::devices::ControllerRecord;
use crate::driver_image::{DriverImage, ImageCleanup};
use crate::engine::{self, ApplyStats};
use crate::error::{ImodError, SessionError};
use crate::imod_log;
use log::Level;

/// Host services the runner needs. Implemented for Windows in
/// [`crate::platform`]; tests provide fakes.
pub trait Platform {
    type Backend: DriverBackend;

    fn is_elevated(&self) -> bool;
    fn is_64bit_os(&self) -> bool;
    fn enumerate_controllers(&self) -> Result<Vec<ControllerRecord>, ImodError>;
    /// Fresh backend for one session.
    fn driver_backend(&self) -> Result<Self::Backend, SessionError>;
}

/// Apply `config` to every xHCI controller on the host.
///
/// `persist_driver` keeps the extracted driver image on disk afterwards.
pub fn apply_imod<P: Platform>(
    platform: &P,
    config: &ImodConfig,
    image: &DriverImage,
    persist_driver: bool,
) -> Result<ApplyStats, ImodError> {
    // 1 ─ Preconditions
    if !platform.is_elevated() {
        return Err(ImodError::NotElevated);
    }
    let provisioned = image.ensure_on_disk()?;
    // Declared before the session so it drops after teardown.
    let _cleanup = ImageCleanup::new(&provisioned, !persist_driver);

    // 2 ─ Controllers
    let controllers = platform.enumerate_controllers()?;
    imod_log!(Level::Info, "imod", "Found {} xHCI controller(s)", controllers.len());
    if controllers.is_empty() {
        return Ok(ApplyStats::default());
    }

    // 3 ─ Session + engine
    let backend = platform.driver_backend()?;
    let mut session = DriverSession::open(backend, &provisioned.path, platform.is_64bit_os())?;
    let stats = engine::apply(config, &controllers, &mut session);
    session.close();

    imod_log!(
        Level::Info,
        "imod",
        "Applied to {} of {} controller(s): {} read failure(s), {} write failure(s), {} disabled, {} without base",
        stats.controllers_applied,
        stats.controllers_found,
        stats.read_failures,
        stats.write_failures,
        stats.skipped_disabled,
        stats.missing_base
    );
    Ok(stats)
}

/// One-line, user-facing summary of a finished apply call.
pub fn summarize(stats: &ApplyStats) -> String {
    if stats.controllers_found == 0 {
        return "IMOD skipped (no XHCI controllers found).".to_string();
    }
    if stats.controllers_applied == 0 {
        return "IMOD skipped (no eligible USB controllers).".to_string();
    }
    if stats.read_failures > 0 || stats.write_failures > 0 {
        return format!(
            "IMOD applied to {} USB controller(s) with {} read failure(s) and {} write failure(s).",
            stats.controllers_applied, stats.read_failures, stats.write_failures
        );
    }
    format!("IMOD applied to {} USB controller(s).", stats.controllers_applied)
}
