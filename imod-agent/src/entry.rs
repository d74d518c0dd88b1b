// src/entry.rs

//! Unattended entry point, run from the startup script at logon.
//!
//! Loads the persisted config, applies it and condenses the result into a
//! process exit code plus a one-line note. Never panics on hardware or
//! driver failures; those end up in the note.

use crate::config::{self, ImodPaths};
use crate::driver_image::DriverImage;
use crate::engine::ApplyStats;
use crate::engine::runner::{Platform, apply_imod, summarize};
use crate::error::ImodError;
use crate::imod_log;
use chrono::{DateTime, Local};
use log::Level;
use serde::Serialize;
use std::path::Path;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

/// Process-style result of an unattended run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub note: String,
    /// Present when the engine actually ran.
    pub stats: Option<ApplyStats>,
}

/// Machine-readable form of a [`RunOutcome`].
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub finished_at: DateTime<Local>,
    pub exit_code: i32,
    pub note: &'a str,
    pub stats: Option<&'a ApplyStats>,
}

impl RunOutcome {
    fn skipped(note: &str) -> Self {
        Self { exit_code: EXIT_SUCCESS, note: note.to_string(), stats: None }
    }

    fn failed(err: ImodError) -> Self {
        Self { exit_code: EXIT_FAILURE, note: format!("IMOD failed: {err}"), stats: None }
    }

    pub fn report(&self) -> RunReport<'_> {
        RunReport {
            finished_at: Local::now(),
            exit_code: self.exit_code,
            note: &self.note,
            stats: self.stats.as_ref(),
        }
    }
}

/// Apply the config at `script`, or at the Startup-folder location when no
/// path is given.
///
/// An explicit path that does not exist is a failure. A missing default
/// script simply means compiled-in defaults.
pub fn apply_from_script<P: Platform>(
    platform: &P,
    script: Option<&Path>,
    paths: &ImodPaths,
    image: &DriverImage,
) -> RunOutcome {
    let path = match script {
        Some(p) if !p.is_file() => return finish(RunOutcome::failed(ImodError::ConfigMissing(p.to_path_buf()))),
        Some(p) => p.to_path_buf(),
        None => paths.startup_script.clone(),
    };

    let config = config::load(&path);
    if !config.has_active_config() {
        return finish(RunOutcome::skipped("IMOD skipped (no configured values)."));
    }

    let persist_driver = config.has_persisted_script || config.has_non_default_config();
    let outcome = match apply_imod(platform, &config, image, persist_driver) {
        Ok(stats) => RunOutcome { exit_code: EXIT_SUCCESS, note: summarize(&stats), stats: Some(stats) },
        Err(e) => RunOutcome::failed(e),
    };
    finish(outcome)
}

fn finish(outcome: RunOutcome) -> RunOutcome {
    let level = if outcome.exit_code == EXIT_SUCCESS { Level::Info } else { Level::Error };
    imod_log!(level, "imod", "{}", outcome.note);
    outcome
}
