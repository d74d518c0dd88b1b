// src/logging.rs

//! Global logger setup: stderr always, plus an optional file next to the
//! executable. Stdout is left to command output.

use crate::config::types::LoggingConfig;
use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;
use std::{path::Path, process, thread};

/// Default log file name when `[logging].file` is not set.
pub const DEFAULT_LOG_FILE: &str = "imod-agent.log";

/// Map the textual `[logging].level` onto a filter. Unknown names mean INFO.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_uppercase().as_str() {
        "ERROR" => LevelFilter::Error,
        "WARN" => LevelFilter::Warn,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Configure global logging as requested in `logging`.
/// `verbose` raises the level to at least DEBUG.
pub fn setup_logging(exe_dir: &Path, logging: &LoggingConfig, verbose: bool) -> Result<(), fern::InitError> {
    let mut level = level_filter(&logging.level);
    if verbose && level < LevelFilter::Debug {
        level = LevelFilter::Debug;
    }

    let log_path = logging
        .enable
        .then(|| exe_dir.join(logging.file.as_deref().unwrap_or(DEFAULT_LOG_FILE)));

    let mut dispatch = Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Some(path) = log_path {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}
