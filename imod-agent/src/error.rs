// src/error.rs

//! Error types, one enum per failure class.
//!
//! Only [`ImodError`] and [`SessionError`] abort an apply call. Memory and
//! resource errors are folded into statistics by the engine.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Failures that abort a whole apply call.
#[derive(Debug, Error)]
pub enum ImodError {
    #[error("administrator privileges are required")]
    NotElevated,

    #[error("driver image {} not found", .0.display())]
    DriverImageMissing(PathBuf),

    #[error("failed to write driver image {}: {source}", path.display())]
    DriverImageWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} not found.", .0.display())]
    ConfigMissing(PathBuf),

    #[error("failed to enumerate PCI devices: {0}")]
    Enumeration(#[source] io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("IMOD is only supported on Windows")]
    Unsupported,
}

/// Failures while bringing up or using the helper driver channel.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open service manager: {0}")]
    ServiceManager(#[source] io::Error),

    #[error("failed to open service {service}: {source}")]
    OpenService {
        service: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to create service {service}: {source}")]
    CreateService {
        service: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to start service {service}: {source}")]
    StartService {
        service: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to open {path}: {source}")]
    OpenDevice {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to enable direct I/O: {0}")]
    DirectIo(#[source] io::Error),

    #[error("helper driver sessions are only supported on Windows")]
    Unsupported,
}

/// Per-register failures. Never abort a batch.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("failed to map physical memory: {0}")]
    Map(#[source] io::Error),

    #[error("failed to map physical memory: driver returned a null linear address")]
    NullLinearAddress,

    #[error("failed to unmap physical memory: {0}")]
    Unmap(#[source] io::Error),
}

/// Why a controller's base address could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("logical configuration unavailable (CONFIGRET {0})")]
    LogicalConfigUnavailable(u32),

    #[error("no memory resource found")]
    NoMemoryResourceFound,
}
