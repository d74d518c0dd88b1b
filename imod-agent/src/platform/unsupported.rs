//! Stand-in used on non-Windows targets so the crate builds everywhere.

use crate::comms::session::{DeviceChannel, DriverBackend, ServiceOrigin, StopPolicy};
use crate::devices::ControllerRecord;
use crate::engine::runner::Platform;
use crate::error::{ImodError, SessionError};
use shared::winio::PhysStruct;
use std::{io, path::Path};

#[derive(Debug, Default)]
pub struct UnsupportedPlatform;

impl UnsupportedPlatform {
    pub fn new() -> Self {
        Self
    }
}

/// Uninhabited: no device can ever be opened.
pub enum NoChannel {}

impl DeviceChannel for NoChannel {
    fn control(&self, _code: u32, _descriptor: Option<&mut PhysStruct>) -> io::Result<()> {
        match *self {}
    }

    unsafe fn read_linear(&self, _linear: u64) -> u32 {
        match *self {}
    }

    unsafe fn write_linear(&self, _linear: u64, _value: u32) {
        match *self {}
    }
}

pub struct NoBackend;

impl DriverBackend for NoBackend {
    type Channel = NoChannel;

    fn ensure_service(&mut self, _name: &str, _image: &Path) -> Result<ServiceOrigin, SessionError> {
        Err(SessionError::Unsupported)
    }

    fn start_service(&mut self, _name: &str) -> Result<(), SessionError> {
        Err(SessionError::Unsupported)
    }

    fn open_device(&mut self, _path: &str) -> Result<NoChannel, SessionError> {
        Err(SessionError::Unsupported)
    }

    fn stop_service(&mut self, _name: &str, _policy: StopPolicy) {}

    fn delete_service(&mut self, _name: &str) {}
}

impl Platform for UnsupportedPlatform {
    type Backend = NoBackend;

    fn is_elevated(&self) -> bool {
        false
    }

    fn is_64bit_os(&self) -> bool {
        cfg!(target_pointer_width = "64")
    }

    fn enumerate_controllers(&self) -> Result<Vec<ControllerRecord>, ImodError> {
        Err(ImodError::Unsupported)
    }

    fn driver_backend(&self) -> Result<NoBackend, SessionError> {
        Err(SessionError::Unsupported)
    }
}
