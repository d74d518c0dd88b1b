// src/comms/session.rs

//! Helper driver session.
//!
//! ```text
//! Closed -> ServiceEnsuring -> ServiceReady -> HandleOpen
//!        -> DirectIoEnabled (32-bit only) -> Active -> Closing -> Closed
//! ```
//!
//! The service is stopped and deleted on teardown only when this session
//! created it. A pre-existing service belongs to someone else and is left
//! running. Teardown runs from [`DriverSession::close`] or from `Drop`,
//! including when [`DriverSession::open`] fails halfway.

use crate::comms::{Mapping, PhysicalMemory};
use crate::error::{MemoryError, SessionError};
use crate::imod_log;
use log::Level;
use shared::constants::{
    SERVICE_STOP_POLL_ATTEMPTS, SERVICE_STOP_POLL_INTERVAL_MS, WINIO_DEVICE_PATH, WINIO_SERVICE_NAME,
};
use shared::winio::{
    IOCTL_WINIO_DISABLEDIRECTIO, IOCTL_WINIO_ENABLEDIRECTIO, IOCTL_WINIO_MAPPHYSTOLIN,
    IOCTL_WINIO_UNMAPPHYSADDR, PhysStruct,
};
use std::{io, path::Path, time::Duration};

/// An open handle to the helper driver's device object.
pub trait DeviceChannel {
    /// Synchronous buffered control request. `descriptor` is sent and
    /// overwritten with the driver's reply.
    fn control(&self, code: u32, descriptor: Option<&mut PhysStruct>) -> io::Result<()>;

    /// # Safety
    /// `linear` must be the linear address of a live mapping of at least
    /// four bytes returned by this channel.
    unsafe fn read_linear(&self, linear: u64) -> u32;

    /// # Safety
    /// Same contract as [`DeviceChannel::read_linear`].
    unsafe fn write_linear(&self, linear: u64, value: u32);
}

/// Whether the kernel service existed before the session looked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOrigin {
    Created,
    PreExisting,
}

/// Bounded wait for a stopping service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            attempts: SERVICE_STOP_POLL_ATTEMPTS,
            interval: Duration::from_millis(SERVICE_STOP_POLL_INTERVAL_MS),
        }
    }
}

/// Service control manager and device access used by a session.
pub trait DriverBackend {
    type Channel: DeviceChannel;

    /// Open the named service, creating a demand-start kernel driver
    /// service for `image` when it does not exist.
    fn ensure_service(&mut self, name: &str, image: &Path) -> Result<ServiceOrigin, SessionError>;

    /// Start the service. Already running counts as success.
    fn start_service(&mut self, name: &str) -> Result<(), SessionError>;

    fn open_device(&mut self, path: &str) -> Result<Self::Channel, SessionError>;

    /// Send a stop control unless stopped, then poll per `policy`. Best
    /// effort: failures are logged, never returned.
    fn stop_service(&mut self, name: &str, policy: StopPolicy);

    /// Best effort, like [`DriverBackend::stop_service`].
    fn delete_service(&mut self, name: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    ServiceEnsuring,
    ServiceReady,
    HandleOpen,
    DirectIoEnabled,
    Active,
    Closing,
}

pub struct DriverSession<B: DriverBackend> {
    backend: B,
    channel: Option<B::Channel>,
    is_64bit_os: bool,
    service_created: bool,
    state: SessionState,
}

impl<B: DriverBackend> DriverSession<B> {
    /// Bring the helper driver up for `image`.
    pub fn open(backend: B, image: &Path, is_64bit_os: bool) -> Result<Self, SessionError> {
        let mut session = Self {
            backend,
            channel: None,
            is_64bit_os,
            service_created: false,
            state: SessionState::Closed,
        };
        // On error `session` drops here and tears down what was set up.
        session.establish(image)?;
        Ok(session)
    }

    fn establish(&mut self, image: &Path) -> Result<(), SessionError> {
        self.transition(SessionState::ServiceEnsuring);
        let origin = self.backend.ensure_service(WINIO_SERVICE_NAME, image)?;
        self.service_created = origin == ServiceOrigin::Created;
        if self.service_created {
            imod_log!(Level::Info, "imod.driver", "Created service {} for {}", WINIO_SERVICE_NAME, image.display());
        }
        self.backend.start_service(WINIO_SERVICE_NAME)?;
        self.transition(SessionState::ServiceReady);

        self.channel = Some(self.backend.open_device(WINIO_DEVICE_PATH)?);
        self.transition(SessionState::HandleOpen);

        if let (false, Some(channel)) = (self.is_64bit_os, &self.channel) {
            channel
                .control(IOCTL_WINIO_ENABLEDIRECTIO, None)
                .map_err(SessionError::DirectIo)?;
            self.transition(SessionState::DirectIoEnabled);
        }
        self.transition(SessionState::Active);
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        imod_log!(Level::Debug, "imod.driver", "Session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn service_created(&self) -> bool {
        self.service_created
    }

    /// Tear the session down now instead of at drop.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.transition(SessionState::Closing);

        if let Some(channel) = self.channel.take() {
            if !self.is_64bit_os {
                if let Err(e) = channel.control(IOCTL_WINIO_DISABLEDIRECTIO, None) {
                    imod_log!(Level::Warn, "imod.driver", "Failed to disable direct I/O: {}", e);
                }
            }
            drop(channel);
        }

        if self.service_created {
            self.backend.stop_service(WINIO_SERVICE_NAME, StopPolicy::default());
            self.backend.delete_service(WINIO_SERVICE_NAME);
            self.service_created = false;
            imod_log!(Level::Info, "imod.driver", "Removed service {}", WINIO_SERVICE_NAME);
        }

        self.transition(SessionState::Closed);
    }

    fn active_channel(&self) -> Result<&B::Channel, io::Error> {
        match (&self.channel, self.state) {
            (Some(channel), SessionState::Active) => Ok(channel),
            _ => Err(io::Error::new(io::ErrorKind::NotConnected, "driver session is not active")),
        }
    }
}

impl<B: DriverBackend> Drop for DriverSession<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<B: DriverBackend> PhysicalMemory for DriverSession<B> {
    fn map(&mut self, physical: u64, size: u64) -> Result<Mapping, MemoryError> {
        let channel = self.active_channel().map_err(MemoryError::Map)?;
        let mut descriptor = PhysStruct::map_request(physical, size);
        channel
            .control(IOCTL_WINIO_MAPPHYSTOLIN, Some(&mut descriptor))
            .map_err(MemoryError::Map)?;
        if descriptor.phys_mem_lin == 0 {
            return Err(MemoryError::NullLinearAddress);
        }
        Ok(Mapping::from_descriptor(descriptor))
    }

    fn unmap(&mut self, mapping: Mapping) -> Result<(), MemoryError> {
        let channel = self.active_channel().map_err(MemoryError::Unmap)?;
        let mut descriptor = *mapping.descriptor();
        channel
            .control(IOCTL_WINIO_UNMAPPHYSADDR, Some(&mut descriptor))
            .map_err(MemoryError::Unmap)
    }

    unsafe fn peek32(&mut self, mapping: &Mapping) -> u32 {
        match &self.channel {
            // SAFETY: forwarded from the caller.
            Some(channel) => unsafe { channel.read_linear(mapping.linear()) },
            None => 0,
        }
    }

    unsafe fn poke32(&mut self, mapping: &Mapping, value: u32) {
        if let Some(channel) = &self.channel {
            // SAFETY: forwarded from the caller.
            unsafe { channel.write_linear(mapping.linear(), value) };
        }
    }
}
