//! Physical memory access through the WinIo helper driver.
//!
//! The engine only sees [`PhysicalMemory`]. [`session::DriverSession`] is the
//! real implementation; tests substitute in-memory fakes.
//!
//! Key responsibilities:
//! - Bring the helper service and device handle up and down (`session`).
//! - Issue the buffered control codes and touch mapped memory (`ioctl`).
//! - Talk to the service control manager (`service`).

pub mod session;

#[cfg(windows)]
pub mod ioctl;
#[cfg(windows)]
pub mod service;

use crate::error::MemoryError;
use shared::winio::PhysStruct;

/// A live mapping of physical memory into this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    descriptor: PhysStruct,
}

impl Mapping {
    pub fn new(physical: u64, size: u64, linear: u64) -> Self {
        Self {
            descriptor: PhysStruct { phys_mem_lin: linear, ..PhysStruct::map_request(physical, size) },
        }
    }

    /// Wrap the descriptor the driver filled in for a map request.
    pub fn from_descriptor(descriptor: PhysStruct) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &PhysStruct {
        &self.descriptor
    }

    pub fn physical(&self) -> u64 {
        self.descriptor.phys_address
    }

    pub fn linear(&self) -> u64 {
        self.descriptor.phys_mem_lin
    }
}

/// Raw physical memory access.
///
/// `read32`/`write32` map four bytes, touch them once and unmap again. A
/// failed unmap fails the access even when the read or write went through.
pub trait PhysicalMemory {
    fn map(&mut self, physical: u64, size: u64) -> Result<Mapping, MemoryError>;
    fn unmap(&mut self, mapping: Mapping) -> Result<(), MemoryError>;

    /// Volatile 32-bit load from the start of `mapping`.
    ///
    /// # Safety
    /// `mapping` must come from [`PhysicalMemory::map`] on `self`, cover at
    /// least four bytes and not have been unmapped yet.
    unsafe fn peek32(&mut self, mapping: &Mapping) -> u32;

    /// Volatile 32-bit store to the start of `mapping`.
    ///
    /// # Safety
    /// Same contract as [`PhysicalMemory::peek32`].
    unsafe fn poke32(&mut self, mapping: &Mapping, value: u32);

    fn read32(&mut self, physical: u64) -> Result<u32, MemoryError> {
        let mapping = self.map(physical, 4)?;
        // SAFETY: fresh four-byte mapping from `self.map`, unmapped below.
        let value = unsafe { self.peek32(&mapping) };
        self.unmap(mapping)?;
        Ok(value)
    }

    fn write32(&mut self, physical: u64, value: u32) -> Result<(), MemoryError> {
        let mapping = self.map(physical, 4)?;
        // SAFETY: fresh four-byte mapping from `self.map`, unmapped below.
        unsafe { self.poke32(&mapping, value) };
        self.unmap(mapping)
    }
}
