//! IOCTL communication interface with the WinIo helper driver.
//!
//! Wraps the device handle and `DeviceIoControl`. Descriptors travel as
//! their little-endian wire image. Mapped memory is touched only through
//! volatile 32-bit accesses.

use crate::comms::session::DeviceChannel;
use shared::winio::{PHYS_STRUCT_SIZE, PhysStruct};
use std::{
    ffi::{OsStr, c_void},
    io, iter,
    os::windows::ffi::OsStrExt,
    ptr,
};
use windows_sys::Win32::{
    Foundation::{CloseHandle, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE},
    Storage::FileSystem::{CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING},
    System::IO::DeviceIoControl,
};

/// Owned handle to `\\.\WINIO`. Closed on drop.
pub struct WinIoDevice {
    handle: HANDLE,
}

impl WinIoDevice {
    /// Open the device path for read/write.
    pub fn open(path: &str) -> io::Result<Self> {
        let wide: Vec<u16> = OsStr::new(path).encode_wide().chain(iter::once(0)).collect();
        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                ptr::null(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { handle })
    }
}

impl DeviceChannel for WinIoDevice {
    fn control(&self, code: u32, descriptor: Option<&mut PhysStruct>) -> io::Result<()> {
        let mut wire = descriptor.as_deref().map(PhysStruct::to_bytes);
        let (buffer, len): (*mut c_void, u32) = match wire.as_mut() {
            Some(bytes) => (bytes.as_mut_ptr().cast(), PHYS_STRUCT_SIZE as u32),
            None => (ptr::null_mut(), 0),
        };
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(self.handle, code, buffer, len, buffer, len, &mut returned, ptr::null_mut())
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }

        if let (Some(d), Some(bytes)) = (descriptor, wire) {
            let reply = bytes.get(..returned as usize).unwrap_or(&bytes);
            // A short reply, as unmap may send, leaves the request as is.
            if let Some(decoded) = PhysStruct::from_bytes(reply) {
                *d = decoded;
            }
        }
        Ok(())
    }

    unsafe fn read_linear(&self, linear: u64) -> u32 {
        // SAFETY: the caller guarantees a live four-byte mapping at `linear`.
        unsafe { ptr::read_volatile(linear as usize as *const u32) }
    }

    unsafe fn write_linear(&self, linear: u64, value: u32) {
        // SAFETY: the caller guarantees a live four-byte mapping at `linear`.
        unsafe { ptr::write_volatile(linear as usize as *mut u32, value) }
    }
}

impl Drop for WinIoDevice {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.handle) };
    }
}
