//! WinIo control protocol
//! ----------------------
//! Every request is a buffered `DeviceIoControl` carrying a [`PhysStruct`]
//! both ways:
//
//!   ┌─ 0 ────────┬─ 8 ─────────┬─ 16 ─────────┬─ 24 ────────┬─ 32 ───────┐
//!   │ size (in)  │ phys (in)   │ section hdl  │ linear (out)│ section obj│
//!   └────────────┴─────────────┴──────────────┴─────────────┴────────────┘
//
//! Map fills the last three fields; unmap expects them echoed back unchanged.
//! The direct-I/O toggles carry no payload and only exist on 32-bit Windows.

/// Device type the helper driver registers its control codes under.
pub const WINIO_DEVICE_TYPE: u32 = 0x8010;

pub const METHOD_BUFFERED: u32 = 0;
pub const FILE_ANY_ACCESS: u32 = 0;

/// Same packing as the `CTL_CODE` macro from `winioctl.h`.
pub const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

pub const IOCTL_WINIO_MAPPHYSTOLIN: u32 =
    ctl_code(WINIO_DEVICE_TYPE, 0x810, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_WINIO_UNMAPPHYSADDR: u32 =
    ctl_code(WINIO_DEVICE_TYPE, 0x811, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_WINIO_ENABLEDIRECTIO: u32 =
    ctl_code(WINIO_DEVICE_TYPE, 0x812, METHOD_BUFFERED, FILE_ANY_ACCESS);
pub const IOCTL_WINIO_DISABLEDIRECTIO: u32 =
    ctl_code(WINIO_DEVICE_TYPE, 0x813, METHOD_BUFFERED, FILE_ANY_ACCESS);

/// Size of [`PhysStruct`] on the wire.
pub const PHYS_STRUCT_SIZE: usize = 40;

/// Physical memory descriptor exchanged with the driver.
///
/// Five naturally aligned `u64` fields, so `repr(C)` already matches the
/// driver's byte-packed declaration.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhysStruct {
    pub phys_mem_size_in_bytes: u64,
    pub phys_address: u64,
    pub physical_memory_handle: u64,
    pub phys_mem_lin: u64,
    pub phys_section: u64,
}

const _: () = assert!(core::mem::size_of::<PhysStruct>() == PHYS_STRUCT_SIZE);

impl PhysStruct {
    /// Request block for mapping `size` bytes at physical address `phys`.
    pub const fn map_request(phys: u64, size: u64) -> Self {
        Self {
            phys_mem_size_in_bytes: size,
            phys_address: phys,
            physical_memory_handle: 0,
            phys_mem_lin: 0,
            phys_section: 0,
        }
    }

    /// Little-endian wire image, as the driver reads it from the system buffer.
    pub fn to_bytes(&self) -> [u8; PHYS_STRUCT_SIZE] {
        let mut out = [0u8; PHYS_STRUCT_SIZE];
        let fields = [
            self.phys_mem_size_in_bytes,
            self.phys_address,
            self.physical_memory_handle,
            self.phys_mem_lin,
            self.phys_section,
        ];
        for (chunk, value) in out.chunks_exact_mut(8).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Parse a wire image; `None` when `bytes` is shorter than a descriptor.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < PHYS_STRUCT_SIZE {
            return None;
        }
        let field = |i: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            u64::from_le_bytes(raw)
        };
        Some(Self {
            phys_mem_size_in_bytes: field(0),
            phys_address: field(1),
            physical_memory_handle: field(2),
            phys_mem_lin: field(3),
            phys_section: field(4),
        })
    }
}
