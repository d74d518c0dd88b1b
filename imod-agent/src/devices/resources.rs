//! Memory resource descriptor decoding
//! -----------------------------------
//! CfgMgr32 hands back resource descriptors as raw, byte-packed records.
//! Both memory kinds share a 32-byte header followed by an array of range
//! records:
//
//!   header (MEM_DES / MEM_LARGE_DES)
//!   ┌─ 0 ─────┬─ 4 ────┬─ 8 ─────────┬─ 16 ───────┬─ 24 ───┬─ 28 ─────┐
//!   │ count   │ type   │ alloc_base  │ alloc_end  │ flags  │ reserved │
//!   └─────────┴────────┴─────────────┴────────────┴────────┴──────────┘
//!   MEM_RANGE       : align u64 @0, n_bytes u32 @8,  min u64 @12, ...
//!   MEM_LARGE_RANGE : align u64 @0, n_bytes u64 @8,  min u64 @16, ...
//
//! When `alloc_base` is zero the first range's minimum stands in for it.
//! The lowest non-zero candidate across every descriptor wins, since BAR0
//! may sit among several mapped windows.

use crate::error::ResourceError;

/// `ResType_Mem`
pub const RES_TYPE_MEM: u32 = 0x0001;
/// `ResType_MemLarge`
pub const RES_TYPE_MEM_LARGE: u32 = 0x0007;

const HEADER_LEN: usize = 32;
const HEADER_COUNT: usize = 0;
const HEADER_ALLOC_BASE: usize = 8;

const MEM_RANGE_LEN: usize = 36;
const MEM_RANGE_MIN: usize = 12;
const MEM_LARGE_RANGE_LEN: usize = 40;
const MEM_LARGE_RANGE_MIN: usize = 16;

/// The two descriptor kinds walked for a device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryDescriptorKind {
    Mem,
    MemLarge,
}

impl MemoryDescriptorKind {
    pub const ALL: [MemoryDescriptorKind; 2] = [MemoryDescriptorKind::Mem, MemoryDescriptorKind::MemLarge];

    /// CfgMgr32 resource type id.
    pub fn resource_type(self) -> u32 {
        match self {
            MemoryDescriptorKind::Mem => RES_TYPE_MEM,
            MemoryDescriptorKind::MemLarge => RES_TYPE_MEM_LARGE,
        }
    }

    /// Candidate base address carried by one descriptor payload.
    pub fn decode(self, payload: &[u8]) -> Option<u64> {
        match self {
            MemoryDescriptorKind::Mem => decode_mem(payload),
            MemoryDescriptorKind::MemLarge => decode_mem_large(payload),
        }
    }
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let raw = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let raw: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}

fn decode_with(payload: &[u8], range_len: usize, range_min: usize) -> Option<u64> {
    if payload.len() < HEADER_LEN {
        return None;
    }
    let base = read_u64(payload, HEADER_ALLOC_BASE)?;
    if base != 0 {
        return Some(base);
    }
    let count = read_u32(payload, HEADER_COUNT)?;
    if count == 0 || payload.len() < HEADER_LEN + range_len {
        return None;
    }
    read_u64(payload, HEADER_LEN + range_min).filter(|min| *min != 0)
}

/// Decode a `ResType_Mem` payload.
pub fn decode_mem(payload: &[u8]) -> Option<u64> {
    decode_with(payload, MEM_RANGE_LEN, MEM_RANGE_MIN)
}

/// Decode a `ResType_MemLarge` payload.
pub fn decode_mem_large(payload: &[u8]) -> Option<u64> {
    decode_with(payload, MEM_LARGE_RANGE_LEN, MEM_LARGE_RANGE_MIN)
}

/// Fold every descriptor payload into the lowest non-zero candidate.
pub fn lowest_base<'a, I>(payloads: I) -> Result<u64, ResourceError>
where
    I: IntoIterator<Item = (MemoryDescriptorKind, &'a [u8])>,
{
    payloads
        .into_iter()
        .filter_map(|(kind, payload)| kind.decode(payload))
        .filter(|base| *base != 0)
        .min()
        .ok_or(ResourceError::NoMemoryResourceFound)
}
