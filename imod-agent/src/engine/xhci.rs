//! xHCI register layout used by the engine.
//!
//! Offsets of HCSPARAMS1 and RTSOFF within the capability registers come
//! from the config (they default to 0x4 and 0x18). The runtime register
//! space starts at `base + RTSOFF`; interrupter `i` sits at `0x20 + 0x20*i`
//! inside it, and its IMOD register is the second dword of that set.

/// Offset of IMOD within runtime space for interrupter 0.
pub const IMOD_REGISTER_OFFSET: u64 = 0x24;
/// Size of one interrupter register set.
pub const INTERRUPTER_STRIDE: u64 = 0x20;

/// MaxIntrs field of HCSPARAMS1. Only its low eight bits are used.
pub fn max_interrupters(hcsparams1: u32) -> u32 {
    (hcsparams1 >> 8) & 0xFF
}

pub fn runtime_base(base: u64, rtsoff: u32) -> u64 {
    base.wrapping_add(u64::from(rtsoff))
}

/// Physical address of interrupter `index`'s IMOD register.
pub fn imod_register(runtime_base: u64, index: u32) -> u64 {
    runtime_base
        .wrapping_add(IMOD_REGISTER_OFFSET)
        .wrapping_add(INTERRUPTER_STRIDE.wrapping_mul(u64::from(index)))
}
