//! xHCI controller discovery.
//!
//! The Windows walkers live in `setupapi` (device enumeration) and `cfgmgr`
//! (devnode status and resource descriptors). Everything that only looks at
//! strings and bytes is kept here and in [`resources`] so it can be tested
//! anywhere.

pub mod resources;

#[cfg(windows)]
pub mod cfgmgr;
#[cfg(windows)]
pub mod setupapi;

use crate::error::ResourceError;

/// Service name of the inbox xHCI class driver.
pub const XHCI_SERVICE_NAME: &str = "USBXHCI";
/// PCI class 0C, subclass 03, prog-if 30 as it appears in device ids.
const XHCI_CLASS_TOKENS: [&str; 2] = ["CC_0C0330", "CLASS_0C0330"];

/// `CM_PROB_DISABLED`: the device was disabled by the user.
pub const CM_PROB_DISABLED: u32 = 0x16;

/// Caption used when the device reports neither name.
pub const UNKNOWN_CAPTION: &str = "Unknown USB Controller";

/// Snapshot of one enumerated controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerRecord {
    pub device_id: String,
    pub caption: String,
    /// Devnode problem code, 0 when healthy.
    pub problem_code: u32,
    pub base_address: Option<u64>,
    /// Why `base_address` is missing.
    pub base_error: Option<String>,
}

impl ControllerRecord {
    pub fn new(
        device_id: impl Into<String>,
        caption: impl Into<String>,
        problem_code: u32,
        base: Result<u64, ResourceError>,
    ) -> Self {
        let (base_address, base_error) = match base {
            Ok(addr) => (Some(addr), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            device_id: device_id.into(),
            caption: caption.into(),
            problem_code,
            base_address,
            base_error,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.problem_code == CM_PROB_DISABLED
    }
}

/// True when either the bound service or any hardware/compatible id marks
/// the device as an xHCI host controller.
pub fn is_xhci_controller(service: Option<&str>, hardware_ids: &[String], compatible_ids: &[String]) -> bool {
    if service.is_some_and(|s| s.trim().eq_ignore_ascii_case(XHCI_SERVICE_NAME)) {
        return true;
    }
    hardware_ids.iter().chain(compatible_ids).any(|id| {
        let id = id.to_uppercase();
        XHCI_CLASS_TOKENS.iter().any(|token| id.contains(token))
    })
}

/// Friendly name, else device description, else a fixed placeholder.
pub fn caption_for(friendly_name: Option<&str>, description: Option<&str>) -> String {
    [friendly_name, description]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_CAPTION)
        .to_string()
}

/// Split a `REG_MULTI_SZ` buffer into trimmed, non-empty strings.
pub fn parse_multi_sz(buffer: &[u16]) -> Vec<String> {
    buffer
        .split(|c| *c == 0)
        .map(|part| String::from_utf16_lossy(part).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Decode a NUL-terminated `REG_SZ` buffer.
pub fn parse_sz(buffer: &[u16]) -> String {
    let end = buffer.iter().position(|c| *c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..end]).trim().to_string()
}
