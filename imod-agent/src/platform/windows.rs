//! Windows host: token membership, WOW64 detection, SetupAPI enumeration and
//! the SCM-backed driver session.

use crate::comms::service::ScmBackend;
use crate::devices::{ControllerRecord, setupapi};
use crate::engine::runner::Platform;
use crate::error::{ImodError, SessionError};
use std::{ffi::c_void, ptr};
use windows_sys::Win32::{
    Foundation::BOOL,
    Security::{AllocateAndInitializeSid, CheckTokenMembership, FreeSid, SID_IDENTIFIER_AUTHORITY},
    System::Threading::{GetCurrentProcess, IsWow64Process},
};

const SECURITY_NT_AUTHORITY: SID_IDENTIFIER_AUTHORITY = SID_IDENTIFIER_AUTHORITY { Value: [0, 0, 0, 0, 0, 5] };
const SECURITY_BUILTIN_DOMAIN_RID: u32 = 0x20;
const DOMAIN_ALIAS_RID_ADMINS: u32 = 0x220;

#[derive(Debug, Default)]
pub struct WindowsPlatform;

impl WindowsPlatform {
    pub fn new() -> Self {
        Self
    }
}

/// Whether the current token is a member of BUILTIN\Administrators.
fn is_admin() -> bool {
    let mut sid: *mut c_void = ptr::null_mut();
    let ok = unsafe {
        AllocateAndInitializeSid(
            &SECURITY_NT_AUTHORITY,
            2,
            SECURITY_BUILTIN_DOMAIN_RID,
            DOMAIN_ALIAS_RID_ADMINS,
            0, 0, 0, 0, 0, 0,
            &mut sid,
        )
    };
    if ok == 0 {
        return false;
    }
    let mut member: BOOL = 0;
    let checked = unsafe { CheckTokenMembership(ptr::null_mut(), sid, &mut member) };
    unsafe { FreeSid(sid) };
    checked != 0 && member != 0
}

/// 64-bit build, or a 32-bit build running under WOW64.
fn is_64bit_os() -> bool {
    if cfg!(target_pointer_width = "64") {
        return true;
    }
    let mut wow64: BOOL = 0;
    let ok = unsafe { IsWow64Process(GetCurrentProcess(), &mut wow64) };
    ok != 0 && wow64 != 0
}

impl Platform for WindowsPlatform {
    type Backend = ScmBackend;

    fn is_elevated(&self) -> bool {
        is_admin()
    }

    fn is_64bit_os(&self) -> bool {
        is_64bit_os()
    }

    fn enumerate_controllers(&self) -> Result<Vec<ControllerRecord>, ImodError> {
        setupapi::enumerate_xhci_controllers().map_err(ImodError::Enumeration)
    }

    fn driver_backend(&self) -> Result<ScmBackend, SessionError> {
        ScmBackend::connect()
    }
}
