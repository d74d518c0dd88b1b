//! SetupAPI walk over present PCI devices.

use crate::devices::{ControllerRecord, caption_for, cfgmgr, is_xhci_controller, parse_multi_sz, parse_sz};
use crate::imod_log;
use log::Level;
use std::{ffi::OsStr, io, iter, mem, os::windows::ffi::OsStrExt, ptr};
use windows_sys::Win32::Devices::DeviceAndDriverInstallation::{
    DIGCF_ALLCLASSES, DIGCF_PRESENT, HDEVINFO, SP_DEVINFO_DATA, SPDRP_COMPATIBLEIDS,
    SPDRP_DEVICEDESC, SPDRP_FRIENDLYNAME, SPDRP_HARDWAREID, SPDRP_SERVICE,
    SetupDiDestroyDeviceInfoList, SetupDiEnumDeviceInfo, SetupDiGetClassDevsW,
    SetupDiGetDeviceInstanceIdW, SetupDiGetDeviceRegistryPropertyW,
};
use windows_sys::Win32::Foundation::{ERROR_INSUFFICIENT_BUFFER, ERROR_NO_MORE_ITEMS};

const REG_SZ: u32 = 1;
const REG_MULTI_SZ: u32 = 7;

/// Owned device information set.
struct DevInfoList(HDEVINFO);

impl Drop for DevInfoList {
    fn drop(&mut self) {
        unsafe { SetupDiDestroyDeviceInfoList(self.0) };
    }
}

/// Build a NUL-terminated UTF-16 string for Win32.
fn wide(text: &str) -> Vec<u16> {
    OsStr::new(text).encode_wide().chain(iter::once(0)).collect()
}

/// Every present PCI device classified as an xHCI controller.
///
/// Fails only when the device information set cannot be opened. Per-device
/// resolution failures are recorded in the returned records.
pub fn enumerate_xhci_controllers() -> io::Result<Vec<ControllerRecord>> {
    let enumerator = wide("PCI");
    let handle = unsafe {
        SetupDiGetClassDevsW(ptr::null(), enumerator.as_ptr(), ptr::null_mut(), DIGCF_PRESENT | DIGCF_ALLCLASSES)
    };
    if handle as isize == -1 {
        return Err(io::Error::last_os_error());
    }
    let list = DevInfoList(handle);

    let mut controllers = Vec::new();
    for index in 0.. {
        let mut info: SP_DEVINFO_DATA = unsafe { mem::zeroed() };
        info.cbSize = mem::size_of::<SP_DEVINFO_DATA>() as u32;
        if unsafe { SetupDiEnumDeviceInfo(list.0, index, &mut info) } == 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(ERROR_NO_MORE_ITEMS as i32) {
                imod_log!(Level::Warn, "imod.devices", "Device enumeration stopped early: {}", err);
            }
            break;
        }

        let service = string_property(&list, &info, SPDRP_SERVICE);
        let hardware_ids = multi_sz_property(&list, &info, SPDRP_HARDWAREID);
        let compatible_ids = multi_sz_property(&list, &info, SPDRP_COMPATIBLEIDS);
        if !is_xhci_controller(service.as_deref(), &hardware_ids, &compatible_ids) {
            continue;
        }

        let Some(device_id) = instance_id(&list, &info) else {
            imod_log!(Level::Warn, "imod.devices", "Skipping xHCI device {} without an instance id", index);
            continue;
        };
        let caption = caption_for(
            string_property(&list, &info, SPDRP_FRIENDLYNAME).as_deref(),
            string_property(&list, &info, SPDRP_DEVICEDESC).as_deref(),
        );
        let problem = cfgmgr::problem_code(info.DevInst);
        let base = cfgmgr::resolve_base_address(info.DevInst);

        match &base {
            Ok(addr) => imod_log!(Level::Debug, "imod.devices", "Found {} ({}) at {:#X}", caption, device_id, addr),
            Err(e) => imod_log!(Level::Debug, "imod.devices", "Found {} ({}) without base: {}", caption, device_id, e),
        }
        controllers.push(ControllerRecord::new(device_id, caption, problem, base));
    }
    Ok(controllers)
}

/// Raw registry property bytes and their `REG_*` type.
fn raw_property(list: &DevInfoList, info: &SP_DEVINFO_DATA, property: u32) -> Option<(u32, Vec<u16>)> {
    let mut reg_type = 0u32;
    let mut required = 0u32;
    let ok = unsafe {
        SetupDiGetDeviceRegistryPropertyW(list.0, info, property, &mut reg_type, ptr::null_mut(), 0, &mut required)
    };
    if ok == 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(ERROR_INSUFFICIENT_BUFFER as i32) || required == 0 {
            return None;
        }
    }

    let mut buffer = vec![0u16; (required as usize).div_ceil(2)];
    let ok = unsafe {
        SetupDiGetDeviceRegistryPropertyW(
            list.0,
            info,
            property,
            &mut reg_type,
            buffer.as_mut_ptr().cast(),
            (buffer.len() * 2) as u32,
            &mut required,
        )
    };
    (ok != 0).then_some((reg_type, buffer))
}

fn string_property(list: &DevInfoList, info: &SP_DEVINFO_DATA, property: u32) -> Option<String> {
    match raw_property(list, info, property)? {
        (REG_SZ, buffer) => Some(parse_sz(&buffer)).filter(|s| !s.is_empty()),
        (REG_MULTI_SZ, buffer) => parse_multi_sz(&buffer).into_iter().next(),
        _ => None,
    }
}

fn multi_sz_property(list: &DevInfoList, info: &SP_DEVINFO_DATA, property: u32) -> Vec<String> {
    match raw_property(list, info, property) {
        Some((REG_MULTI_SZ, buffer)) => parse_multi_sz(&buffer),
        Some((REG_SZ, buffer)) => Some(parse_sz(&buffer)).filter(|s| !s.is_empty()).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn instance_id(list: &DevInfoList, info: &SP_DEVINFO_DATA) -> Option<String> {
    let mut required = 0u32;
    unsafe { SetupDiGetDeviceInstanceIdW(list.0, info, ptr::null_mut(), 0, &mut required) };
    if required == 0 {
        return None;
    }
    let mut buffer = vec![0u16; required as usize];
    let ok = unsafe {
        SetupDiGetDeviceInstanceIdW(list.0, info, buffer.as_mut_ptr(), required, &mut required)
    };
    (ok != 0).then(|| parse_sz(&buffer)).filter(|s| !s.is_empty())
}
