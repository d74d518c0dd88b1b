//! CfgMgr32 access: devnode status and memory resource descriptors.
//!
//! Log-conf and res-des handles are owned by RAII wrappers. The walker takes
//! the next descriptor before the current one is dropped, so every handle
//! is released on every path out of the loop.

use crate::devices::resources::{MemoryDescriptorKind, lowest_base};
use crate::error::ResourceError;
use crate::imod_log;
use log::Level;
use windows_sys::Win32::Devices::DeviceAndDriverInstallation::{
    ALLOC_LOG_CONF, BOOT_LOG_CONF, CM_Free_Log_Conf_Handle, CM_Free_Res_Des_Handle,
    CM_Get_DevNode_Status, CM_Get_First_Log_Conf, CM_Get_Next_Res_Des, CM_Get_Res_Des_Data,
    CM_Get_Res_Des_Data_Size, CR_SUCCESS,
};

/// Owned `LOG_CONF`.
struct LogConf(usize);

impl Drop for LogConf {
    fn drop(&mut self) {
        unsafe { CM_Free_Log_Conf_Handle(self.0) };
    }
}

/// Owned `RES_DES`.
struct ResDes(usize);

impl Drop for ResDes {
    fn drop(&mut self) {
        unsafe { CM_Free_Res_Des_Handle(self.0) };
    }
}

/// Problem code of a devnode, 0 when it reports none or cannot be queried.
pub fn problem_code(devinst: u32) -> u32 {
    let mut status = 0u32;
    let mut problem = 0u32;
    let cr = unsafe { CM_Get_DevNode_Status(&mut status, &mut problem, devinst, 0) };
    if cr == CR_SUCCESS { problem } else { 0 }
}

/// Lowest memory base assigned to `devinst`.
pub fn resolve_base_address(devinst: u32) -> Result<u64, ResourceError> {
    let log_conf = first_log_conf(devinst)?;

    let mut payloads = Vec::new();
    for kind in MemoryDescriptorKind::ALL {
        collect_descriptors(&log_conf, kind, &mut payloads);
    }

    lowest_base(payloads.iter().map(|(kind, data)| (*kind, data.as_slice())))
}

/// Allocated configuration, falling back to the boot configuration.
fn first_log_conf(devinst: u32) -> Result<LogConf, ResourceError> {
    let mut handle = 0usize;
    let mut cr = unsafe { CM_Get_First_Log_Conf(&mut handle, devinst, ALLOC_LOG_CONF) };
    if cr != CR_SUCCESS {
        cr = unsafe { CM_Get_First_Log_Conf(&mut handle, devinst, BOOT_LOG_CONF) };
    }
    if cr != CR_SUCCESS {
        return Err(ResourceError::LogicalConfigUnavailable(cr));
    }
    Ok(LogConf(handle))
}

/// Append the payload of every `kind` descriptor in `log_conf` to `out`.
fn collect_descriptors(log_conf: &LogConf, kind: MemoryDescriptorKind, out: &mut Vec<(MemoryDescriptorKind, Vec<u8>)>) {
    let mut current = match next_res_des(log_conf.0, kind) {
        Some(rd) => rd,
        None => return,
    };
    loop {
        if let Some(data) = descriptor_data(&current) {
            out.push((kind, data));
        }
        // Assigning drops the previous handle once its successor is known.
        current = match next_res_des(current.0, kind) {
            Some(rd) => rd,
            None => return,
        };
    }
}

fn next_res_des(from: usize, kind: MemoryDescriptorKind) -> Option<ResDes> {
    let mut next = 0usize;
    let mut resource_id = 0u32;
    let cr = unsafe { CM_Get_Next_Res_Des(&mut next, from, kind.resource_type(), &mut resource_id, 0) };
    (cr == CR_SUCCESS).then_some(ResDes(next))
}

fn descriptor_data(rd: &ResDes) -> Option<Vec<u8>> {
    let mut size = 0u32;
    let cr = unsafe { CM_Get_Res_Des_Data_Size(&mut size, rd.0, 0) };
    if cr != CR_SUCCESS || size == 0 {
        imod_log!(Level::Debug, "imod.devices", "Resource descriptor size query failed (CONFIGRET {})", cr);
        return None;
    }
    let mut data = vec![0u8; size as usize];
    let cr = unsafe { CM_Get_Res_Des_Data(rd.0, data.as_mut_ptr().cast(), size, 0) };
    if cr != CR_SUCCESS {
        imod_log!(Level::Debug, "imod.devices", "Resource descriptor read failed (CONFIGRET {})", cr);
        return None;
    }
    Some(data)
}
