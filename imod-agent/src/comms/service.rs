//! Service control manager backend for the helper driver.

use crate::comms::ioctl::WinIoDevice;
use crate::comms::session::{DriverBackend, ServiceOrigin, StopPolicy};
use crate::error::SessionError;
use crate::imod_log;
use log::Level;
use std::{ffi::OsString, io, path::Path, thread};
use windows_service::{
    Error as ServiceError,
    service::{
        Service, ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType, ServiceState,
        ServiceType,
    },
    service_manager::{ServiceManager, ServiceManagerAccess},
};

const ERROR_SERVICE_ALREADY_RUNNING: i32 = 1056;
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;

fn service_access() -> ServiceAccess {
    ServiceAccess::QUERY_STATUS | ServiceAccess::START | ServiceAccess::STOP | ServiceAccess::DELETE
}

/// Flatten a `windows-service` error into the underlying OS error.
fn os_error(err: ServiceError) -> io::Error {
    match err {
        ServiceError::Winapi(e) => e,
        other => io::Error::other(other.to_string()),
    }
}

/// Live connection to the local service control manager.
pub struct ScmBackend {
    manager: ServiceManager,
    service: Option<Service>,
}

impl ScmBackend {
    pub fn connect() -> Result<Self, SessionError> {
        let manager = ServiceManager::local_computer(
            None::<&str>,
            ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE,
        )
        .map_err(|e| SessionError::ServiceManager(os_error(e)))?;
        Ok(Self { manager, service: None })
    }

    fn service(&mut self, name: &str) -> Option<&Service> {
        if self.service.is_none() {
            match self.manager.open_service(name, service_access()) {
                Ok(service) => self.service = Some(service),
                Err(e) => {
                    imod_log!(Level::Warn, "imod.driver", "Failed to open service {}: {}", name, os_error(e));
                    return None;
                }
            }
        }
        self.service.as_ref()
    }
}

impl DriverBackend for ScmBackend {
    type Channel = WinIoDevice;

    fn ensure_service(&mut self, name: &str, image: &Path) -> Result<ServiceOrigin, SessionError> {
        match self.manager.open_service(name, service_access()) {
            Ok(service) => {
                self.service = Some(service);
                return Ok(ServiceOrigin::PreExisting);
            }
            Err(e) => {
                let e = os_error(e);
                if e.raw_os_error() != Some(ERROR_SERVICE_DOES_NOT_EXIST) {
                    return Err(SessionError::OpenService { service: name.to_string(), source: e });
                }
            }
        }

        let info = ServiceInfo {
            name: OsString::from(name),
            display_name: OsString::from(name),
            service_type: ServiceType::KERNEL_DRIVER,
            start_type: ServiceStartType::OnDemand,
            error_control: ServiceErrorControl::Normal,
            executable_path: image.to_path_buf(),
            launch_arguments: vec![],
            dependencies: vec![],
            account_name: None,
            account_password: None,
        };
        let service = self
            .manager
            .create_service(&info, service_access())
            .map_err(|e| SessionError::CreateService { service: name.to_string(), source: os_error(e) })?;
        self.service = Some(service);
        Ok(ServiceOrigin::Created)
    }

    fn start_service(&mut self, name: &str) -> Result<(), SessionError> {
        let service = self.service(name).ok_or_else(|| SessionError::StartService {
            service: name.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "service handle unavailable"),
        })?;

        if let Ok(status) = service.query_status() {
            if status.current_state == ServiceState::Running {
                return Ok(());
            }
        }
        match service.start::<&str>(&[]) {
            Ok(()) => Ok(()),
            Err(e) => {
                let e = os_error(e);
                if e.raw_os_error() == Some(ERROR_SERVICE_ALREADY_RUNNING) {
                    Ok(())
                } else {
                    Err(SessionError::StartService { service: name.to_string(), source: e })
                }
            }
        }
    }

    fn open_device(&mut self, path: &str) -> Result<WinIoDevice, SessionError> {
        WinIoDevice::open(path).map_err(|source| SessionError::OpenDevice { path: path.to_string(), source })
    }

    fn stop_service(&mut self, name: &str, policy: StopPolicy) {
        let Some(service) = self.service(name) else {
            return;
        };
        match service.query_status() {
            Ok(status) if status.current_state == ServiceState::Stopped => return,
            _ => {}
        }
        if let Err(e) = service.stop() {
            imod_log!(Level::Warn, "imod.driver", "Failed to stop service {}: {}", name, os_error(e));
        }
        for _ in 0..policy.attempts {
            match service.query_status() {
                Ok(status) if status.current_state != ServiceState::Stopped => thread::sleep(policy.interval),
                _ => break,
            }
        }
    }

    fn delete_service(&mut self, name: &str) {
        let Some(service) = self.service.take().or_else(|| self.manager.open_service(name, service_access()).ok()) else {
            return;
        };
        if let Err(e) = service.delete() {
            imod_log!(Level::Warn, "imod.driver", "Failed to delete service {}: {}", name, os_error(e));
        }
    }
}
