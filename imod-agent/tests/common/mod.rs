//! In-memory stand-ins for the helper driver, the service control manager
//! and the host. Shared by the integration tests.
#![allow(dead_code)]

use imod::comms::session::{DeviceChannel, DriverBackend, ServiceOrigin, StopPolicy};
use imod::comms::{Mapping, PhysicalMemory};
use imod::devices::ControllerRecord;
use imod::engine::runner::Platform;
use imod::error::{ImodError, MemoryError, ResourceError, SessionError};
use shared::winio::{IOCTL_WINIO_MAPPHYSTOLIN, IOCTL_WINIO_UNMAPPHYSADDR, PhysStruct};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::rc::Rc;

pub const BASE: u64 = 0xF7F0_0000;
pub const RTSOFF_VALUE: u32 = 0x2000;
pub const LINEAR_BIAS: u64 = 0xFFFF_8000_0000_0000;
pub const XHCI_ID: &str = r"PCI\VEN_8086&DEV_A36D&SUBSYS_86941043&REV_10\3&11583659&0&A0";

/// IMOD register of interrupter `i` for a controller built by [`install_xhci`].
pub fn imod_addr(base: u64, i: u64) -> u64 {
    base + u64::from(RTSOFF_VALUE) + 0x24 + 0x20 * i
}

pub fn controller(id: &str, base: Option<u64>) -> ControllerRecord {
    let base = base.ok_or(ResourceError::NoMemoryResourceFound);
    ControllerRecord::new(id, "USB xHCI Compliant Host Controller", 0, base)
}

// ───── plain register file ──────────────────────────────────────────────────

/// `PhysicalMemory` over a map of registers with per-address failures.
#[derive(Default)]
pub struct FakeBus {
    pub registers: HashMap<u64, u32>,
    pub fail_read: HashSet<u64>,
    pub fail_write: HashSet<u64>,
    /// Every map attempt, successful or not.
    pub mapped: Vec<u64>,
    pub reads: Vec<u64>,
    pub writes: Vec<(u64, u32)>,
}

impl FakeBus {
    /// Registers for one controller with `interrupters` interrupters.
    pub fn with_xhci(base: u64, interrupters: u32) -> Self {
        let mut bus = FakeBus::default();
        bus.install_xhci(base, interrupters);
        bus
    }

    pub fn install_xhci(&mut self, base: u64, interrupters: u32) {
        self.registers.insert(base + 0x4, 0x0500_0000 | (interrupters << 8) | 0x40);
        self.registers.insert(base + 0x18, RTSOFF_VALUE);
    }

    pub fn touched(&self) -> bool {
        !self.mapped.is_empty()
    }
}

impl PhysicalMemory for FakeBus {
    fn map(&mut self, physical: u64, size: u64) -> Result<Mapping, MemoryError> {
        self.mapped.push(physical);
        if self.fail_read.contains(&physical) || self.fail_write.contains(&physical) {
            return Err(MemoryError::Map(io::Error::from_raw_os_error(31)));
        }
        Ok(Mapping::new(physical, size, physical | LINEAR_BIAS))
    }

    fn unmap(&mut self, _mapping: Mapping) -> Result<(), MemoryError> {
        Ok(())
    }

    unsafe fn peek32(&mut self, mapping: &Mapping) -> u32 {
        self.reads.push(mapping.physical());
        self.registers.get(&mapping.physical()).copied().unwrap_or(0)
    }

    unsafe fn poke32(&mut self, mapping: &Mapping, value: u32) {
        self.writes.push((mapping.physical(), value));
        self.registers.insert(mapping.physical(), value);
    }
}

// ───── driver + service manager ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ensure(String),
    Start(String),
    OpenDevice(String),
    Control(u32),
    Stop(String, StopPolicy),
    Delete(String),
}

/// Machine state observed through the fake backend.
#[derive(Default)]
pub struct Machine {
    pub service_exists: bool,
    pub fail_start: bool,
    pub fail_open: bool,
    pub registers: HashMap<u64, u32>,
    pub fail_map: HashSet<u64>,
    pub fail_unmap: HashSet<u64>,
    pub null_linear: HashSet<u64>,
    pub calls: Vec<Call>,
}

pub type SharedMachine = Rc<RefCell<Machine>>;

impl Machine {
    pub fn shared() -> SharedMachine {
        Rc::new(RefCell::new(Machine::default()))
    }

    pub fn install_xhci(&mut self, base: u64, interrupters: u32) {
        self.registers.insert(base + 0x4, interrupters << 8);
        self.registers.insert(base + 0x18, RTSOFF_VALUE);
    }

    pub fn controls(&self, code: u32) -> usize {
        self.calls.iter().filter(|c| **c == Call::Control(code)).count()
    }
}

pub struct FakeChannel {
    machine: SharedMachine,
}

impl DeviceChannel for FakeChannel {
    fn control(&self, code: u32, descriptor: Option<&mut PhysStruct>) -> io::Result<()> {
        let mut m = self.machine.borrow_mut();
        m.calls.push(Call::Control(code));
        match (code, descriptor) {
            (IOCTL_WINIO_MAPPHYSTOLIN, Some(d)) => {
                if m.fail_map.contains(&d.phys_address) {
                    return Err(io::Error::from_raw_os_error(31));
                }
                if !m.null_linear.contains(&d.phys_address) {
                    d.phys_mem_lin = d.phys_address | LINEAR_BIAS;
                }
                d.physical_memory_handle = 0x2C4;
                Ok(())
            }
            (IOCTL_WINIO_UNMAPPHYSADDR, Some(d)) => {
                if m.fail_unmap.contains(&d.phys_address) {
                    Err(io::Error::from_raw_os_error(87))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    unsafe fn read_linear(&self, linear: u64) -> u32 {
        self.machine.borrow().registers.get(&(linear & !LINEAR_BIAS)).copied().unwrap_or(0)
    }

    unsafe fn write_linear(&self, linear: u64, value: u32) {
        self.machine.borrow_mut().registers.insert(linear & !LINEAR_BIAS, value);
    }
}

pub struct FakeBackend {
    pub machine: SharedMachine,
}

impl DriverBackend for FakeBackend {
    type Channel = FakeChannel;

    fn ensure_service(&mut self, name: &str, _image: &Path) -> Result<ServiceOrigin, SessionError> {
        let mut m = self.machine.borrow_mut();
        m.calls.push(Call::Ensure(name.to_string()));
        if m.service_exists {
            Ok(ServiceOrigin::PreExisting)
        } else {
            m.service_exists = true;
            Ok(ServiceOrigin::Created)
        }
    }

    fn start_service(&mut self, name: &str) -> Result<(), SessionError> {
        let mut m = self.machine.borrow_mut();
        m.calls.push(Call::Start(name.to_string()));
        if m.fail_start {
            return Err(SessionError::StartService {
                service: name.to_string(),
                source: io::Error::from_raw_os_error(577),
            });
        }
        Ok(())
    }

    fn open_device(&mut self, path: &str) -> Result<FakeChannel, SessionError> {
        let mut m = self.machine.borrow_mut();
        m.calls.push(Call::OpenDevice(path.to_string()));
        if m.fail_open {
            return Err(SessionError::OpenDevice {
                path: path.to_string(),
                source: io::Error::from_raw_os_error(2),
            });
        }
        Ok(FakeChannel { machine: Rc::clone(&self.machine) })
    }

    fn stop_service(&mut self, name: &str, policy: StopPolicy) {
        self.machine.borrow_mut().calls.push(Call::Stop(name.to_string(), policy));
    }

    fn delete_service(&mut self, name: &str) {
        let mut m = self.machine.borrow_mut();
        m.calls.push(Call::Delete(name.to_string()));
        m.service_exists = false;
    }
}

// ───── host ─────────────────────────────────────────────────────────────────

pub struct FakePlatform {
    pub machine: SharedMachine,
    pub elevated: bool,
    pub is_64bit: bool,
    pub controllers: Vec<ControllerRecord>,
    pub enumeration_fails: bool,
}

impl FakePlatform {
    pub fn new(controllers: Vec<ControllerRecord>) -> Self {
        Self {
            machine: Machine::shared(),
            elevated: true,
            is_64bit: true,
            controllers,
            enumeration_fails: false,
        }
    }
}

impl Platform for FakePlatform {
    type Backend = FakeBackend;

    fn is_elevated(&self) -> bool {
        self.elevated
    }

    fn is_64bit_os(&self) -> bool {
        self.is_64bit
    }

    fn enumerate_controllers(&self) -> Result<Vec<ControllerRecord>, ImodError> {
        if self.enumeration_fails {
            return Err(ImodError::Enumeration(io::Error::from_raw_os_error(5)));
        }
        Ok(self.controllers.clone())
    }

    fn driver_backend(&self) -> Result<FakeBackend, SessionError> {
        Ok(FakeBackend { machine: Rc::clone(&self.machine) })
    }
}
