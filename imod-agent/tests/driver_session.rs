//! Lifecycle tests for the helper driver session against a scripted service
//! manager.

mod common;

use common::{BASE, Call, FakeBackend, Machine, RTSOFF_VALUE, SharedMachine};
use imod::comms::PhysicalMemory;
use imod::comms::session::{DriverSession, SessionState, StopPolicy};
use imod::error::{MemoryError, SessionError};
use shared::constants::{WINIO_DEVICE_PATH, WINIO_SERVICE_NAME};
use shared::winio::{
    IOCTL_WINIO_DISABLEDIRECTIO, IOCTL_WINIO_ENABLEDIRECTIO, IOCTL_WINIO_MAPPHYSTOLIN,
    IOCTL_WINIO_UNMAPPHYSADDR,
};
use log::{LevelFilter, Log, Metadata, Record};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const IMAGE: &str = r"C:\Windows\winio.sys";

fn open(machine: &SharedMachine, is_64bit: bool) -> Result<DriverSession<FakeBackend>, SessionError> {
    let backend = FakeBackend { machine: machine.clone() };
    DriverSession::open(backend, Path::new(IMAGE), is_64bit)
}

/// Captures `imod.driver` records from every test in this binary.
struct DriverLog {
    lines: Mutex<Vec<String>>,
}

impl Log for DriverLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target() == "imod.driver"
    }
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.lines.lock().unwrap().push(record.args().to_string());
        }
    }
    fn flush(&self) {}
}

static DRIVER_LOG: DriverLog = DriverLog { lines: Mutex::new(Vec::new()) };

fn name() -> String {
    WINIO_SERVICE_NAME.to_string()
}

#[test]
fn created_service_is_stopped_and_deleted_on_close() {
    let machine = Machine::shared();
    let session = open(&machine, true).unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert!(session.service_created());

    session.close();

    let policy = StopPolicy { attempts: 25, interval: Duration::from_millis(200) };
    assert_eq!(
        machine.borrow().calls,
        vec![
            Call::Ensure(name()),
            Call::Start(name()),
            Call::OpenDevice(WINIO_DEVICE_PATH.to_string()),
            Call::Stop(name(), policy),
            Call::Delete(name()),
        ]
    );
    assert!(!machine.borrow().service_exists);
}

#[test]
fn dropping_the_session_also_tears_down() {
    let machine = Machine::shared();
    drop(open(&machine, true).unwrap());
    assert!(machine.borrow().calls.contains(&Call::Delete(name())));
}

#[test]
fn pre_existing_service_is_left_alone() {
    let machine = Machine::shared();
    machine.borrow_mut().service_exists = true;

    let session = open(&machine, true).unwrap();
    assert!(!session.service_created());
    session.close();

    let m = machine.borrow();
    assert!(m.service_exists);
    assert!(!m.calls.iter().any(|c| matches!(c, Call::Stop(..) | Call::Delete(_))));
}

#[test]
fn direct_io_is_toggled_only_on_32_bit() {
    let machine = Machine::shared();
    open(&machine, false).unwrap().close();
    {
        let m = machine.borrow();
        assert_eq!(m.controls(IOCTL_WINIO_ENABLEDIRECTIO), 1);
        assert_eq!(m.controls(IOCTL_WINIO_DISABLEDIRECTIO), 1);
        let disable = m.calls.iter().position(|c| *c == Call::Control(IOCTL_WINIO_DISABLEDIRECTIO));
        let stop = m.calls.iter().position(|c| matches!(c, Call::Stop(..)));
        assert!(disable < stop);
    }

    let machine = Machine::shared();
    open(&machine, true).unwrap().close();
    let m = machine.borrow();
    assert_eq!(m.controls(IOCTL_WINIO_ENABLEDIRECTIO), 0);
    assert_eq!(m.controls(IOCTL_WINIO_DISABLEDIRECTIO), 0);
}

#[test]
fn start_failure_removes_the_service_it_created() {
    let machine = Machine::shared();
    machine.borrow_mut().fail_start = true;

    let err = open(&machine, true).err();
    assert!(matches!(err, Some(SessionError::StartService { .. })));

    let m = machine.borrow();
    assert!(m.calls.contains(&Call::Delete(name())));
    assert!(!m.calls.iter().any(|c| matches!(c, Call::OpenDevice(_))));
}

#[test]
fn open_failure_on_pre_existing_service_leaves_it_running() {
    let machine = Machine::shared();
    {
        let mut m = machine.borrow_mut();
        m.service_exists = true;
        m.fail_open = true;
    }

    let err = open(&machine, true).err();
    assert!(matches!(err, Some(SessionError::OpenDevice { .. })));

    let m = machine.borrow();
    assert!(m.service_exists);
    assert!(!m.calls.iter().any(|c| matches!(c, Call::Stop(..) | Call::Delete(_))));
}

#[test]
fn read_and_write_map_once_and_unmap_once() {
    let machine = Machine::shared();
    machine.borrow_mut().install_xhci(BASE, 8);

    let mut session = open(&machine, true).unwrap();
    assert_eq!(session.read32(BASE + 0x18).unwrap(), RTSOFF_VALUE);
    session.write32(BASE + 0x2024, 0x3E8).unwrap();
    session.close();

    let m = machine.borrow();
    assert_eq!(m.controls(IOCTL_WINIO_MAPPHYSTOLIN), 2);
    assert_eq!(m.controls(IOCTL_WINIO_UNMAPPHYSADDR), 2);
    assert_eq!(m.registers.get(&(BASE + 0x2024)), Some(&0x3E8));
}

#[test]
fn null_linear_address_is_a_map_failure() {
    let machine = Machine::shared();
    machine.borrow_mut().null_linear.insert(BASE + 0x4);

    let mut session = open(&machine, true).unwrap();
    assert!(matches!(session.read32(BASE + 0x4), Err(MemoryError::NullLinearAddress)));
    assert_eq!(machine.borrow().controls(IOCTL_WINIO_UNMAPPHYSADDR), 0);
}

#[test]
fn failed_map_is_reported() {
    let machine = Machine::shared();
    machine.borrow_mut().fail_map.insert(BASE + 0x4);

    let mut session = open(&machine, true).unwrap();
    assert!(matches!(session.read32(BASE + 0x4), Err(MemoryError::Map(_))));
}

#[test]
fn failed_unmap_fails_the_access() {
    let machine = Machine::shared();
    {
        let mut m = machine.borrow_mut();
        m.install_xhci(BASE, 2);
        m.fail_unmap.insert(BASE + 0x4);
    }

    let mut session = open(&machine, true).unwrap();
    assert!(matches!(session.read32(BASE + 0x4), Err(MemoryError::Unmap(_))));
    assert!(matches!(session.write32(BASE + 0x4, 1), Err(MemoryError::Unmap(_))));
}

#[test]
fn every_state_change_is_logged_as_a_transition() {
    let _ = log::set_logger(&DRIVER_LOG);
    log::set_max_level(LevelFilter::Debug);

    let machine = Machine::shared();
    open(&machine, false).unwrap().close();

    let lines = DRIVER_LOG.lines.lock().unwrap();
    for step in [
        "Session state ServiceReady -> HandleOpen",
        "Session state HandleOpen -> DirectIoEnabled",
        "Session state DirectIoEnabled -> Active",
        "Session state Closing -> Closed",
    ] {
        assert!(lines.iter().any(|l| l == step), "missing {step:?} in {lines:?}");
    }
    assert!(!lines.iter().any(|l| l.starts_with("Session state ->")));
}
