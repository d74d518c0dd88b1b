// src/engine/mod.rs

//! Apply engine: programs the IMOD interval of every interrupter on every
//! eligible controller.
//!
//! Hardware faults never abort the batch. Each controller yields a
//! [`ControllerOutcome`] that is folded into [`ApplyStats`].

pub mod runner;
pub mod xhci;

use crate::comms::PhysicalMemory;
use crate::config::ImodConfig;
use crate::devices::ControllerRecord;
use crate::error::MemoryError;
use crate::imod_log;
use log::Level;
use serde::Serialize;

/// Totals for one apply call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyStats {
    pub controllers_found: u32,
    pub controllers_applied: u32,
    pub write_failures: u32,
    pub skipped_disabled: u32,
    pub missing_base: u32,
    pub read_failures: u32,
}

impl ApplyStats {
    pub fn record(&mut self, outcome: &ControllerOutcome) {
        match outcome {
            ControllerOutcome::DeviceDisabled | ControllerOutcome::DisabledByConfig => self.skipped_disabled += 1,
            ControllerOutcome::MissingBase => self.missing_base += 1,
            ControllerOutcome::ReadFailed { .. } => self.read_failures += 1,
            ControllerOutcome::Applied { write_failures, .. } => {
                self.controllers_applied += 1;
                self.write_failures += *write_failures;
            }
        }
    }
}

/// Capability register the engine reads before programming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Hcsparams,
    Rtsoff,
}

impl Register {
    pub fn name(self) -> &'static str {
        match self {
            Register::Hcsparams => "HCSPARAMS",
            Register::Rtsoff => "RTSOFF",
        }
    }
}

/// What happened to one controller.
#[derive(Debug)]
pub enum ControllerOutcome {
    /// Devnode reports `CM_PROB_DISABLED`.
    DeviceDisabled,
    MissingBase,
    /// A matching override sets `ENABLED = $false`.
    DisabledByConfig,
    ReadFailed { register: Register, address: u64, error: MemoryError },
    /// Reached the interrupter loop. Individual writes may still have failed.
    Applied { interrupters: u32, write_failures: u32 },
}

/// Apply `config` to every controller, in order.
pub fn apply<M>(config: &ImodConfig, controllers: &[ControllerRecord], memory: &mut M) -> ApplyStats
where
    M: PhysicalMemory + ?Sized,
{
    let mut stats = ApplyStats {
        controllers_found: controllers.len() as u32,
        ..ApplyStats::default()
    };
    for controller in controllers {
        let outcome = apply_controller(config, controller, memory);
        stats.record(&outcome);
    }
    stats
}

/// Run the per-controller steps and report the outcome.
pub fn apply_controller<M>(config: &ImodConfig, controller: &ControllerRecord, memory: &mut M) -> ControllerOutcome
where
    M: PhysicalMemory + ?Sized,
{
    let caption = &controller.caption;

    if controller.is_disabled() {
        imod_log!(Level::Info, "imod", "Skipping disabled controller {}", caption);
        return ControllerOutcome::DeviceDisabled;
    }

    let Some(base) = controller.base_address else {
        imod_log!(
            Level::Warn,
            "imod",
            "{} has no base address ({})",
            caption,
            controller.base_error.as_deref().unwrap_or("unknown reason")
        );
        return ControllerOutcome::MissingBase;
    };

    let settings = config.effective_for(&controller.device_id);
    if !settings.enabled {
        imod_log!(Level::Info, "imod", "{} disabled by config", caption);
        return ControllerOutcome::DisabledByConfig;
    }

    // 1 ─ Capability registers
    let hcsparams_addr = base.wrapping_add(u64::from(settings.hcsparams_offset));
    let hcsparams = match memory.read32(hcsparams_addr) {
        Ok(v) => v,
        Err(error) => return read_failed(caption, Register::Hcsparams, hcsparams_addr, error),
    };
    let rtsoff_addr = base.wrapping_add(u64::from(settings.rtsoff));
    let rtsoff = match memory.read32(rtsoff_addr) {
        Ok(v) => v,
        Err(error) => return read_failed(caption, Register::Rtsoff, rtsoff_addr, error),
    };

    // 2 ─ Program every interrupter
    let interrupters = xhci::max_interrupters(hcsparams);
    let runtime_base = xhci::runtime_base(base, rtsoff);
    let mut write_failures = 0;
    for index in 0..interrupters {
        let address = xhci::imod_register(runtime_base, index);
        if let Err(e) = memory.write32(address, settings.interval) {
            write_failures += 1;
            imod_log!(Level::Warn, "imod", "Failed to write IMOD at {:#X} on {}: {}", address, caption, e);
        }
    }

    imod_log!(
        Level::Info,
        "imod",
        "{}: interval {:#X} written to {} interrupter(s) at runtime base {:#X} ({} failed)",
        caption,
        settings.interval,
        interrupters,
        runtime_base,
        write_failures
    );
    ControllerOutcome::Applied { interrupters, write_failures }
}

fn read_failed(caption: &str, register: Register, address: u64, error: MemoryError) -> ControllerOutcome {
    imod_log!(Level::Warn, "imod", "Failed to read {} at {:#X} on {}: {}", register.name(), address, caption, error);
    ControllerOutcome::ReadFailed { register, address, error }
}
