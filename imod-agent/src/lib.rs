// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

pub mod macros;

pub mod comms;
pub mod config;
pub mod devices;
pub mod driver_image;
pub mod engine;
pub mod entry;
pub mod error;
pub mod logging;
pub mod persist;
pub mod platform;
