//! Public API for configuration

pub mod loader;
pub mod model;
pub mod parser;
pub mod paths;
pub mod types;
pub mod writer;

// Re-export the main entrypoints:
pub use loader::{load, load_agent_settings, save};
pub use model::{EffectiveSettings, ImodConfig, OverrideEntry};
pub use paths::ImodPaths;
