// Helper driver identity. The service is registered under this name and the
// device object is reachable through the DOS device path below.
pub const WINIO_SERVICE_NAME: &str = "WINIO";
pub const WINIO_DEVICE_PATH: &str = r"\\.\WINIO";
pub const WINIO_IMAGE_NAME: &str = "winio.sys";

// Persisted startup artifact written into the user's Startup folder.
pub const STARTUP_SCRIPT_NAME: &str = "ApplyIMOD.ps1";

// Service shutdown wait: 25 polls of 200 ms each (5 s total).
pub const SERVICE_STOP_POLL_ATTEMPTS: u32 = 25;
pub const SERVICE_STOP_POLL_INTERVAL_MS: u64 = 200;
