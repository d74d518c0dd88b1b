//! Host integration for the apply runner.
//!
//! [`NativePlatform`] is the Windows implementation on Windows and a stub
//! that reports [`ImodError::Unsupported`](crate::error::ImodError) elsewhere.

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::WindowsPlatform as NativePlatform;

#[cfg(not(windows))]
mod unsupported;
#[cfg(not(windows))]
pub use self::unsupported::UnsupportedPlatform as NativePlatform;
