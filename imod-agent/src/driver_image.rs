// src/driver_image.rs

//! Makes sure the helper driver image exists where the service will point.
//!
//! Lookup order: the system-directory path, then extraction of the embedded
//! image (feature `embedded-driver`), then a search of a few well-known
//! folders next to the agent.

use crate::config::ImodPaths;
use crate::error::ImodError;
use crate::imod_log;
use log::Level;
use sha2::{Digest, Sha256};
use shared::constants::WINIO_IMAGE_NAME;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Image compiled into the binary, if any.
#[cfg(feature = "embedded-driver")]
pub const EMBEDDED_IMAGE: Option<&[u8]> = Some(include_bytes!(env!("IMOD_WINIO_SYS")));
#[cfg(not(feature = "embedded-driver"))]
pub const EMBEDDED_IMAGE: Option<&[u8]> = None;

#[derive(Debug, Clone)]
pub struct DriverImage {
    path: PathBuf,
    embedded: Option<&'static [u8]>,
    search_dirs: Vec<PathBuf>,
}

/// Image ready for registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedImage {
    pub path: PathBuf,
    /// Lives at the system path and may be removed after use.
    pub at_system_path: bool,
}

impl DriverImage {
    /// Image expected at `path`, with the compiled-in copy as fallback.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), embedded: EMBEDDED_IMAGE, search_dirs: Vec::new() }
    }

    /// System image location plus the default search folders.
    pub fn for_paths(paths: &ImodPaths) -> Self {
        let mut dirs = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd);
        }
        dirs.extend(paths.agent_exe.ancestors().skip(1).take(3).map(Path::to_path_buf));
        Self::new(&paths.driver_image).with_search_dirs(dirs)
    }

    pub fn with_embedded(mut self, bytes: &'static [u8]) -> Self {
        self.embedded = Some(bytes);
        self
    }

    pub fn without_embedded(mut self) -> Self {
        self.embedded = None;
        self
    }

    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    /// Locate or extract the image.
    pub fn ensure_on_disk(&self) -> Result<ProvisionedImage, ImodError> {
        if self.path.is_file() {
            self.log_digest(&self.path);
            return Ok(ProvisionedImage { path: self.path.clone(), at_system_path: true });
        }

        if let Some(bytes) = self.embedded {
            self.extract(bytes)?;
            imod_log!(Level::Info, "imod.driver", "Extracted driver image to {}", self.path.display());
            self.log_digest(&self.path);
            return Ok(ProvisionedImage { path: self.path.clone(), at_system_path: true });
        }

        let found = self
            .search_dirs
            .iter()
            .map(|dir| dir.join(WINIO_IMAGE_NAME))
            .find(|candidate| candidate.is_file());
        match found {
            Some(path) => {
                imod_log!(Level::Info, "imod.driver", "Using driver image {}", path.display());
                self.log_digest(&path);
                Ok(ProvisionedImage { path, at_system_path: false })
            }
            None => Err(ImodError::DriverImageMissing(self.path.clone())),
        }
    }

    fn extract(&self, bytes: &[u8]) -> Result<(), ImodError> {
        let write = || -> io::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&self.path, bytes)
        };
        write().map_err(|source| ImodError::DriverImageWrite { path: self.path.clone(), source })
    }

    fn log_digest(&self, path: &Path) {
        match image_digest(path) {
            Ok(digest) => {
                imod_log!(Level::Debug, "imod.driver", "Driver image {} sha256={}", path.display(), digest);
                if let Some(bytes) = self.embedded {
                    if hex::encode(Sha256::digest(bytes)) != digest {
                        imod_log!(Level::Warn, "imod.driver", "{} differs from the bundled driver image", path.display());
                    }
                }
            }
            Err(e) => imod_log!(Level::Debug, "imod.driver", "Could not hash {}: {}", path.display(), e),
        }
    }
}

/// Hex SHA-256 of the file at `path`.
pub fn image_digest(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Deletes the system driver image on drop unless disarmed.
#[derive(Debug)]
pub struct ImageCleanup {
    path: Option<PathBuf>,
}

impl ImageCleanup {
    /// Guard for `image`. Only system-path images are ever removed.
    pub fn new(image: &ProvisionedImage, remove: bool) -> Self {
        let path = (remove && image.at_system_path).then(|| image.path.clone());
        Self { path }
    }
}

impl Drop for ImageCleanup {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match fs::remove_file(&path) {
            Ok(()) => imod_log!(Level::Debug, "imod.driver", "Removed driver image {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => imod_log!(Level::Warn, "imod.driver", "Failed to remove {}: {}", path.display(), e),
        }
    }
}
