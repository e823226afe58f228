// Versions Module
// Terraform binary selection, caching and installation

pub mod cache;
pub mod installer;
pub mod platform;
pub mod resolver;

// Re-export key types
pub use cache::VersionCache;
pub use installer::{Installer, ReleasesInstaller};
pub use platform::Platform;
pub use resolver::VersionResolver;

use std::io;
use thiserror::Error;

/// Errors that can occur while resolving a terraform version
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("invalid terraform version: '{0}'")]
    InvalidVersion(String),

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("checksum verification failed for {archive}: {reason}")]
    Checksum { archive: String, reason: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("terraform binary not found: {0}")]
    NotFound(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(Platform),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Check a version string before it is used as a path component
pub fn validate_version(version: &str) -> Result<(), VersionError> {
    let valid = !version.is_empty()
        && version.chars().next().is_some_and(|c| c.is_ascii_digit())
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
        && !version.contains("..");
    if valid {
        Ok(())
    } else {
        Err(VersionError::InvalidVersion(version.to_string()))
    }
}
