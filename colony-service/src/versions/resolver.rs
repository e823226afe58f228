// Version Resolver
// Picks and ensures the terraform binary for each module

use super::cache::VersionCache;
use super::installer::Installer;
use super::platform::Platform;
use super::{validate_version, VersionError};
use crate::execution::module::Module;

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum SystemBinary {
    /// Search `PATH` at resolve time
    Search,
    Fixed(Option<PathBuf>),
}

/// Resolves the terraform binary a module runs with
///
/// A module-local version beats the colony default. With neither set the
/// `terraform` found on `PATH` is used.
pub struct VersionResolver {
    cache: VersionCache,
    platform: Platform,
    default_version: Option<String>,
    installer: Arc<dyn Installer>,
    system_binary: SystemBinary,
    install_lock: Mutex<()>,
}

impl VersionResolver {
    pub fn new(cache: VersionCache, installer: Arc<dyn Installer>) -> Self {
        Self {
            cache,
            platform: Platform::current(),
            default_version: None,
            installer,
            system_binary: SystemBinary::Search,
            install_lock: Mutex::new(()),
        }
    }

    pub fn with_default_version(mut self, version: Option<String>) -> Self {
        self.default_version = version;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Use a fixed fallback binary instead of searching `PATH`
    pub fn with_system_binary(mut self, binary: Option<PathBuf>) -> Self {
        self.system_binary = SystemBinary::Fixed(binary);
        self
    }

    pub fn cache(&self) -> &VersionCache {
        &self.cache
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn default_version(&self) -> Option<&str> {
        self.default_version.as_deref()
    }

    /// Version a module requires, if any is configured
    pub fn version_for<'a>(&'a self, module: &'a Module) -> Option<&'a str> {
        module.terraform_version().or(self.default_version())
    }

    pub async fn resolve_for(&self, module: &Module) -> Result<PathBuf, VersionError> {
        match self.version_for(module) {
            Some(version) => self.ensure(version).await,
            None => self.system_binary(),
        }
    }

    /// Path to an installed version, installing it first when missing
    pub async fn ensure(&self, version: &str) -> Result<PathBuf, VersionError> {
        validate_version(version)?;
        if let Some(path) = self.cache.lookup(version, &self.platform) {
            return Ok(path);
        }

        // One install at a time; a waiter finds the binary already in place
        let _guard = self.install_lock.lock().await;
        if let Some(path) = self.cache.lookup(version, &self.platform) {
            return Ok(path);
        }

        let dest = self.cache.binary_path(version, &self.platform);
        tracing::info!(version, platform = %self.platform, dest = %dest.display(), "installing terraform");
        self.installer
            .install(version, &self.platform, &dest)
            .await?;

        if dest.is_file() {
            Ok(dest)
        } else {
            Err(VersionError::NotFound(format!(
                "installer did not produce {}",
                dest.display()
            )))
        }
    }

    fn system_binary(&self) -> Result<PathBuf, VersionError> {
        let found = match &self.system_binary {
            SystemBinary::Search => which::which("terraform").ok(),
            SystemBinary::Fixed(binary) => binary.clone(),
        };
        found.ok_or_else(|| {
            VersionError::NotFound("no version configured and no terraform on PATH".to_string())
        })
    }
}
