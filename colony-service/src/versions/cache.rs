// Version Cache
// Installed terraform binaries on disk

use super::platform::Platform;

use std::path::{Path, PathBuf};

/// Directory of installed terraform versions
///
/// Layout: `<root>/<version>/<os>_<arch>/terraform[.exe]`
#[derive(Debug, Clone)]
pub struct VersionCache {
    root: PathBuf,
}

impl VersionCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default cache directory (`~/.tfcolony/versions`)
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tfcolony")
            .join("versions")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the binary for a version lives, installed or not
    pub fn binary_path(&self, version: &str, platform: &Platform) -> PathBuf {
        self.root
            .join(version)
            .join(platform.to_string())
            .join(platform.binary_name())
    }

    /// Path of an installed binary
    pub fn lookup(&self, version: &str, platform: &Platform) -> Option<PathBuf> {
        let path = self.binary_path(version, platform);
        path.is_file().then_some(path)
    }
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}
