// Utility Functions
// Config file discovery and path-safe names

use std::path::{Path, PathBuf};

/// File names recognised as a colony configuration, in priority order
pub const CONFIG_FILE_NAMES: &[&str] = &["colony.yaml", "colony.yml"];

/// Find the colony configuration by walking up from the given starting path.
///
/// Traverses ancestor directories looking for one of [`CONFIG_FILE_NAMES`].
/// The nearest directory wins. Returns `None` if no configuration is found.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    // Canonicalize to resolve symlinks and get an absolute path
    let start = start.canonicalize().ok()?;
    start.ancestors().find_map(|ancestor| {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| ancestor.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Find the colony configuration starting from the current directory.
pub fn discover_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_file(&cwd)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// A name usable as a single directory component
///
/// Non-empty, no leading `.`, and only `[A-Za-z0-9_-]`, so it can never
/// contain a separator or `..`.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
