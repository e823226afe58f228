// Colony Config Parser
// Loads colony configuration from YAML and anchors relative paths

use crate::config::models::ColonyConfig;
use crate::config::ConfigError;
use crate::utils::expand_home;

use std::fs;
use std::path::{Path, PathBuf};

pub struct ConfigParser;

impl ConfigParser {
    /// Load a config file; relative paths inside it are resolved against
    /// the directory containing the file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ColonyConfig, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = Self::parse(&content)?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::anchor_paths(&mut config, base);

        tracing::debug!(
            path = %path.display(),
            modules = config.modules.len(),
            "loaded colony config"
        );
        Ok(config)
    }

    /// Parse config from a YAML string without touching any paths
    pub fn parse(content: &str) -> Result<ColonyConfig, ConfigError> {
        let config: ColonyConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    fn anchor_paths(config: &mut ColonyConfig, base: &Path) {
        config.session_repo_dir = anchor(base, &config.session_repo_dir);
        if let Some(dir) = config.versions_dir.take() {
            config.versions_dir = Some(anchor(base, &dir));
        }
        for module in &mut config.modules {
            module.source = anchor(base, &module.source);
        }
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    let path = expand_home(path);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
