// Terraform Installer
// Downloads release archives from the HashiCorp release server

use super::platform::Platform;
use super::VersionError;

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// Default release server
pub const RELEASES_URL: &str = "https://releases.hashicorp.com";

/// Installs a terraform version to a destination binary path
#[async_trait::async_trait]
pub trait Installer: Send + Sync {
    async fn install(
        &self,
        version: &str,
        platform: &Platform,
        dest: &Path,
    ) -> Result<(), VersionError>;
}

/// Installer backed by the official release archives
#[derive(Debug, Clone)]
pub struct ReleasesInstaller {
    base_url: String,
    client: reqwest::Client,
}

impl ReleasesInstaller {
    pub fn new() -> Self {
        Self::with_base_url(RELEASES_URL)
    }

    /// Use a mirror of the release server
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn archive_name(version: &str, platform: &Platform) -> String {
        format!("terraform_{version}_{platform}.zip")
    }

    fn release_url(&self, version: &str, file: &str) -> String {
        format!("{}/terraform/{version}/{file}", self.base_url)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, VersionError> {
        let download_err = |e: reqwest::Error| VersionError::Download {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(download_err)?
            .error_for_status()
            .map_err(download_err)?;
        let bytes = response.bytes().await.map_err(download_err)?;
        Ok(bytes.to_vec())
    }
}

impl Default for ReleasesInstaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Installer for ReleasesInstaller {
    async fn install(
        &self,
        version: &str,
        platform: &Platform,
        dest: &Path,
    ) -> Result<(), VersionError> {
        if !platform.is_supported() {
            return Err(VersionError::UnsupportedPlatform(platform.clone()));
        }

        let archive = Self::archive_name(version, platform);
        let sums_url = self.release_url(version, &format!("terraform_{version}_SHA256SUMS"));
        let archive_url = self.release_url(version, &archive);

        tracing::info!(version, %platform, url = %archive_url, "downloading terraform");

        let sums = self.fetch(&sums_url).await?;
        let sums = String::from_utf8_lossy(&sums);
        let expected = expected_checksum(&sums, &archive).ok_or_else(|| VersionError::Checksum {
            archive: archive.clone(),
            reason: "archive not listed in SHA256SUMS".to_string(),
        })?;

        let bytes = self.fetch(&archive_url).await?;
        verify_checksum(&archive, &bytes, &expected)?;

        let binary_name = platform.binary_name();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || extract_binary(&bytes, binary_name, &dest))
            .await
            .map_err(|e| VersionError::Archive(format!("extraction task failed: {e}")))??;

        tracing::info!(version, %platform, "terraform installed");
        Ok(())
    }
}

/// Find the checksum for a file in a SHA256SUMS listing
pub fn expected_checksum(sums: &str, file: &str) -> Option<String> {
    sums.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let checksum = parts.next()?;
        let name = parts.next()?;
        (name == file).then(|| checksum.to_lowercase())
    })
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn verify_checksum(archive: &str, bytes: &[u8], expected: &str) -> Result<(), VersionError> {
    let actual = sha256_hex(bytes);
    if actual == expected {
        Ok(())
    } else {
        Err(VersionError::Checksum {
            archive: archive.to_string(),
            reason: format!("expected {expected}, got {actual}"),
        })
    }
}

/// Extract one binary from a zip archive to `dest`
///
/// The file is written next to `dest` and renamed into place so a partial
/// extraction never looks installed.
pub fn extract_binary(archive: &[u8], binary_name: &str, dest: &Path) -> Result<(), VersionError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| VersionError::Archive(e.to_string()))?;
    let mut entry = zip
        .by_name(binary_name)
        .map_err(|e| VersionError::Archive(format!("{binary_name}: {e}")))?;

    let mut contents = Vec::new();
    entry.read_to_end(&mut contents)?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let partial = partial_path(dest);
    fs::write(&partial, &contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&partial, fs::Permissions::from_mode(0o755))?;
    }

    fs::rename(&partial, dest)?;
    Ok(())
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}
