// Platform
// Host operating system and architecture in terraform release naming

use std::fmt;

const KNOWN_OS: &[&str] = &["darwin", "freebsd", "linux", "openbsd", "solaris", "windows"];
const KNOWN_ARCH: &[&str] = &["386", "amd64", "arm", "arm64"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this process runs on
    ///
    /// Names without a terraform equivalent pass through unchanged.
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            other => other,
        };
        Self::new(os, arch)
    }

    /// Terraform publishes releases for this platform
    pub fn is_supported(&self) -> bool {
        KNOWN_OS.contains(&self.os.as_str()) && KNOWN_ARCH.contains(&self.arch.as_str())
    }

    pub fn binary_name(&self) -> &'static str {
        if self.os == "windows" {
            "terraform.exe"
        } else {
            "terraform"
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}
