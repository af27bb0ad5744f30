//! Platform key resolution for runtime distribution.
//!
//! Every downloadable package is keyed by an OS/architecture pair. The
//! supported matrix is deliberately closed: macOS and Windows on arm64/x64,
//! Linux on x64 only. Anything else is a deployment defect, not a transient
//! fault, and resolution fails fast with a non-retryable error.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{HubkitError, Result};

/// Canonical identifier for an OS+architecture distribution target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformKey {
    #[serde(rename = "darwin-arm64")]
    DarwinArm64,
    #[serde(rename = "darwin-x64")]
    DarwinX64,
    #[serde(rename = "win32-arm64")]
    Win32Arm64,
    #[serde(rename = "win32-x64")]
    Win32X64,
    #[serde(rename = "linux-x64")]
    LinuxX64,
}

impl PlatformKey {
    /// Resolves the platform key for the host this process runs on.
    ///
    /// Computed once per process and passed around by value afterwards.
    pub fn detect() -> Result<Self> {
        Self::from_os_arch(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Maps an OS name / CPU architecture pair onto a distribution target.
    pub fn from_os_arch(os: &str, arch: &str) -> Result<Self> {
        match (os, arch) {
            ("macos", "aarch64") => Ok(Self::DarwinArm64),
            ("macos", "x86_64") => Ok(Self::DarwinX64),
            ("windows", "aarch64") => Ok(Self::Win32Arm64),
            ("windows", "x86_64") => Ok(Self::Win32X64),
            ("linux", "x86_64") => Ok(Self::LinuxX64),
            _ => Err(HubkitError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DarwinArm64 => "darwin-arm64",
            Self::DarwinX64 => "darwin-x64",
            Self::Win32Arm64 => "win32-arm64",
            Self::Win32X64 => "win32-x64",
            Self::LinuxX64 => "linux-x64",
        }
    }

    /// Relative path of the core binary inside an installation directory.
    pub fn binary_rel_path(&self) -> PathBuf {
        match self {
            Self::Win32Arm64 | Self::Win32X64 => PathBuf::from("hub-core.exe"),
            _ => PathBuf::from("hub-core"),
        }
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
