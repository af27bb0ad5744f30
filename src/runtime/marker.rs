//! Install marker persistence.
//!
//! The marker is a small JSON record living beside the installed payload. Its
//! presence plus a version match against the current manifest entry is the
//! sole idempotency signal for the installer. It is a cache invalidation key,
//! not a lock.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::runtime::manifest::ManifestEntry;
use crate::runtime::platform::PlatformKey;

pub const INSTALL_MARKER_FILE: &str = "install.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallMarker {
    pub platform: PlatformKey,
    pub version: String,
    pub package: String,
    pub installed_at: DateTime<Utc>,
}

impl InstallMarker {
    /// Reads the marker from an installation directory. Any failure (missing
    /// file, unreadable JSON) is treated as "no marker": the installer will
    /// re-verify or reinstall as appropriate.
    pub fn load(install_dir: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(install_dir.join(INSTALL_MARKER_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Writes a fresh marker for the given manifest entry. Only called after
    /// the payload has been verified in place.
    pub fn write(install_dir: &Path, platform: PlatformKey, entry: &ManifestEntry) -> Result<()> {
        std::fs::create_dir_all(install_dir)?;

        let marker = Self {
            platform,
            version: entry.version.clone(),
            package: entry.package.clone(),
            installed_at: Utc::now(),
        };

        let content = format!("{}\n", serde_json::to_string_pretty(&marker)?);
        std::fs::write(install_dir.join(INSTALL_MARKER_FILE), content)?;
        Ok(())
    }
}
