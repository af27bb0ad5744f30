//! Versioned distribution manifest.
//!
//! The manifest maps platform keys to downloadable package metadata. A schema
//! mismatch or a missing entry for the resolved platform means "we don't ship
//! for this build/platform" and is surfaced as a configuration error, distinct
//! from network failures so operators can tell the two apart.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HubkitError, Result};
use crate::runtime::platform::PlatformKey;

/// The single manifest schema revision this build understands.
pub const SUPPORTED_SCHEMA: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub version: String,
    /// Package filename, resolved against the manifest base URL.
    pub package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    pub size: u64,
    /// Distribution channel label (e.g. "stable", "beta").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema: u32,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    pub platforms: HashMap<PlatformKey, ManifestEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HubkitError::Config(format!("Manifest not found at {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(content)
            .map_err(|e| HubkitError::Config(format!("Invalid manifest: {}", e)))?;

        if manifest.schema != SUPPORTED_SCHEMA {
            return Err(HubkitError::Config(format!(
                "Unsupported manifest schema {} (expected {})",
                manifest.schema, SUPPORTED_SCHEMA
            )));
        }

        Ok(manifest)
    }

    /// Looks up the entry for a platform. Absence is fatal configuration, not
    /// something a retry can fix.
    pub fn entry_for(&self, platform: PlatformKey) -> Result<&ManifestEntry> {
        self.platforms.get(&platform).ok_or_else(|| {
            HubkitError::Config(format!("No distribution configured for {}", platform))
        })
    }
}
