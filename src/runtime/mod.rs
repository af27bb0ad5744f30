//! Runtime provisioning: platform resolution, manifest lookup, verified
//! download, and atomic installation of the hub core binary.

pub mod archive;
pub mod checksum;
pub mod download;
pub mod installer;
pub mod manifest;
pub mod marker;
pub mod platform;

use std::path::PathBuf;

pub use installer::Installer;
pub use manifest::Manifest;
pub use platform::PlatformKey;

/// A fully provisioned runtime, ready to be spawned.
#[derive(Debug, Clone)]
pub struct RuntimeInfo {
    pub platform: PlatformKey,
    pub version: String,
    pub install_dir: PathBuf,
    pub binary_path: PathBuf,
}

/// Receives human-readable phase messages and byte-level download progress.
///
/// The CLI backs this with an indicatif progress bar; tests and quiet callers
/// use [`NullProgress`].
pub trait ProgressReporter: Send + Sync {
    fn message(&self, msg: &str);
    fn bytes(&self, received: u64, total: u64);
}

/// Reporter that drops everything on the floor.
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn message(&self, _msg: &str) {}
    fn bytes(&self, _received: u64, _total: u64) {}
}
