//! Atomic, idempotent installation of the hub core runtime.
//!
//! Layout under the install root:
//!
//! ```text
//! root/
//!   <platform>/
//!     downloads/<package>         archive cache, deleted after install
//!     extract-<uuid>/             scratch, sibling of the target dir
//!     <version>/                  installation target
//!       install.json              marker, written last
//!       hub-core                  the supervised binary
//! ```
//!
//! The scratch directory shares a parent with the target so the final rename
//! stays on one filesystem. That single rename is the atomicity boundary:
//! observers never see a partially extracted target, and a losing concurrent
//! installer simply has its rename target overwritten.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use url::Url;
use uuid::Uuid;

use crate::error::{HubkitError, Result};
use crate::runtime::download::Downloader;
use crate::runtime::manifest::{Manifest, ManifestEntry};
use crate::runtime::marker::InstallMarker;
use crate::runtime::platform::PlatformKey;
use crate::runtime::{archive, checksum, ProgressReporter, RuntimeInfo};

/// Overrides the manifest base URL, for private mirrors and testing.
pub const BASE_URL_ENV: &str = "HUBKIT_BASE_URL";

const DOWNLOADS_DIR_NAME: &str = "downloads";

#[cfg(unix)]
const BINARY_EXECUTABLE_MODE: u32 = 0o755;

pub struct Installer {
    manifest: Manifest,
    platform: PlatformKey,
    install_root: PathBuf,
    base_url_override: Option<String>,
    downloader: Downloader,
}

impl Installer {
    pub fn new(manifest: Manifest, platform: PlatformKey, install_root: PathBuf) -> Result<Self> {
        Ok(Self {
            manifest,
            platform,
            install_root,
            base_url_override: std::env::var(BASE_URL_ENV).ok(),
            downloader: Downloader::new()?,
        })
    }

    /// Points downloads at a mirror instead of the manifest base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    /// Ensures the runtime for the resolved platform is installed and current.
    ///
    /// The fast path (marker present, version match, binary on disk) performs
    /// no network access and no I/O beyond existence checks; it runs on every
    /// normal startup.
    pub async fn ensure_installed(&self, progress: &dyn ProgressReporter) -> Result<RuntimeInfo> {
        let entry = self.manifest.entry_for(self.platform)?;

        let platform_dir = self.install_root.join(self.platform.as_str());
        let install_dir = platform_dir.join(&entry.version);
        let binary_rel = self.platform.binary_rel_path();

        if self.verify_existing(&install_dir, entry)? {
            tracing::debug!(
                "Runtime {} already installed at {}",
                entry.version,
                install_dir.display()
            );
            return Ok(self.runtime_info(entry, install_dir));
        }

        // Installs predating the versioned layout keep the binary directly
        // under the platform directory. Adopt them instead of re-downloading.
        let legacy_binary = platform_dir.join(&binary_rel);
        if legacy_binary.exists() {
            InstallMarker::write(&platform_dir, self.platform, entry)?;
            tracing::info!("Adopted legacy install at {}", platform_dir.display());
            return Ok(self.runtime_info(entry, platform_dir));
        }

        progress.message("Preparing hub core installation");
        self.full_install(entry, &platform_dir, &install_dir, progress)
            .await?;

        Ok(self.runtime_info(entry, install_dir))
    }

    fn runtime_info(&self, entry: &ManifestEntry, install_dir: PathBuf) -> RuntimeInfo {
        let binary_path = install_dir.join(self.platform.binary_rel_path());
        RuntimeInfo {
            platform: self.platform,
            version: entry.version.clone(),
            install_dir,
            binary_path,
        }
    }

    /// Returns true when the installation directory already holds the version
    /// the manifest asks for. A binary without a marker is adopted by writing
    /// a fresh marker (lazy migration from pre-marker installs).
    fn verify_existing(&self, install_dir: &Path, entry: &ManifestEntry) -> Result<bool> {
        let binary = install_dir.join(self.platform.binary_rel_path());
        if !binary.exists() {
            return Ok(false);
        }

        match InstallMarker::load(install_dir) {
            Some(marker) => Ok(marker.version == entry.version),
            None => {
                InstallMarker::write(install_dir, self.platform, entry)?;
                Ok(true)
            }
        }
    }

    async fn full_install(
        &self,
        entry: &ManifestEntry,
        platform_dir: &Path,
        install_dir: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        std::fs::create_dir_all(platform_dir)?;
        let downloads_dir = platform_dir.join(DOWNLOADS_DIR_NAME);
        std::fs::create_dir_all(&downloads_dir)?;

        let archive_path = downloads_dir.join(&entry.package);

        let cached = match &entry.sha1 {
            Some(sha1) => archive_path.exists() && checksum::verify_sha1(&archive_path, sha1),
            None => false,
        };

        if cached {
            progress.message("Using cached hub core archive");
        } else {
            let url = self.download_url(entry)?;
            progress.message("Downloading hub core");
            tracing::info!("Downloading {} from {}", entry.package, url);
            self.downloader
                .download(url.as_str(), &archive_path, entry.size, progress)
                .await?;

            if let Some(sha1) = &entry.sha1 {
                progress.message("Verifying download");
                if !checksum::verify_sha1(&archive_path, sha1) {
                    // Never leave a bad artifact where a later run could
                    // mistake it for a cache hit.
                    if let Err(e) = std::fs::remove_file(&archive_path) {
                        tracing::debug!("Failed to remove bad archive: {}", e);
                    }
                    return Err(HubkitError::Integrity(format!(
                        "Downloaded archive {} failed checksum validation",
                        entry.package
                    )));
                }
            }
        }

        progress.message("Extracting hub core");
        self.swap_into_place(&archive_path, platform_dir, install_dir)?;

        let binary = install_dir.join(self.platform.binary_rel_path());
        if !binary.exists() {
            return Err(HubkitError::Integrity(
                "Core binary missing after extraction".to_string(),
            ));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(
                &binary,
                std::fs::Permissions::from_mode(BINARY_EXECUTABLE_MODE),
            )?;
        }

        // The marker is the last write: its presence proves every step above
        // completed.
        InstallMarker::write(install_dir, self.platform, entry)?;

        if let Err(e) = std::fs::remove_file(&archive_path) {
            tracing::debug!("Failed to remove archive {}: {}", archive_path.display(), e);
        }

        tracing::info!(
            "Installed hub core {} at {}",
            entry.version,
            install_dir.display()
        );
        Ok(())
    }

    /// Extracts into a scratch sibling of the target, then swaps it in with a
    /// single rename. The scratch directory is removed best-effort either way.
    fn swap_into_place(
        &self,
        archive_path: &Path,
        platform_dir: &Path,
        install_dir: &Path,
    ) -> Result<()> {
        let scratch = platform_dir.join(format!("extract-{}", Uuid::new_v4()));

        let result: Result<()> = (|| {
            archive::extract_archive(archive_path, &scratch)?;
            let extracted = archive::extracted_root(&scratch)?;

            match std::fs::remove_dir_all(install_dir) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            std::fs::rename(&extracted, install_dir)?;
            Ok(())
        })();

        if let Err(e) = std::fs::remove_dir_all(&scratch) {
            if e.kind() != ErrorKind::NotFound {
                tracing::debug!("Failed to remove scratch dir {}: {}", scratch.display(), e);
            }
        }

        result
    }

    fn download_url(&self, entry: &ManifestEntry) -> Result<Url> {
        let base = self
            .base_url_override
            .as_deref()
            .unwrap_or(&self.manifest.base_url);

        let base = Url::parse(base)
            .map_err(|e| HubkitError::Config(format!("Invalid base URL {}: {}", base, e)))?;

        base.join(&entry.package).map_err(|e| {
            HubkitError::Config(format!("Invalid package name {}: {}", entry.package, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::archive::tests::build_archive;
    use crate::runtime::marker::INSTALL_MARKER_FILE;
    use crate::runtime::NullProgress;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PACKAGE: &str = "hub-core-linux-x64.tar.gz";

    fn manifest_for(base_url: &str, sha1: Option<String>) -> Manifest {
        let mut platforms = HashMap::new();
        platforms.insert(
            PlatformKey::LinuxX64,
            ManifestEntry {
                version: "2.3.0".to_string(),
                package: PACKAGE.to_string(),
                sha1,
                size: 0,
                channel: Some("stable".to_string()),
            },
        );
        Manifest {
            schema: 1,
            base_url: base_url.to_string(),
            platforms,
        }
    }

    /// Builds a valid archive, serves it from a mock server, and returns the
    /// server plus the archive's SHA-1.
    async fn serve_archive(binary_content: &[u8]) -> (MockServer, String) {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join(PACKAGE);
        build_archive(&archive_path, "hub-core-2.3.0", &[("hub-core", binary_content)]);
        let bytes = std::fs::read(&archive_path).unwrap();
        let sha1 = checksum::sha1_file(&archive_path).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}", PACKAGE)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .mount(&server)
            .await;

        (server, sha1)
    }

    #[tokio::test]
    async fn test_fresh_install_downloads_verifies_and_writes_marker() {
        let (server, sha1) = serve_archive(b"core binary").await;
        let root = tempfile::tempdir().unwrap();

        let manifest = manifest_for(&format!("{}/", server.uri()), Some(sha1));
        let installer = Installer::new(manifest, PlatformKey::LinuxX64, root.path().to_path_buf())
            .unwrap()
            .with_base_url(format!("{}/", server.uri()));

        let info = installer.ensure_installed(&NullProgress).await.unwrap();

        assert_eq!(info.version, "2.3.0");
        assert_eq!(info.install_dir, root.path().join("linux-x64").join("2.3.0"));
        assert_eq!(std::fs::read(&info.binary_path).unwrap(), b"core binary");

        let marker = InstallMarker::load(&info.install_dir).unwrap();
        assert_eq!(marker.version, "2.3.0");

        // Archive cache is cleaned up after a successful install.
        assert!(!root
            .path()
            .join("linux-x64")
            .join("downloads")
            .join(PACKAGE)
            .exists());

        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_ensure_installed_performs_no_network_requests() {
        let (server, sha1) = serve_archive(b"core binary").await;
        let root = tempfile::tempdir().unwrap();

        let manifest = manifest_for(&format!("{}/", server.uri()), Some(sha1));
        let installer = Installer::new(manifest, PlatformKey::LinuxX64, root.path().to_path_buf())
            .unwrap()
            .with_base_url(format!("{}/", server.uri()));

        let first = installer.ensure_installed(&NullProgress).await.unwrap();
        let second = installer.ensure_installed(&NullProgress).await.unwrap();

        assert_eq!(first.install_dir, second.install_dir);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_digest_mismatch_never_installs() {
        let (server, _sha1) = serve_archive(b"core binary").await;
        let root = tempfile::tempdir().unwrap();

        let manifest = manifest_for(
            &format!("{}/", server.uri()),
            Some("0000000000000000000000000000000000000000".to_string()),
        );
        let installer = Installer::new(manifest, PlatformKey::LinuxX64, root.path().to_path_buf())
            .unwrap()
            .with_base_url(format!("{}/", server.uri()));

        let err = installer.ensure_installed(&NullProgress).await.unwrap_err();
        assert!(matches!(err, HubkitError::Integrity(_)));

        // Neither the target directory nor the quarantined archive survive.
        assert!(!root.path().join("linux-x64").join("2.3.0").exists());
        assert!(!root
            .path()
            .join("linux-x64")
            .join("downloads")
            .join(PACKAGE)
            .exists());
    }

    #[tokio::test]
    async fn test_truncated_archive_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join(PACKAGE);
        build_archive(&archive_path, "hub-core-2.3.0", &[("hub-core", &[0u8; 8192])]);
        let bytes = std::fs::read(&archive_path).unwrap();
        let truncated = bytes[..bytes.len() / 2].to_vec();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}", PACKAGE)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(truncated))
            .mount(&server)
            .await;

        let root = tempfile::tempdir().unwrap();
        // No declared digest, so the corruption must be caught at extraction.
        let manifest = manifest_for(&format!("{}/", server.uri()), None);
        let installer = Installer::new(manifest, PlatformKey::LinuxX64, root.path().to_path_buf())
            .unwrap()
            .with_base_url(format!("{}/", server.uri()));

        let err = installer.ensure_installed(&NullProgress).await.unwrap_err();
        assert!(matches!(err, HubkitError::Integrity(_)));

        let platform_dir = root.path().join("linux-x64");
        assert!(!platform_dir.join("2.3.0").exists());
        // Scratch directories are cleaned up on failure too.
        let leftovers: Vec<_> = std::fs::read_dir(&platform_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("extract-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_cached_archive_is_reused_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join(PACKAGE);
        build_archive(&archive_path, "hub-core-2.3.0", &[("hub-core", b"cached")]);
        let sha1 = checksum::sha1_file(&archive_path).unwrap();

        let root = tempfile::tempdir().unwrap();
        let downloads = root.path().join("linux-x64").join("downloads");
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::copy(&archive_path, downloads.join(PACKAGE)).unwrap();

        let server = MockServer::start().await;
        let manifest = manifest_for(&format!("{}/", server.uri()), Some(sha1));
        let installer = Installer::new(manifest, PlatformKey::LinuxX64, root.path().to_path_buf())
            .unwrap()
            .with_base_url(format!("{}/", server.uri()));

        let info = installer.ensure_installed(&NullProgress).await.unwrap();
        assert_eq!(std::fs::read(&info.binary_path).unwrap(), b"cached");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_install_is_adopted_without_download() {
        let root = tempfile::tempdir().unwrap();
        let platform_dir = root.path().join("linux-x64");
        std::fs::create_dir_all(&platform_dir).unwrap();
        std::fs::write(platform_dir.join("hub-core"), b"old binary").unwrap();

        let server = MockServer::start().await;
        let manifest = manifest_for(&format!("{}/", server.uri()), None);
        let installer = Installer::new(manifest, PlatformKey::LinuxX64, root.path().to_path_buf())
            .unwrap()
            .with_base_url(format!("{}/", server.uri()));

        let info = installer.ensure_installed(&NullProgress).await.unwrap();

        assert_eq!(info.install_dir, platform_dir);
        assert!(platform_dir.join(INSTALL_MARKER_FILE).exists());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_binary_without_marker_in_versioned_dir_is_adopted() {
        let root = tempfile::tempdir().unwrap();
        let install_dir = root.path().join("linux-x64").join("2.3.0");
        std::fs::create_dir_all(&install_dir).unwrap();
        std::fs::write(install_dir.join("hub-core"), b"binary").unwrap();

        let server = MockServer::start().await;
        let manifest = manifest_for(&format!("{}/", server.uri()), None);
        let installer = Installer::new(manifest, PlatformKey::LinuxX64, root.path().to_path_buf())
            .unwrap()
            .with_base_url(format!("{}/", server.uri()));

        let info = installer.ensure_installed(&NullProgress).await.unwrap();
        assert_eq!(info.install_dir, install_dir);
        assert!(InstallMarker::load(&install_dir).is_some());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_version_triggers_reinstall() {
        let (server, sha1) = serve_archive(b"new binary").await;
        let root = tempfile::tempdir().unwrap();

        // A valid but outdated install of 2.2.0 exists.
        let old_dir = root.path().join("linux-x64").join("2.2.0");
        std::fs::create_dir_all(&old_dir).unwrap();
        std::fs::write(old_dir.join("hub-core"), b"old binary").unwrap();
        let old_entry = ManifestEntry {
            version: "2.2.0".to_string(),
            package: PACKAGE.to_string(),
            sha1: None,
            size: 0,
            channel: None,
        };
        InstallMarker::write(&old_dir, PlatformKey::LinuxX64, &old_entry).unwrap();

        let manifest = manifest_for(&format!("{}/", server.uri()), Some(sha1));
        let installer = Installer::new(manifest, PlatformKey::LinuxX64, root.path().to_path_buf())
            .unwrap()
            .with_base_url(format!("{}/", server.uri()));

        let info = installer.ensure_installed(&NullProgress).await.unwrap();
        assert_eq!(info.version, "2.3.0");
        assert_eq!(std::fs::read(&info.binary_path).unwrap(), b"new binary");
        // The old version stays on disk until something removes it.
        assert!(old_dir.join("hub-core").exists());
    }

    #[tokio::test]
    async fn test_missing_platform_entry_is_fatal_before_any_io() {
        let manifest = Manifest {
            schema: 1,
            base_url: "https://dist.example.com/".to_string(),
            platforms: HashMap::new(),
        };
        let root = tempfile::tempdir().unwrap();
        let installer =
            Installer::new(manifest, PlatformKey::LinuxX64, root.path().to_path_buf()).unwrap();

        let err = installer.ensure_installed(&NullProgress).await.unwrap_err();
        assert!(matches!(err, HubkitError::Config(_)));
        assert!(!root.path().join("linux-x64").exists());
    }
}
