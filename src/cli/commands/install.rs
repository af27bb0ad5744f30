use std::path::PathBuf;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::AppConfig;
use crate::error::Result;
use crate::runtime::{Installer, Manifest, PlatformKey, ProgressReporter, RuntimeInfo};

/// Progress reporter backed by an indicatif bar. Byte totals switch the bar
/// from a spinner into a download gauge.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} {bytes}/{total_bytes}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for BarProgress {
    fn message(&self, msg: &str) {
        self.bar.set_message(msg.to_string());
    }

    fn bytes(&self, received: u64, total: u64) {
        if total > 0 {
            self.bar.set_length(total);
        }
        self.bar.set_position(received);
    }
}

/// Resolves platform and manifest, then runs the installer. Shared between
/// `install` and `up`.
pub async fn ensure_runtime(
    config: &AppConfig,
    manifest_path: Option<PathBuf>,
    base_url: Option<String>,
) -> Result<RuntimeInfo> {
    let platform = PlatformKey::detect()?;
    let manifest_path = match manifest_path {
        Some(path) => path,
        None => config.manifest_path()?,
    };
    let manifest = Manifest::load(&manifest_path)?;

    let mut installer = Installer::new(manifest, platform, config.install_root()?)?;
    if let Some(base) = base_url {
        installer = installer.with_base_url(base);
    }

    let progress = BarProgress::new();
    let info = installer.ensure_installed(&progress).await;
    progress.finish();
    info
}

pub async fn execute(
    config: &AppConfig,
    manifest_path: Option<PathBuf>,
    base_url: Option<String>,
) -> Result<RuntimeInfo> {
    let info = ensure_runtime(config, manifest_path, base_url).await?;

    println!(
        "{} hub core {} ready for {}",
        style("✓").green().bold(),
        style(&info.version).white().bold(),
        info.platform
    );
    println!(
        "  {}  {}",
        style("install dir").dim(),
        info.install_dir.display()
    );
    println!(
        "  {}       {}",
        style("binary").dim(),
        info.binary_path.display()
    );

    Ok(info)
}
