use std::time::Duration;

use console::style;

use crate::config::AppConfig;
use crate::error::Result;
use crate::runtime::marker::InstallMarker;
use crate::runtime::{Manifest, PlatformKey};
use crate::supervisor::HEALTH_PATH;

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn execute(config: &AppConfig) -> Result<()> {
    let platform = PlatformKey::detect()?;

    // Installation state, from the marker if one exists.
    match Manifest::load(&config.manifest_path()?) {
        Ok(manifest) => {
            let entry = manifest.entry_for(platform)?;
            let install_dir = config
                .install_root()?
                .join(platform.as_str())
                .join(&entry.version);

            match InstallMarker::load(&install_dir) {
                Some(marker) if marker.version == entry.version => {
                    println!(
                        "  {}     {} ({})",
                        style("installed").dim(),
                        style(&marker.version).white().bold(),
                        marker.installed_at.format("%Y-%m-%d %H:%M UTC")
                    );
                }
                _ => {
                    println!(
                        "  {}     {} (manifest wants {})",
                        style("installed").dim(),
                        style("no").yellow(),
                        entry.version
                    );
                }
            }
        }
        Err(e) => {
            println!("  {}      {}", style("manifest").dim(), style(e).yellow());
        }
    }

    // Liveness, straight from the core's health endpoint.
    let url = format!(
        "http://{}:{}{}",
        config.core_host, config.core_port, HEALTH_PATH
    );
    let client = reqwest::Client::new();
    let healthy = matches!(
        client.get(&url).timeout(PROBE_TIMEOUT).send().await,
        Ok(response) if response.status() == reqwest::StatusCode::OK
    );

    if healthy {
        println!(
            "  {}          {} at {}:{}",
            style("core").dim(),
            style("running").green().bold(),
            config.core_host,
            config.core_port
        );
    } else {
        println!(
            "  {}          {} ({} unreachable)",
            style("core").dim(),
            style("stopped").red(),
            url
        );
    }

    Ok(())
}
