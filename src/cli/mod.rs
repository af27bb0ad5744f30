pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "hubkit")]
#[command(version)]
#[command(about = "Provision and supervise the hub core runtime")]
#[command(
    long_about = "Downloads the hub core distribution for this platform, verifies and installs it atomically, then supervises the core process and shuts it down when the last client goes away."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init,

    /// Ensure the hub core runtime is installed and current
    Install {
        /// Path to the distribution manifest
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Download from this base URL instead of the manifest's
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Install if needed, start the core, and serve the remote bridge
    Up {
        /// Path to the distribution manifest
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Download from this base URL instead of the manifest's
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Show core health and installation state
    Status,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Init => commands::init::execute(),
            Commands::Install { manifest, base_url } => {
                let config = AppConfig::load()?;
                commands::install::execute(&config, manifest, base_url)
                    .await
                    .map(|_| ())
            }
            Commands::Up { manifest, base_url } => {
                let config = AppConfig::load()?;
                commands::up::execute(&config, manifest, base_url).await
            }
            Commands::Status => {
                let config = AppConfig::load()?;
                commands::status::execute(&config).await
            }
        }
    }
}
