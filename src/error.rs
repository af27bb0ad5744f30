use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubkitError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The host OS/architecture combination has no distribution target.
    /// This is a deployment-time defect, never retried.
    #[error("Unsupported platform: {os}-{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Too many redirects while fetching {0}")]
    TooManyRedirects(String),

    /// Digest mismatches, empty archives, missing binaries after extraction.
    /// Fatal for the install attempt; the offending artifact is discarded.
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Supervisor error: {0}")]
    Supervisor(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HubkitError>;
