//! Streaming artifact downloads with bounded redirect following.
//!
//! Automatic redirects are disabled on the client so the hop count stays under
//! our control: mirrors occasionally misbehave and an unbounded chain must fail
//! loudly instead of spinning. The body is streamed to a `.part` file next to
//! the destination and renamed into place once complete, so an interrupted
//! download never leaves a plausible-looking archive behind.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::{HubkitError, Result};
use crate::runtime::ProgressReporter;

/// Maximum number of redirect hops before the download is declared failed.
pub const MAX_REDIRECTS: usize = 5;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("hubkit/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Downloads `url` to `destination`, following up to [`MAX_REDIRECTS`]
    /// redirects and reporting byte-level progress.
    ///
    /// `declared_size` comes from the manifest; when zero, the server's
    /// Content-Length is used for progress totals instead.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
        declared_size: u64,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut current = Url::parse(url)
            .map_err(|e| HubkitError::Download(format!("Invalid URL {}: {}", url, e)))?;
        let mut redirects = 0usize;

        let response = loop {
            let response = self.client.get(current.clone()).send().await?;
            let status = response.status();

            if is_redirect(status) {
                if redirects == MAX_REDIRECTS {
                    return Err(HubkitError::TooManyRedirects(url.to_string()));
                }
                redirects += 1;

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        HubkitError::Download(format!(
                            "Redirect from {} carried no Location header",
                            current
                        ))
                    })?;

                // Location may be relative; resolve against the current URL.
                current = current.join(location).map_err(|e| {
                    HubkitError::Download(format!("Invalid redirect target {}: {}", location, e))
                })?;
                tracing::debug!("Following redirect {} -> {}", redirects, current);
                continue;
            }

            if !status.is_success() {
                return Err(HubkitError::Download(format!(
                    "HTTP {} fetching {}",
                    status, current
                )));
            }

            break response;
        };

        let total = if declared_size > 0 {
            declared_size
        } else {
            response.content_length().unwrap_or(0)
        };

        let part_path = destination.with_extension("part");
        let mut file = tokio::fs::File::create(&part_path).await?;
        let mut received = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| HubkitError::Download(format!("Read failed from {}: {}", url, e)))?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            progress.bytes(received, total);
        }

        file.flush().await?;
        drop(file);

        tokio::fs::rename(&part_path, destination).await?;
        Ok(())
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}
