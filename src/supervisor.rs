//! Supervision of the hub core child process.
//!
//! The supervisor owns at most one live child. `ensure_started` first probes
//! the core's health endpoint so an externally started core is left alone;
//! only an unhealthy endpoint leads to a spawn. Child stdout/stderr are piped
//! line-by-line into tracing, and on exit the handle is cleared and the exit
//! code recorded. There is no auto-restart: the next `ensure_started` call is
//! the restart path.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, Mutex};

use crate::error::{HubkitError, Result};

pub const HEALTH_PATH: &str = "/api/v1/health";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

/// HTTP and WebSocket endpoints of the supervised core.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub http_url: String,
    pub ws_url: String,
}

/// Held while a child is alive; dropping or signalling it terminates the
/// child. The supervisor is the only writer.
struct ChildHandle {
    shutdown: oneshot::Sender<()>,
}

pub struct CoreSupervisor {
    binary_path: PathBuf,
    host: String,
    port: u16,
    http: Client,
    handle: Mutex<Option<ChildHandle>>,
    last_exit: Mutex<Option<i32>>,
}

impl CoreSupervisor {
    pub fn new(binary_path: PathBuf, host: impl Into<String>, port: u16) -> Result<Arc<Self>> {
        let http = Client::builder().build()?;

        Ok(Arc::new(Self {
            binary_path,
            host: host.into(),
            port,
            http,
            handle: Mutex::new(None),
            last_exit: Mutex::new(None),
        }))
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            http_url: format!("http://{}:{}", self.host, self.port),
            ws_url: format!("ws://{}:{}/api/v1/stream", self.host, self.port),
        }
    }

    /// Starts the core unless it is already running, either under this
    /// supervisor or externally (detected via the health probe).
    pub async fn ensure_started(self: &Arc<Self>) -> Result<()> {
        if self.is_running().await {
            return Ok(());
        }

        if self.is_healthy().await {
            tracing::info!("Hub core already running at {}:{}", self.host, self.port);
            return Ok(());
        }

        self.spawn().await
    }

    /// Probes the core health endpoint with a short timeout. Anything but a
    /// 200 within the timeout counts as unhealthy.
    pub async fn is_healthy(&self) -> bool {
        let url = format!("http://{}:{}{}", self.host, self.port, HEALTH_PATH);
        match self.http.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(_) => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Exit code of the most recently exited child, if any.
    pub async fn last_exit_code(&self) -> Option<i32> {
        *self.last_exit.lock().await
    }

    async fn spawn(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            // Double-start guard: a live handle makes this a no-op.
            return Ok(());
        }

        tracing::info!("Starting hub core from {}", self.binary_path.display());

        let mut child = Command::new(&self.binary_path)
            .env("CORE_HOST", &self.host)
            .env("CORE_PORT", self.port.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HubkitError::Supervisor(format!(
                    "Failed to spawn {}: {}",
                    self.binary_path.display(),
                    e
                ))
            })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pipe_lines(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pipe_lines(stderr, "stderr"));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *guard = Some(ChildHandle {
            shutdown: shutdown_tx,
        });
        drop(guard);

        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let code = status.ok().and_then(|s| s.code());
                    tracing::info!("Hub core exited with code {}", code.unwrap_or(0));
                    *supervisor.last_exit.lock().await = code;
                }
                _ = shutdown_rx => {
                    tracing::info!("Terminating hub core");
                    if let Err(e) = child.start_kill() {
                        tracing::warn!("Failed to kill hub core: {}", e);
                    }
                    let _ = child.wait().await;
                }
            }
            *supervisor.handle.lock().await = None;
        });

        Ok(())
    }

    /// Terminates the supervised child, if any. Idempotent.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.shutdown.send(());
        }
    }
}

async fn pipe_lines(reader: impl AsyncRead + Unpin, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!(target: "hub_core", "[{}] {}", stream, line);
    }
}
