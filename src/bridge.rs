//! Remote bridge: the thin adapter between transport events and the
//! lifecycle governor.
//!
//! Clients reach the hub over HTTP (`/api/v1/health`, `/api/v1/status`) and a
//! WebSocket stream (`/api/v1/stream`). The bridge does not interpret business
//! payloads; its one real job is translating socket accept/close into the
//! governor's connect/disconnect signals and nudging the supervisor awake on
//! each new connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::Result;
use crate::governor::LifecycleGovernor;
use crate::supervisor::CoreSupervisor;

pub struct BridgeState {
    governor: Arc<LifecycleGovernor>,
    supervisor: Arc<CoreSupervisor>,
    started_at: Instant,
}

impl BridgeState {
    pub fn new(governor: Arc<LifecycleGovernor>, supervisor: Arc<CoreSupervisor>) -> Arc<Self> {
        Arc::new(Self {
            governor,
            supervisor,
            started_at: Instant::now(),
        })
    }
}

pub fn create_router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/status", get(status))
        .route("/api/v1/stream", get(stream))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the bridge until `stop_rx` flips, then stops accepting connections.
pub async fn serve(
    host: &str,
    port: u16,
    state: Arc<BridgeState>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| crate::error::HubkitError::Config(format!("Invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Remote bridge listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            let _ = stop_rx.changed().await;
        })
        .await?;

    tracing::info!("Remote bridge stopped");
    Ok(())
}

async fn health(State(state): State<Arc<BridgeState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.started_at.elapsed().as_secs(),
        "clients": state.governor.active_clients().await,
    }))
}

async fn status(State(state): State<Arc<BridgeState>>) -> impl IntoResponse {
    let connection = state.supervisor.connection_info();
    Json(serde_json::json!({
        "bridge": {
            "version": env!("CARGO_PKG_VERSION"),
            "uptime": state.started_at.elapsed().as_secs(),
            "clients": state.governor.active_clients().await,
            "shutdownPending": state.governor.shutdown_pending().await,
        },
        "core": {
            "running": state.supervisor.is_running().await,
            "healthy": state.supervisor.is_healthy().await,
            "httpUrl": connection.http_url,
            "wsUrl": connection.ws_url,
            "lastExitCode": state.supervisor.last_exit_code().await,
        },
    }))
}

async fn stream(
    State(state): State<Arc<BridgeState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client(socket, state))
}

async fn handle_client(mut socket: WebSocket, state: Arc<BridgeState>) {
    let client_id = Uuid::new_v4();
    state.governor.client_connected().await;
    tracing::info!("Client {} connected", client_id);

    // A client showing up is the restart trigger for a core that exited.
    if let Err(e) = state.supervisor.ensure_started().await {
        tracing::warn!("Failed to start hub core for client {}: {}", client_id, e);
    }

    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Close(_)) | Err(_) => break,
            // Business payloads are routed elsewhere; the bridge only cares
            // about connection lifetime.
            Ok(_) => {}
        }
    }

    state.governor.client_disconnected().await;
    tracing::info!("Client {} disconnected", client_id);
}
