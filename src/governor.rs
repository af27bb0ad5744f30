//! Idle shutdown policy for the supervised core.
//!
//! The governor is the only owner of the connected-client count and of the
//! shutdown timer. The networking layer feeds it connect/disconnect events;
//! nothing else may touch its state. Invariant: a shutdown timer is pending
//! exactly when the client count is zero and the core is running, and at most
//! one timer is active at any moment. A connect cancels any pending timer
//! unconditionally, however close it is to firing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::supervisor::CoreSupervisor;

/// Answers "is the supervised process alive right now". Seam between the
/// governor and the supervisor so the policy is testable in isolation.
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    async fn process_running(&self) -> bool;
}

#[async_trait]
impl ProcessProbe for CoreSupervisor {
    async fn process_running(&self) -> bool {
        self.is_running().await
    }
}

struct GovernorState {
    clients: usize,
    /// Bumped on every connect; a timer only fires if the generation it was
    /// scheduled under is still current.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

pub struct LifecycleGovernor {
    grace: Duration,
    probe: Arc<dyn ProcessProbe>,
    state: Mutex<GovernorState>,
    shutdown_tx: mpsc::Sender<()>,
}

impl LifecycleGovernor {
    /// Returns the governor and the receiver the host process listens on for
    /// the "grace period elapsed, tear everything down" signal.
    pub fn new(grace: Duration, probe: Arc<dyn ProcessProbe>) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let governor = Arc::new(Self {
            grace,
            probe,
            state: Mutex::new(GovernorState {
                clients: 0,
                generation: 0,
                timer: None,
            }),
            shutdown_tx,
        });
        (governor, shutdown_rx)
    }

    pub async fn client_connected(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        state.clients += 1;
        state.generation += 1;

        if let Some(timer) = state.timer.take() {
            timer.abort();
            tracing::info!(
                "Shutdown timer cancelled, client reconnected ({} active)",
                state.clients
            );
        } else {
            tracing::info!("Client connected ({} active)", state.clients);
        }
    }

    pub async fn client_disconnected(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        state.clients = state.clients.saturating_sub(1);
        tracing::info!("Client disconnected ({} active)", state.clients);

        if state.clients > 0 || state.timer.is_some() {
            return;
        }

        if !self.probe.process_running().await {
            return;
        }

        tracing::info!(
            "No active clients, scheduling shutdown in {:?}",
            self.grace
        );
        let generation = state.generation;
        let governor = Arc::clone(self);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(governor.grace).await;
            governor.fire(generation).await;
        }));
    }

    pub async fn active_clients(&self) -> usize {
        self.state.lock().await.clients
    }

    pub async fn shutdown_pending(&self) -> bool {
        self.state.lock().await.timer.is_some()
    }

    /// Runs when a timer elapses. A timer scheduled before the most recent
    /// connect is stale and does nothing, even if abort lost the race.
    async fn fire(&self, generation: u64) {
        {
            let mut state = self.state.lock().await;
            if state.generation != generation || state.clients > 0 {
                return;
            }
            state.timer = None;
        }

        tracing::info!("Grace period elapsed, requesting shutdown");
        let _ = self.shutdown_tx.try_send(());
    }
}
