//! Registration lifecycle: owns the node's liveness record and its lease.
//!
//! The registrar registers once and keeps the lease alive for the process
//! lifetime. Loss of the lease is surfaced as an observable state
//! transition, not an error value; re-registration is an explicit caller
//! decision.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::Coordination;
use crate::Error;
use crate::NodeConfig;
use crate::Result;

/// `Unregistered → Registering → Registered → (Lost | Deregistering) → Unregistered`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrarState {
    Unregistered,
    Registering,
    Registered,
    /// The keepalive signal closed; the record may already be gone from the
    /// store. A supervisor decides whether to re-invoke `register`.
    Lost,
    Deregistering,
}

struct LivenessTask {
    cancel: CancellationToken,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

pub struct LeaseRegistrar {
    client: Arc<dyn Coordination>,
    key: String,
    value: String,
    ttl: Duration,
    state: watch::Sender<RegistrarState>,
    liveness: Mutex<Option<LivenessTask>>,
    /// Bumped on every successful registration; a superseded liveness task
    /// compares its own generation before touching the state.
    generation: Arc<AtomicU64>,
}

impl LeaseRegistrar {
    pub fn new(client: Arc<dyn Coordination>, node: &NodeConfig) -> Self {
        let (state, _) = watch::channel(RegistrarState::Unregistered);
        Self {
            client,
            key: node.registration_key(),
            value: node.payload.clone(),
            ttl: node.registration_ttl(),
            state,
            liveness: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> RegistrarState {
        *self.state.borrow()
    }

    /// Observe state transitions, e.g. to supervise `Lost`
    pub fn subscribe(&self) -> watch::Receiver<RegistrarState> {
        self.state.subscribe()
    }

    pub fn registration_key(&self) -> &str {
        &self.key
    }

    /// Registers the liveness record and starts the liveness loop.
    ///
    /// Valid from `Unregistered` and `Lost`; a call while already registered
    /// is a no-op. On a store failure the state reverts to `Unregistered`
    /// and the error is propagated.
    pub async fn register(&self) -> Result<()> {
        if matches!(
            self.state(),
            RegistrarState::Registered | RegistrarState::Registering
        ) {
            warn!(key = %self.key, "register called on a live registration; ignoring");
            return Ok(());
        }

        self.state.send_replace(RegistrarState::Registering);

        let keepalive = match self
            .client
            .register(&self.key, &self.value, self.ttl)
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                self.state.send_replace(RegistrarState::Unregistered);
                return Err(Error::Registration(Box::new(e)));
            }
        };

        self.stop_liveness();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let state = self.state.clone();
        let token = cancel.clone();
        let generations = Arc::clone(&self.generation);
        let handle = tokio::spawn(async move {
            Self::liveness_loop(keepalive, state, token, generations, generation).await;
        });
        *self.liveness.lock() = Some(LivenessTask { cancel, handle });

        self.state.send_replace(RegistrarState::Registered);
        info!(key = %self.key, lease_id = self.client.lease_id(), "node registered");
        Ok(())
    }

    /// Best-effort removal of the record and local cleanup. Valid from any
    /// state; a repeated call is a no-op.
    pub async fn deregister(&self) -> Result<()> {
        if self.state() == RegistrarState::Unregistered {
            return Ok(());
        }

        self.state.send_replace(RegistrarState::Deregistering);

        if let Err(e) = self.client.deregister(&self.key).await {
            warn!(key = %self.key, error = %e, "best-effort deregister failed");
        }

        self.stop_liveness();
        self.state.send_replace(RegistrarState::Unregistered);
        info!(key = %self.key, "node deregistered");
        Ok(())
    }

    async fn liveness_loop(
        mut keepalive: mpsc::Receiver<()>,
        state: watch::Sender<RegistrarState>,
        cancel: CancellationToken,
        generations: Arc<AtomicU64>,
        generation: u64,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                tick = keepalive.recv() => {
                    if tick.is_none() {
                        break;
                    }
                }
            }
        }

        // A superseded task must not touch a newer registration's state
        if generations.load(Ordering::SeqCst) != generation {
            return;
        }

        // Only a live registration can be lost; a concurrent deregister wins
        let lost = state.send_if_modified(|s| {
            if *s == RegistrarState::Registered {
                *s = RegistrarState::Lost;
                true
            } else {
                false
            }
        });
        if lost {
            warn!("registration lease lost");
        }
    }

    fn stop_liveness(&self) {
        if let Some(task) = self.liveness.lock().take() {
            task.cancel.cancel();
        }
    }
}
