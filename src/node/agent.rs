//! Lifecycle boundary exposed to the embedding program.
//!
//! `run` performs registration followed by the watch/dispatch loop and
//! returns only on an unrecoverable setup failure or an external quit
//! signal. Steady-state failures are absorbed by the components.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::DispatchEngine;
use crate::LeaseRegistrar;
use crate::PrefixWatcher;
use crate::RegistrarState;
use crate::Result;

pub struct Agent {
    pub(super) registrar: LeaseRegistrar,
    pub(super) watcher: PrefixWatcher,
    pub(super) engine: DispatchEngine,
    pub(super) assignment_prefix: String,
    pub(super) shutdown: watch::Receiver<()>,
}

impl Agent {
    /// Registers, then dispatches assignment changes until shutdown.
    ///
    /// First registration and first watch open are fatal on failure. On
    /// exit the watch is released and the record removed best-effort.
    pub async fn run(self) -> Result<()> {
        self.registrar.register().await?;

        let (handle, events) = match self.watcher.start(&self.assignment_prefix).await {
            Ok(started) => started,
            Err(e) => {
                // setup failure: leave no record behind
                if let Err(de) = self.registrar.deregister().await {
                    warn!(error = %de, "cleanup deregister failed");
                }
                return Err(e);
            }
        };
        info!(prefix = %self.assignment_prefix, "watching assignment inbox");

        // surface lease loss; re-registration is an operator decision here
        let mut registrar_states = self.registrar.subscribe();
        tokio::spawn(async move {
            while registrar_states.changed().await.is_ok() {
                if *registrar_states.borrow() == RegistrarState::Lost {
                    error!("registration lost; the agent keeps dispatching but is invisible to the controller");
                    break;
                }
            }
        });

        // bridge the embedding program's quit signal to the engine
        let cancel = CancellationToken::new();
        let quit = cancel.clone();
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let _ = shutdown.changed().await;
            quit.cancel();
        });

        let result = self.engine.run(events, cancel).await;

        if let Err(e) = self.watcher.stop(handle).await {
            warn!(error = %e, "failed to stop watcher");
        }
        if let Err(e) = self.registrar.deregister().await {
            warn!(error = %e, "failed to deregister");
        }

        result
    }
}
