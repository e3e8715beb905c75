//! Dispatch loop: single logical owner of one watched prefix.
//!
//! Every watch-derived signal triggers a fresh point-in-time read of the
//! whole prefix; the engine never applies events incrementally, so the work
//! dispatched reflects the snapshot at read time, not the event content.

use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::CommandRunner;
use super::DirectiveEntry;
use super::ExecutionWorker;
use crate::Coordination;
use crate::Result;
use crate::WatchEvent;

pub struct DispatchEngine {
    client: Arc<dyn Coordination>,
    prefix: String,
    worker: Arc<ExecutionWorker>,
    in_flight: Arc<DashSet<String>>,
    tracker: TaskTracker,
}

impl DispatchEngine {
    pub fn new(
        client: Arc<dyn Coordination>,
        prefix: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            worker: Arc::new(ExecutionWorker::new(runner)),
            in_flight: Arc::new(DashSet::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Consumes the event feed until shutdown or until the feed ends.
    ///
    /// A failed prefix read is absorbed: the next event retries naturally.
    /// On shutdown the loop stops accepting events and in-flight workers
    /// run to completion; nothing is forcibly killed.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<WatchEvent>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(prefix = %self.prefix, "dispatch engine shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.on_event(event).await,
                    None => {
                        warn!(prefix = %self.prefix, "watch feed ended; dispatch engine stopping");
                        break;
                    }
                }
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
        Ok(())
    }

    async fn on_event(&self, event: WatchEvent) {
        debug!(?event, "assignment change observed");

        let entries = match self.client.get_entries(&self.prefix).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    prefix = %self.prefix,
                    error = %e,
                    "failed to read assignments; waiting for the next event"
                );
                return;
            }
        };

        for entry in entries {
            self.submit(entry.into());
        }
    }

    fn submit(&self, directive: DirectiveEntry) {
        // A key whose previous execution is still running is skipped; once
        // it finishes the same directive may run again on a later snapshot.
        if !self.in_flight.insert(directive.key.clone()) {
            debug!(key = %directive.key, "execution already in flight");
            return;
        }

        let worker = Arc::clone(&self.worker);
        let in_flight = Arc::clone(&self.in_flight);
        self.tracker.spawn(async move {
            let result = worker.execute(directive).await;
            in_flight.remove(&result.directive.key);

            match &result.outcome {
                Ok(output) => info!(
                    key = %result.directive.key,
                    directive = %result.directive.raw,
                    output = %output.trim_end(),
                    "directive succeeded"
                ),
                Err(cause) => warn!(
                    key = %result.directive.key,
                    directive = %result.directive.raw,
                    error = %cause,
                    "directive failed"
                ),
            }
        });
    }
}
