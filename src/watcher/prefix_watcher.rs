//! Watch-channel ownership for one assignment-namespace prefix.
//!
//! The watcher turns the store's subscription into a typed event feed for
//! the dispatch engine, swallowing the synchronization marker. When the
//! store closes the stream without a local cancellation the watcher stops:
//! a fresh `start` is an explicit owner decision, so a store-side failure
//! is never masked as a transient blip.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::warn;

use crate::constants::WATCH_CHANNEL_CAPACITY;
use crate::Coordination;
use crate::Result;
use crate::StoreError;
use crate::WatchEvent;

pub struct PrefixWatcher {
    client: Arc<dyn Coordination>,
}

/// Handle to one running watch; consumed by [`PrefixWatcher::stop`]
pub struct WatchHandle {
    prefix: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl PrefixWatcher {
    pub fn new(client: Arc<dyn Coordination>) -> Self {
        Self { client }
    }

    /// Opens the subscription and returns the event feed once it is active.
    ///
    /// The synchronization marker is consumed here; consumers only ever see
    /// real mutations. The feed ends when [`stop`](Self::stop) is called or
    /// the store cancels the watch.
    pub async fn start(
        &self,
        prefix: &str,
    ) -> Result<(WatchHandle, mpsc::Receiver<WatchEvent>)> {
        let mut stream = self.client.watch(prefix).await?;

        match stream.recv().await {
            Some(WatchEvent::Synced) => {}
            _ => return Err(StoreError::WatchNotSynced(prefix.to_string()).into()),
        }

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let watched = prefix.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    item = stream.recv() => match item {
                        // markers are never forwarded
                        Some(WatchEvent::Synced) => continue,
                        Some(event) => {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            warn!(
                                prefix = %watched,
                                "watch stream closed by the store; a fresh start is required"
                            );
                            break;
                        }
                    }
                }
            }
        });

        Ok((
            WatchHandle {
                prefix: prefix.to_string(),
                cancel,
                task,
            },
            rx,
        ))
    }

    /// Releases the subscription and waits for the forwarding task to exit.
    pub async fn stop(&self, handle: WatchHandle) -> Result<()> {
        self.client.dewatch(&handle.prefix).await?;
        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            error!(prefix = %handle.prefix, error = %e, "watch forwarding task failed");
        }
        Ok(())
    }
}
