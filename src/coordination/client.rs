use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::Coordination;
use super::KvEntry;
use super::StoreBackend;
use super::WatchEvent;
use crate::constants::DEFAULT_REGISTRATION_TTL;
use crate::constants::WATCH_CHANNEL_CAPACITY;
use crate::Error;
use crate::Result;

/// [`Coordination`] implementation over any [`StoreBackend`].
///
/// Owns at most one lease and the cancellation context of every active
/// watch. A dead lease id is never reused for a put: re-registration
/// revokes the prior lease before granting a new one.
pub struct CoordClient<S> {
    backend: Arc<S>,
    lease_id: Mutex<i64>,
    watches: Mutex<HashMap<String, CancellationToken>>,
}

impl<S: StoreBackend> CoordClient<S> {
    pub fn new(backend: S) -> Self {
        Self {
            backend: Arc::new(backend),
            lease_id: Mutex::new(0),
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// Best-effort release of the held lease and all active watches
    async fn release(&self) {
        let lease_id = std::mem::take(&mut *self.lease_id.lock());
        if lease_id != 0 {
            if let Err(e) = self.backend.revoke_lease(lease_id).await {
                warn!(lease_id, error = %e, "failed to revoke lease");
            }
        }

        let watches: Vec<(String, CancellationToken)> =
            self.watches.lock().drain().collect();
        for (prefix, cancel) in watches {
            debug!(%prefix, "releasing watch");
            cancel.cancel();
        }
    }
}

#[async_trait]
impl<S: StoreBackend> Coordination for CoordClient<S> {
    async fn register(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<mpsc::Receiver<()>> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("empty registration key".into()));
        }
        if value.is_empty() {
            return Err(Error::InvalidArgument("empty registration value".into()));
        }

        let ttl = if ttl.is_zero() {
            DEFAULT_REGISTRATION_TTL
        } else {
            ttl
        };

        // No orphaned leases: the prior lease is closed before a new grant
        let prior = *self.lease_id.lock();
        if prior != 0 {
            self.backend.revoke_lease(prior).await?;
            *self.lease_id.lock() = 0;
        }

        let lease_id = self.backend.grant_lease(ttl).await?;
        self.backend.put(key, value, lease_id).await?;
        let keepalive = self.backend.keep_alive(lease_id, ttl).await?;

        *self.lease_id.lock() = lease_id;
        Ok(keepalive)
    }

    async fn deregister(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidArgument("empty registration key".into()));
        }

        // Delete ignores lease association so a stale tie cannot block it
        self.backend.delete(key).await?;
        self.release().await;
        Ok(())
    }

    async fn get_entries(&self, prefix: &str) -> Result<Vec<KvEntry>> {
        if prefix.is_empty() {
            return Err(Error::InvalidArgument("empty prefix".into()));
        }

        self.backend.get_prefix(prefix).await
    }

    async fn watch(&self, prefix: &str) -> Result<mpsc::Receiver<WatchEvent>> {
        if prefix.is_empty() {
            return Err(Error::InvalidArgument("empty prefix".into()));
        }

        // Single logical subscription per prefix: replace an existing one
        if let Some(old) = self.watches.lock().remove(prefix) {
            old.cancel();
        }

        let cancel = CancellationToken::new();
        let mut raw = self
            .backend
            .watch_prefix(prefix, cancel.clone())
            .await?;
        self.watches.lock().insert(prefix.to_string(), cancel);

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            // Subscription marker first; callers must consume it before
            // relying on the stream
            if tx.send(WatchEvent::Synced).await.is_err() {
                return;
            }
            while let Some(item) = raw.recv().await {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
            // Raw feed ended: dropping tx ends the stream without error
        });

        Ok(rx)
    }

    async fn dewatch(&self, prefix: &str) -> Result<()> {
        if prefix.is_empty() {
            return Err(Error::InvalidArgument("empty prefix".into()));
        }

        if let Some(cancel) = self.watches.lock().remove(prefix) {
            cancel.cancel();
        }
        Ok(())
    }

    fn lease_id(&self) -> i64 {
        *self.lease_id.lock()
    }
}
