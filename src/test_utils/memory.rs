//! In-memory [`StoreBackend`] mirroring the etcd semantics the agent relies
//! on: leases with renewal signals, lease-scoped key expiry, and prefix
//! watch fan-out. Tests can force lease expiry and store-side watch closure.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::constants::KEEPALIVE_CHANNEL_CAPACITY;
use crate::constants::WATCH_CHANNEL_CAPACITY;
use crate::KvEntry;
use crate::Result;
use crate::StoreBackend;
use crate::StoreError;
use crate::WatchEvent;

#[derive(Default)]
struct Inner {
    next_lease_id: i64,
    kv: BTreeMap<String, (String, i64)>,
    leases: HashMap<i64, CancellationToken>,
    watchers: Vec<WatcherEntry>,
}

struct WatcherEntry {
    prefix: String,
    tx: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates store-side lease expiry: the keepalive signal closes and
    /// every key bound to the lease is deleted.
    pub fn expire_lease(&self, lease_id: i64) {
        let mut inner = self.inner.lock();
        if let Some(cancel) = inner.leases.remove(&lease_id) {
            cancel.cancel();
        }
        Self::drop_leased_keys(&mut inner, lease_id);
    }

    /// Simulates the store cancelling active watches under `prefix`, e.g.
    /// after compaction.
    pub fn close_watches(&self, prefix: &str) {
        let mut inner = self.inner.lock();
        for watcher in &inner.watchers {
            if watcher.prefix == prefix {
                watcher.cancel.cancel();
            }
        }
        inner.watchers.retain(|w| !w.cancel.is_cancelled());
    }

    pub fn key_count(&self) -> usize {
        self.inner.lock().kv.len()
    }

    pub fn lease_count(&self) -> usize {
        self.inner.lock().leases.len()
    }

    fn drop_leased_keys(inner: &mut Inner, lease_id: i64) {
        let dead: Vec<String> = inner
            .kv
            .iter()
            .filter(|(_, (_, lease))| *lease == lease_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in dead {
            inner.kv.remove(&key);
            Self::notify(inner, WatchEvent::Delete { key });
        }
    }

    fn notify(inner: &mut Inner, event: WatchEvent) {
        let key = match &event {
            WatchEvent::Put { key } | WatchEvent::Delete { key } => key.clone(),
            WatchEvent::Synced => return,
        };
        inner.watchers.retain(|w| !w.tx.is_closed() && !w.cancel.is_cancelled());
        for watcher in &inner.watchers {
            if key.starts_with(&watcher.prefix) {
                let _ = watcher.tx.try_send(event.clone());
            }
        }
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn grant_lease(&self, _ttl: Duration) -> Result<i64> {
        let mut inner = self.inner.lock();
        inner.next_lease_id += 1;
        let lease_id = inner.next_lease_id;
        inner.leases.insert(lease_id, CancellationToken::new());
        Ok(lease_id)
    }

    async fn revoke_lease(&self, lease_id: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(cancel) = inner.leases.remove(&lease_id) {
            cancel.cancel();
        }
        Self::drop_leased_keys(&mut inner, lease_id);
        Ok(())
    }

    async fn keep_alive(&self, lease_id: i64, _ttl: Duration) -> Result<mpsc::Receiver<()>> {
        let cancel = {
            let inner = self.inner.lock();
            inner
                .leases
                .get(&lease_id)
                .cloned()
                .ok_or_else(|| StoreError::Unavailable(format!("unknown lease {lease_id}")))?
        };

        let (tx, rx) = mpsc::channel(KEEPALIVE_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {
                        if let Err(TrySendError::Closed(_)) = tx.try_send(()) {
                            break;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn put(&self, key: &str, value: &str, lease_id: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        if lease_id != 0 && !inner.leases.contains_key(&lease_id) {
            return Err(StoreError::Unavailable(format!("unknown lease {lease_id}")).into());
        }
        inner.kv.insert(key.to_string(), (value.to_string(), lease_id));
        Self::notify(&mut inner, WatchEvent::Put { key: key.to_string() });
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KvEntry>> {
        let inner = self.inner.lock();
        Ok(inner
            .kv
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, (value, _))| KvEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.kv.remove(key).is_some() {
            Self::notify(&mut inner, WatchEvent::Delete { key: key.to_string() });
        }
        Ok(())
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<WatchEvent>> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        self.inner.lock().watchers.push(WatcherEntry {
            prefix: prefix.to_string(),
            tx,
            cancel: cancel.clone(),
        });

        // Drop the sender promptly on cancellation so the receiver ends
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            cancel.cancelled().await;
            inner.lock().watchers.retain(|w| !w.cancel.is_cancelled());
        });

        Ok(rx)
    }
}
