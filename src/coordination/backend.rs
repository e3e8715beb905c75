use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::KvEntry;
use super::WatchEvent;
use crate::Result;

/// Raw coordination-store primitives.
///
/// [`CoordClient`](super::CoordClient) layers the registration semantics
/// (validation, default TTL, lease replacement, marker injection) on top of
/// this seam, so backends stay thin.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
    /// Grants a lease; keys bound to it are deleted by the store when the
    /// lease is not renewed within `ttl`.
    async fn grant_lease(&self, ttl: Duration) -> Result<i64>;

    async fn revoke_lease(&self, lease_id: i64) -> Result<()>;

    /// Starts background renewal of `lease_id`. The returned channel yields
    /// one tick per successful renewal and closes when the store reports the
    /// lease dead or the receiver is dropped.
    async fn keep_alive(&self, lease_id: i64, ttl: Duration) -> Result<mpsc::Receiver<()>>;

    async fn put(&self, key: &str, value: &str, lease_id: i64) -> Result<()>;

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KvEntry>>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Raw event feed for mutations under `prefix`. No marker is injected at
    /// this layer. The feed ends when `cancel` fires or the store cancels
    /// the watch.
    async fn watch_prefix(
        &self,
        prefix: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<WatchEvent>>;
}
