//! Typed façade over the external coordination store.
//!
//! [`Coordination`] is the interface the rest of the agent consumes:
//! lease-bound registration with a background keepalive, prefix reads,
//! prefix watches with a synchronization marker, and explicit release.
//! [`StoreBackend`] is the raw-primitive seam underneath it, implemented
//! against etcd in production and an in-memory store in tests.

mod backend;
mod client;
mod etcd;
pub use backend::*;
pub use client::*;
pub use etcd::*;


use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use crate::Result;

/// Normalized item delivered by a prefix watch.
///
/// Raw store types never cross this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Synchronization marker: the subscription is active. Delivered once,
    /// before any mutation.
    Synced,
    /// A key under the watched prefix was created or updated
    Put { key: String },
    /// A key under the watched prefix was deleted
    Delete { key: String },
}

/// One key/value pair returned by a point-in-time prefix read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
}

/// Client-side view of the coordination store.
///
/// Every call can fail with a `StoreError`; no automatic retry happens at
/// this layer. Retry policy belongs to the callers.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Coordination: Send + Sync + 'static {
    /// Grants a lease with the given TTL (default TTL when zero), writes
    /// `value` at `key` bound to it and starts a background keepalive.
    /// A prior lease held by this client is closed first.
    ///
    /// Returns once the initial write succeeds. The returned receiver is the
    /// keepalive signal: one tick per successful renewal; the channel closes
    /// when the lease dies or the keepalive is cancelled.
    async fn register(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<mpsc::Receiver<()>>;

    /// Deletes `key` regardless of lease association, then releases the held
    /// lease and any active watches best-effort.
    async fn deregister(&self, key: &str) -> Result<()>;

    /// Snapshot read of all entries whose keys share `prefix`. Order is not
    /// significant.
    async fn get_entries(&self, prefix: &str) -> Result<Vec<KvEntry>>;

    /// Opens a long-lived subscription under `prefix`. The first delivered
    /// item is [`WatchEvent::Synced`]; the receiver ends without error when
    /// the store cancels the underlying watch. A second watch on the same
    /// prefix replaces the first.
    async fn watch(&self, prefix: &str) -> Result<mpsc::Receiver<WatchEvent>>;

    /// Releases the active watch for `prefix`, if any. Idempotent.
    async fn dewatch(&self, prefix: &str) -> Result<()>;

    /// Currently held lease id; `0` before any successful `register` and
    /// after `deregister`.
    fn lease_id(&self) -> i64;
}
