use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use etcd_client::Certificate;
use etcd_client::Client;
use etcd_client::ConnectOptions;
use etcd_client::EventType;
use etcd_client::GetOptions;
use etcd_client::Identity;
use etcd_client::PutOptions;
use etcd_client::TlsOptions;
use etcd_client::WatchOptions;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::KvEntry;
use super::StoreBackend;
use super::WatchEvent;
use crate::constants::KEEPALIVE_CHANNEL_CAPACITY;
use crate::constants::KEEPALIVE_TICKS_PER_TTL;
use crate::constants::WATCH_CHANNEL_CAPACITY;
use crate::Result;
use crate::StoreConfig;
use crate::StoreError;

/// etcd-backed [`StoreBackend`].
///
/// The underlying `etcd_client::Client` is cheap to clone; every operation
/// clones it because the client API takes `&mut self`.
pub struct EtcdBackend {
    client: Client,
}

impl EtcdBackend {
    /// Connects to the configured endpoints, with optional user auth and
    /// client TLS.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let mut options = ConnectOptions::new()
            .with_connect_timeout(Duration::from_millis(config.dial_timeout_in_ms))
            .with_keep_alive(
                Duration::from_secs(config.dial_keep_alive_in_secs),
                Duration::from_secs(config.dial_keep_alive_in_secs),
            );

        if !config.username.is_empty() {
            options = options.with_user(&config.username, &config.password);
        }

        if !config.cert_file.is_empty() && !config.key_file.is_empty() {
            let cert = read_pem(&config.cert_file).await?;
            let key = read_pem(&config.key_file).await?;
            let mut tls = TlsOptions::new().identity(Identity::from_pem(cert, key));
            if !config.ca_cert.is_empty() {
                tls = tls.ca_certificate(Certificate::from_pem(read_pem(&config.ca_cert).await?));
            }
            options = options.with_tls(tls);
        }

        let client = Client::connect(&config.endpoints, Some(options)).await?;
        Ok(Self { client })
    }
}

async fn read_pem(path: &str) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|source| {
        StoreError::TlsMaterial {
            path: PathBuf::from(path),
            source,
        }
        .into()
    })
}

#[async_trait]
impl StoreBackend for EtcdBackend {
    async fn grant_lease(&self, ttl: Duration) -> Result<i64> {
        let mut client = self.client.clone();
        let resp = client.lease_grant(ttl.as_secs() as i64, None).await?;
        Ok(resp.id())
    }

    async fn revoke_lease(&self, lease_id: i64) -> Result<()> {
        let mut client = self.client.clone();
        client.lease_revoke(lease_id).await?;
        Ok(())
    }

    async fn keep_alive(&self, lease_id: i64, ttl: Duration) -> Result<mpsc::Receiver<()>> {
        let mut client = self.client.clone();
        let (mut keeper, mut stream) = client.lease_keep_alive(lease_id).await?;

        let period = (ttl / KEEPALIVE_TICKS_PER_TTL).max(Duration::from_secs(1));
        let (tx, rx) = mpsc::channel(KEEPALIVE_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if let Err(e) = keeper.keep_alive().await {
                    warn!(lease_id, error = %e, "lease renewal request failed");
                    break;
                }

                match stream.message().await {
                    Ok(Some(resp)) if resp.ttl() > 0 => {
                        // A slow consumer only misses ticks, it never stalls renewal
                        if let Err(TrySendError::Closed(_)) = tx.try_send(()) {
                            break;
                        }
                    }
                    Ok(Some(_)) => {
                        warn!(lease_id, "store reports lease expired");
                        break;
                    }
                    Ok(None) => {
                        warn!(lease_id, "keepalive stream closed by the store");
                        break;
                    }
                    Err(e) => {
                        warn!(lease_id, error = %e, "keepalive stream failed");
                        break;
                    }
                }
            }
            // Dropping tx closes the keepalive signal
        });

        Ok(rx)
    }

    async fn put(&self, key: &str, value: &str, lease_id: i64) -> Result<()> {
        let mut client = self.client.clone();
        client
            .put(key, value, Some(PutOptions::new().with_lease(lease_id)))
            .await?;
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KvEntry>> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;

        let mut entries = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            entries.push(KvEntry {
                key: kv.key_str()?.to_string(),
                value: kv.value_str()?.to_string(),
            });
        }
        Ok(entries)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut client = self.client.clone();
        client.delete(key, None).await?;
        Ok(())
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<WatchEvent>> {
        let mut client = self.client.clone();
        let (mut watcher, mut stream) = client
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await?;

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let prefix = prefix.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if let Err(e) = watcher.cancel().await {
                            debug!(%prefix, error = %e, "watch cancel request failed");
                        }
                        break;
                    }
                    msg = stream.message() => match msg {
                        Ok(Some(resp)) => {
                            if resp.canceled() {
                                debug!(%prefix, "watch canceled by the store");
                                break;
                            }
                            for event in resp.events() {
                                let kv = match event.kv() {
                                    Some(kv) => kv,
                                    None => continue,
                                };
                                let key = match kv.key_str() {
                                    Ok(k) => k.to_string(),
                                    Err(e) => {
                                        warn!(%prefix, error = %e, "non-utf8 watch key skipped");
                                        continue;
                                    }
                                };
                                let item = match event.event_type() {
                                    EventType::Put => WatchEvent::Put { key },
                                    EventType::Delete => WatchEvent::Delete { key },
                                };
                                if tx.send(item).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Ok(None) => {
                            debug!(%prefix, "watch stream ended");
                            break;
                        }
                        Err(e) => {
                            warn!(%prefix, error = %e, "watch stream failed");
                            break;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
