use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Coordination-store (etcd) connection parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// etcd endpoints, e.g. `["127.0.0.1:2379"]`
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Dial timeout for the initial connection (milliseconds)
    #[serde(default = "default_dial_timeout_in_ms")]
    pub dial_timeout_in_ms: u64,

    /// gRPC keepalive interval on the store connection (seconds)
    #[serde(default = "default_dial_keep_alive_in_secs")]
    pub dial_keep_alive_in_secs: u64,

    /// Optional etcd authentication
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,

    /// Optional TLS material; client TLS is enabled when both `cert_file`
    /// and `key_file` are set
    #[serde(default)]
    pub ca_cert: String,
    #[serde(default)]
    pub cert_file: String,
    #[serde(default)]
    pub key_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            dial_timeout_in_ms: default_dial_timeout_in_ms(),
            dial_keep_alive_in_secs: default_dial_keep_alive_in_secs(),
            username: String::new(),
            password: String::new(),
            ca_cert: String::new(),
            cert_file: String::new(),
            key_file: String::new(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() || self.endpoints.iter().any(|e| e.is_empty()) {
            return Err(Error::Config(ConfigError::Message(
                "store.endpoints must contain at least one non-empty endpoint".into(),
            )));
        }

        if self.dial_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store.dial_timeout_in_ms must be at least 1ms".into(),
            )));
        }

        if self.cert_file.is_empty() != self.key_file.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "store.cert_file and store.key_file must be set together".into(),
            )));
        }

        Ok(())
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["127.0.0.1:2379".to_string()]
}

// in ms
fn default_dial_timeout_in_ms() -> u64 {
    3000
}

// in secs
fn default_dial_keep_alive_in_secs() -> u64 {
    3
}
