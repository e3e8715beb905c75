use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::ASSIGNMENT_PREFIX;
use crate::constants::REGISTRATION_PREFIX;
use crate::constants::REGISTRATION_SUFFIX;
use crate::Error;
use crate::Result;

/// Node identity and registration parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeConfig {
    /// Stable host identity scoping this agent's registration and assignment keys
    #[serde(default = "default_host")]
    pub host: String,

    /// Opaque liveness payload written into the registration record
    #[serde(default = "default_payload")]
    pub payload: String,

    /// TTL of the registration lease in seconds; the lease is renewed three
    /// times per TTL window
    #[serde(default = "default_registration_ttl_secs")]
    pub registration_ttl_secs: u64,

    /// Log file directory; stdout when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            payload: default_payload(),
            registration_ttl_secs: default_registration_ttl_secs(),
            log_dir: None,
        }
    }
}

impl NodeConfig {
    /// Key of this node's liveness record
    pub fn registration_key(&self) -> String {
        format!("{}/{}/{}", REGISTRATION_PREFIX, self.host, REGISTRATION_SUFFIX)
    }

    /// Prefix of this node's assignment inbox
    pub fn assignment_prefix(&self) -> String {
        format!("{}/{}", ASSIGNMENT_PREFIX, self.host)
    }

    pub fn registration_ttl(&self) -> Duration {
        Duration::from_secs(self.registration_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "node.host must not be empty".into(),
            )));
        }

        if self.registration_ttl_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "node.registration_ttl_secs must be at least 1s".into(),
            )));
        }

        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_payload() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_registration_ttl_secs() -> u64 {
    30
}
