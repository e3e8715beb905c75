//! Configuration management for the node agent.
//!
//! Loading priority:
//! 1. Default values (hardcoded)
//! 2. Config file named by the `CONFIG_PATH` environment variable
//! 3. Environment variables with the `BEAT` prefix (highest priority)
//!
//! There is no process-wide mutable configuration state: the loaded
//! [`Settings`] value is passed explicitly at construction time.

mod node;
mod store;
pub use node::*;
pub use store::*;


//---
use std::env;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Node identity and registration parameters
    #[serde(default)]
    pub node: NodeConfig,
    /// Coordination-store connection parameters
    #[serde(default)]
    pub store: StoreConfig,
}

impl Settings {
    /// Load configuration from defaults, an optional `CONFIG_PATH` file and
    /// `BEAT__`-prefixed environment variables.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder();

        if let Ok(path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("BEAT")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize::<Settings>()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates every configuration section
    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;
        self.store.validate()?;
        Ok(())
    }
}
