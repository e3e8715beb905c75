//! Node Agent Error Hierarchy
//!
//! Defines error types for the registration-lifecycle and watch-to-dispatch
//! engine, categorized by the boundary they occur at.

use std::path::PathBuf;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input to a coordination-store call. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport, auth or store-internal failure on a coordination-store call
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Registration-time store failure, fatal to startup
    #[error("failed to register: {0}")]
    Registration(Box<Error>),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// etcd transport/auth/server failures
    #[error(transparent)]
    Backend(#[from] etcd_client::Error),

    /// TLS material could not be loaded from disk
    #[error("failed to read TLS material from {path}")]
    TlsMaterial {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The watch stream closed before the subscription marker arrived
    #[error("watch on {0} closed before the subscription was established")]
    WatchNotSynced(String),

    /// Store rejected or cannot serve the request
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// A directive with no command token
    #[error("empty directive")]
    EmptyDirective,

    /// The executable could not be started
    #[error("failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran but exited non-zero
    #[error("{program} exited with {status}")]
    NonZeroExit {
        program: String,
        status: std::process::ExitStatus,
        output: String,
    },
}

// ============== Conversion Implementations ============== //
impl From<etcd_client::Error> for Error {
    fn from(err: etcd_client::Error) -> Self {
        StoreError::Backend(err).into()
    }
}
