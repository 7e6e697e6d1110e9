//! Error types for the sync engine.
//!
//! None of these are fatal to the sync loop: each is recovered within the
//! tick that produced it and surfaces through a [`TickReport`](crate::TickReport).

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned by [`ClusterClient`](crate::ClusterClient) implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure to resolve one sync target into addresses.
///
/// Names the service whose endpoint lookup failed; the whole target is
/// skipped for the cycle.
#[derive(Debug, Error)]
#[error("get {cluster}/{namespace}/{service} endpoints: {source}")]
pub struct ResolveError {
    /// Cluster label from the target.
    pub cluster: String,
    /// Namespace of the service.
    pub namespace: String,
    /// Service whose endpoints were requested.
    pub service: String,
    /// Underlying client error.
    #[source]
    pub source: BoxError,
}

/// Failure to obtain a usable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("read config {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for [`SyncConfig`](crate::SyncConfig).
    #[error("parse config {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// The configuration parsed but is not usable.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// The configuration watcher could not be set up.
    #[error("watch config {path}: {source}")]
    Watch {
        /// File being watched.
        path: PathBuf,
        /// Underlying watcher error.
        #[source]
        source: notify::Error,
    },
}

/// Failure to load a previously published snapshot.
#[derive(Debug, Error)]
pub enum StateError {
    /// The snapshot file could not be read.
    #[error("read snapshot {path}: {source}")]
    Read {
        /// Snapshot file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file is malformed.
    #[error("parse snapshot {path}: {source}")]
    Parse {
        /// Snapshot file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },
}

/// Failure to publish a snapshot.
///
/// Except for [`PublishError::Sync`], the previously published file is
/// untouched when this is returned.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The snapshot could not be serialized.
    #[error("serialize snapshot: {0}")]
    Serialize(#[from] serde_yaml::Error),

    /// The temporary file could not be written.
    #[error("write {path}: {source}")]
    Write {
        /// Temporary file being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The temporary file could not be moved onto the output path.
    #[error("rename {from} to {to}: {source}")]
    Rename {
        /// Temporary file.
        from: PathBuf,
        /// Output file.
        to: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The output directory could not be flushed after the rename. The new
    /// file is in place but may not survive a crash.
    #[error("sync directory {path}: {source}")]
    Sync {
        /// Directory holding the output file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The blocking publish task did not complete.
    #[error("publish task failed: {0}")]
    Task(String),
}
