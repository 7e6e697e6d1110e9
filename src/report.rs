//! Structured results of sync ticks and the logging that consumes them.
//!
//! Components return what happened instead of logging it; the coordinator's
//! loop hands each [`TickReport`] to [`TickReport::log`].

use std::path::{Path, PathBuf};

use crate::aggregate::TargetFailure;
use crate::error::{ConfigError, PublishError, StateError};

/// How a tick ended.
#[derive(Debug)]
pub enum TickOutcome {
    /// No configuration was available; the tick did nothing.
    ConfigUnavailable(ConfigError),
    /// The addresses matched the last publish; no I/O was performed.
    Unchanged,
    /// A new snapshot was published.
    Published {
        /// File written.
        path: PathBuf,
    },
    /// Publishing failed; the previous snapshot remains current.
    PublishFailed {
        /// File that was to be written.
        path: PathBuf,
        /// Why.
        error: PublishError,
    },
}

/// Everything one tick did.
#[derive(Debug)]
pub struct TickReport {
    /// Number of configured targets.
    pub targets: usize,
    /// Number of distinct addresses resolved.
    pub addresses: usize,
    /// Targets skipped because resolution failed.
    pub failures: Vec<TargetFailure>,
    /// Final outcome.
    pub outcome: TickOutcome,
}

impl TickReport {
    pub(crate) fn config_unavailable(error: ConfigError) -> Self {
        Self {
            targets: 0,
            addresses: 0,
            failures: Vec::new(),
            outcome: TickOutcome::ConfigUnavailable(error),
        }
    }

    /// Whether this tick wrote a new snapshot.
    #[must_use]
    pub fn is_published(&self) -> bool {
        matches!(self.outcome, TickOutcome::Published { .. })
    }

    /// Emits the report as log events.
    pub fn log(&self) {
        for failure in &self.failures {
            tracing::warn!(
                cluster = %failure.cluster,
                namespace = %failure.namespace,
                services = ?failure.services,
                "sync target skipped: {}",
                failure.error
            );
        }

        match &self.outcome {
            TickOutcome::ConfigUnavailable(e) => {
                tracing::error!("get runtime config failed, skipping tick: {e}");
            }
            TickOutcome::Unchanged => {
                tracing::debug!(
                    targets = self.targets,
                    addresses = self.addresses,
                    "endpoints unchanged"
                );
            }
            TickOutcome::Published { path } => {
                tracing::info!(
                    targets = self.targets,
                    addresses = self.addresses,
                    "wrote {}",
                    path.display()
                );
            }
            TickOutcome::PublishFailed { path, error } => {
                tracing::error!("publish to {} failed: {error}", path.display());
            }
        }
    }
}

/// Logs the result of loading the prior snapshot at startup.
pub fn log_state_load(path: &Path, error: Option<&StateError>) {
    match error {
        None => tracing::info!("loaded previous snapshot from {}", path.display()),
        Some(e) if e.is_not_found() => {
            tracing::info!("no previous snapshot at {}, starting empty", path.display());
        }
        Some(e) => tracing::warn!("skip reading previous snapshot: {e}"),
    }
}
