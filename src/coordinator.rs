//! The periodic reconciliation loop.
//!
//! Each tick reads the current configuration, resolves every target, and
//! publishes the merged address set if it differs from the last publish:
//!
//! ```text
//! Idle --interval--> Ticking --unchanged / published / failed--> Idle
//!   \                                                           /
//!    `----------------- shutdown -------> Stopped <------------'
//! ```
//!
//! Ticks never overlap: the next one is only awaited after the current one has
//! finished. Shutdown is observed between ticks, so an in-flight tick always
//! runs to completion.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::aggregate::{Aggregate, aggregate};
use crate::config::{ClusterRef, ConfigProvider};
use crate::error::{PublishError, StateError};
use crate::k8s::ClusterClient;
use crate::publish::{FilePublisher, Publisher};
use crate::report::{self, TickOutcome, TickReport};
use crate::state::{PublishedSnapshot, StateStore};

/// Default time between ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Drives sync ticks on a fixed interval.
///
/// The coordinator exclusively owns the record of the last published snapshot.
pub struct SyncCoordinator<P, C, W = FilePublisher> {
    config: P,
    client: C,
    publisher: Arc<W>,
    interval: Duration,
    state: StateStore,
}

impl<P, C> SyncCoordinator<P, C>
where
    P: ConfigProvider,
    C: ClusterClient,
{
    /// Creates a coordinator publishing files with [`FilePublisher`] every
    /// [`DEFAULT_INTERVAL`].
    #[must_use]
    pub fn new(config: P, client: C) -> Self {
        Self {
            config,
            client,
            publisher: Arc::new(FilePublisher),
            interval: DEFAULT_INTERVAL,
            state: StateStore::default(),
        }
    }
}

impl<P, C, W> SyncCoordinator<P, C, W>
where
    P: ConfigProvider,
    C: ClusterClient,
    W: Publisher,
{
    /// Sets the time between ticks. A zero interval is ignored.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Replaces the publisher.
    #[must_use]
    pub fn publisher<W2: Publisher>(self, publisher: W2) -> SyncCoordinator<P, C, W2> {
        SyncCoordinator {
            config: self.config,
            client: self.client,
            publisher: Arc::new(publisher),
            interval: self.interval,
            state: self.state,
        }
    }

    /// The last published state.
    #[must_use]
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Loads the previously published snapshot from `path`.
    ///
    /// A missing or malformed file leaves the coordinator with no prior state;
    /// the error is returned for reporting only.
    pub fn load_state(&mut self, path: &Path) -> Option<StateError> {
        let (state, error) = StateStore::load(path);
        self.state = state;
        error
    }

    /// Runs one reconciliation cycle.
    ///
    /// The configuration is read once. Unchanged addresses cause no I/O. A
    /// failed publish leaves the last published state in place so the next
    /// tick tries again.
    pub async fn tick(&mut self) -> TickReport {
        let config = match self.config.current() {
            Ok(config) => config,
            Err(e) => return TickReport::config_unavailable(e),
        };

        let clusters: Vec<&ClusterRef> =
            config.sync_targets.iter().map(|t| &t.cluster).collect();
        self.client.retain_clusters(&clusters);

        let Aggregate {
            addresses,
            failures,
        } = aggregate(&self.client, &config.sync_targets).await;
        let path = config.output_file();

        let mut report = TickReport {
            targets: config.sync_targets.len(),
            addresses: addresses.len(),
            failures,
            outcome: TickOutcome::Unchanged,
        };

        if !self.state.has_changed(&addresses, &path) {
            return report;
        }

        let snapshot = PublishedSnapshot::single(&addresses);

        report.outcome = match self.publish(path.clone(), snapshot).await {
            Ok(snapshot) => {
                self.state.commit(snapshot, &path);
                TickOutcome::Published { path }
            }
            Err(error) => TickOutcome::PublishFailed { path, error },
        };

        report
    }

    async fn publish(
        &self,
        path: PathBuf,
        snapshot: PublishedSnapshot,
    ) -> Result<PublishedSnapshot, PublishError> {
        let publisher = Arc::clone(&self.publisher);

        tokio::task::spawn_blocking(move || {
            publisher.publish(&path, &snapshot).map(|()| snapshot)
        })
        .await
        .map_err(|e| PublishError::Task(e.to_string()))?
    }

    /// Loads the prior snapshot, then ticks every interval until `shutdown`
    /// completes.
    ///
    /// The first tick fires one interval after start. `shutdown` is checked
    /// before every tick and never interrupts one in progress.
    pub async fn run<S>(mut self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        match self.config.current() {
            Ok(config) => {
                let path = config.output_file();
                let error = self.load_state(&path);
                report::log_state_load(&path, error.as_ref());
            }
            Err(e) => {
                tracing::warn!(
                    "get runtime config failed, starting without previous snapshot: {e}"
                );
            }
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!("start sync every {:?}", self.interval);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => break,
                _ = ticker.tick() => self.tick().await.log(),
            }
        }

        tracing::info!("stop sync service");
    }
}
