#![deny(missing_docs)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Multi-cluster Kubernetes endpoint synchronizer for file-based service discovery.
//!
//! Consumers such as Prometheus/Thanos file SD or a hot-reloading proxy read a
//! YAML file listing backend addresses. This crate keeps that file in sync with
//! the live endpoints of named services across one or more Kubernetes clusters.
//!
//! # Features
//!
//! - **Multi-cluster**: each target carries its own kubeconfig and context
//! - **Partial-failure tolerant**: an unreachable cluster is skipped for a tick while the
//!   rest are still published
//! - **Idempotent**: unchanged endpoint sets never touch the file
//! - **Crash-safe**: snapshots are written to a temporary file and renamed into place
//! - **Hot reload**: configuration changes apply on the next tick without a restart
//!
//! # Usage
//!
//! ```ignore
//! use storesd::{ConfigHandle, KubeClusterClient, SyncConfig, SyncCoordinator, SyncTarget};
//!
//! let config = SyncConfig::new("/etc/prometheus/sd")
//!     .target(SyncTarget::new("cluster-a", "monitoring").service("thanos-store", "grpc"));
//!
//! let coordinator = SyncCoordinator::new(ConfigHandle::new(config), KubeClusterClient::new());
//! coordinator.run(tokio::signal::ctrl_c().map(|_| ())).await;
//! ```
//!
//! The published file is a list with one group of targets:
//!
//! ```yaml
//! - targets:
//!   - 10.0.0.1:10901
//!   - 10.0.0.2:10901
//! ```
//!
//! Only one process may publish to a given output path.

mod address;
mod aggregate;
mod config;
mod coordinator;
mod error;
mod k8s;
mod publish;
mod report;
mod state;

pub use address::{Address, AddressSet};
pub use aggregate::{Aggregate, TargetFailure, aggregate};
pub use config::{
    ClusterRef, ConfigHandle, ConfigProvider, FileConfigSource, OUTPUT_FILE_NAME, ServicePort,
    SyncConfig, SyncTarget, watch_config_file,
};
pub use coordinator::{DEFAULT_INTERVAL, SyncCoordinator};
pub use error::{BoxError, ConfigError, PublishError, ResolveError, StateError};
pub use k8s::{ClusterClient, KubeClusterClient, resolve};
pub use publish::{FilePublisher, Publisher, TEMP_SUFFIX, publish, temp_path};
pub use report::{TickOutcome, TickReport, log_state_load};
pub use state::{PublishedSnapshot, ServiceEndpoints, StateStore, has_changed};
