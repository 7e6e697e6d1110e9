//! Cycle-wide aggregation of target addresses.

use crate::address::AddressSet;
use crate::config::SyncTarget;
use crate::error::ResolveError;
use crate::k8s::{ClusterClient, resolve};

/// A target that contributed nothing this cycle.
#[derive(Debug)]
pub struct TargetFailure {
    /// Cluster label of the target.
    pub cluster: String,
    /// Namespace of the target.
    pub namespace: String,
    /// Services the target asked for.
    pub services: Vec<String>,
    /// Why resolution failed.
    pub error: ResolveError,
}

/// Addresses gathered from every target in one cycle.
#[derive(Debug, Default)]
pub struct Aggregate {
    /// Deduplicated addresses from all successful targets.
    pub addresses: AddressSet,
    /// Targets that failed, in configuration order.
    pub failures: Vec<TargetFailure>,
}

/// Resolves every target in order and merges the results.
///
/// A failing target is recorded and skipped; it never drops addresses
/// collected from the other targets.
pub async fn aggregate<C>(client: &C, targets: &[SyncTarget]) -> Aggregate
where
    C: ClusterClient + ?Sized,
{
    let mut collected = Vec::new();
    let mut failures = Vec::new();

    for target in targets {
        match resolve(client, target).await {
            Ok(addrs) => collected.extend(addrs),
            Err(error) => failures.push(TargetFailure {
                cluster: target.cluster.name.clone(),
                namespace: target.namespace.clone(),
                services: target
                    .service_names()
                    .into_iter()
                    .map(String::from)
                    .collect(),
                error,
            }),
        }
    }

    Aggregate {
        addresses: collected.into_iter().collect(),
        failures,
    }
}
