//! Kubernetes endpoint lookup for sync targets.
//!
//! This module resolves one [`SyncTarget`] into endpoint addresses by reading
//! the core/v1 `Endpoints` object of each configured service from the target's
//! cluster.
//!
//! # How It Works
//!
//! 1. Looks up the `Endpoints` object named after each service in the target's namespace
//! 2. Keeps the subset ports whose name equals the configured port name exactly
//! 3. Emits `ip:port` for every ready address of a subset with a matching port
//! 4. Fails the whole target if any lookup fails, discarding partial results
//!
//! Cluster access goes through the [`ClusterClient`] trait. [`KubeClusterClient`]
//! is the `kube`-backed implementation used in production.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Endpoints;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};

use crate::address::Address;
use crate::config::{ClusterRef, SyncTarget};
use crate::error::{BoxError, ResolveError};

/// Result type for cluster client operations.
pub type Result<T> = std::result::Result<T, BoxError>;

/// Read access to endpoint objects in one or more clusters.
pub trait ClusterClient: Send + Sync {
    /// Fetches the `Endpoints` object for `service` in `namespace` of `cluster`.
    fn endpoints<'a>(
        &'a self,
        cluster: &'a ClusterRef,
        namespace: &'a str,
        service: &'a str,
    ) -> BoxFuture<'a, Result<Endpoints>>;

    /// Releases any per-cluster resources held for clusters not in `clusters`.
    ///
    /// Called with the clusters of the current configuration before each tick.
    fn retain_clusters(&self, clusters: &[&ClusterRef]) {
        let _ = clusters;
    }
}

impl<T: ClusterClient + ?Sized> ClusterClient for Arc<T> {
    fn endpoints<'a>(
        &'a self,
        cluster: &'a ClusterRef,
        namespace: &'a str,
        service: &'a str,
    ) -> BoxFuture<'a, Result<Endpoints>> {
        (**self).endpoints(cluster, namespace, service)
    }

    fn retain_clusters(&self, clusters: &[&ClusterRef]) {
        (**self).retain_clusters(clusters);
    }
}

/// [`ClusterClient`] backed by `kube`.
///
/// One `kube::Client` is built per distinct [`ClusterRef`] and reused for
/// subsequent lookups while the kubeconfig it was built from is unchanged.
/// The kubeconfig is re-read on every lookup; edited contents (rotated
/// credentials, a new server or namespace) rebuild the client.
///
/// # Requirements
///
/// - RBAC permission to `get` `endpoints` in every configured namespace
/// - A kubeconfig file per target; without one, the default kubeconfig
///   (`KUBECONFIG` or `~/.kube/config`) when a context is named, otherwise
///   in-cluster or default configuration
#[derive(Default)]
pub struct KubeClusterClient {
    clients: Mutex<HashMap<ClusterRef, CachedClient>>,
}

struct CachedClient {
    // Kubeconfig contents the client was built from; `None` when inferred
    kubeconfig: Option<String>,
    client: Client,
}

impl KubeClusterClient {
    /// Creates a client with an empty connection cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn client_for(&self, cluster: &ClusterRef) -> Result<Client> {
        let (source, kubeconfig) = read_kubeconfig(cluster)?.unzip();

        let cached = self
            .clients
            .lock()
            .map_err(|_| "cluster client cache poisoned")?
            .get(cluster)
            .filter(|cached| cached.kubeconfig == source)
            .map(|cached| cached.client.clone());
        if let Some(client) = cached {
            return Ok(client);
        }

        let options = KubeConfigOptions {
            context: cluster.context.clone(),
            ..KubeConfigOptions::default()
        };
        let config = match kubeconfig {
            Some(kubeconfig) => Config::from_custom_kubeconfig(kubeconfig, &options).await?,
            None => Config::infer().await?,
        };

        let client = Client::try_from(config)?;
        tracing::debug!("built Kubernetes client for cluster {}", cluster.name);

        self.clients
            .lock()
            .map_err(|_| "cluster client cache poisoned")?
            .insert(
                cluster.clone(),
                CachedClient {
                    kubeconfig: source,
                    client: client.clone(),
                },
            );

        Ok(client)
    }
}

/// Reads the kubeconfig a cluster is reached through, with the text used to
/// detect edits. Returns `None` when the configuration is inferred.
fn read_kubeconfig(cluster: &ClusterRef) -> Result<Option<(String, Kubeconfig)>> {
    match (&cluster.kube_config_path, &cluster.context) {
        (Some(path), _) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("read kubeconfig {}: {e}", path.display()))?;
            let kubeconfig = Kubeconfig::from_yaml(&text)?;
            Ok(Some((text, kubeconfig)))
        }
        (None, Some(_)) => {
            let kubeconfig = Kubeconfig::read()?;
            let text = serde_yaml::to_string(&kubeconfig)?;
            Ok(Some((text, kubeconfig)))
        }
        (None, None) => Ok(None),
    }
}

impl ClusterClient for KubeClusterClient {
    fn endpoints<'a>(
        &'a self,
        cluster: &'a ClusterRef,
        namespace: &'a str,
        service: &'a str,
    ) -> BoxFuture<'a, Result<Endpoints>> {
        async move {
            let client = self.client_for(cluster).await?;
            let api: Api<Endpoints> = Api::namespaced(client, namespace);
            Ok(api.get(service).await?)
        }
        .boxed()
    }

    fn retain_clusters(&self, clusters: &[&ClusterRef]) {
        let Ok(mut clients) = self.clients.lock() else {
            return;
        };

        let before = clients.len();
        clients.retain(|cluster, _| clusters.contains(&cluster));

        if clients.len() < before {
            tracing::debug!("dropped {} unused Kubernetes clients", before - clients.len());
        }
    }
}

/// Resolves one target into its endpoint addresses.
///
/// Lookups run in the target's service order. The first failing lookup fails
/// the whole target; addresses gathered from earlier services are discarded.
/// No retries happen here.
///
/// # Errors
///
/// Returns [`ResolveError`] naming the service whose lookup failed.
pub async fn resolve<C>(
    client: &C,
    target: &SyncTarget,
) -> std::result::Result<Vec<Address>, ResolveError>
where
    C: ClusterClient + ?Sized,
{
    let mut addrs = Vec::new();

    for pair in &target.services {
        let endpoints = client
            .endpoints(&target.cluster, &target.namespace, &pair.service)
            .await
            .map_err(|source| ResolveError {
                cluster: target.cluster.name.clone(),
                namespace: target.namespace.clone(),
                service: pair.service.clone(),
                source,
            })?;

        addrs.extend(extract_addresses(&endpoints, &pair.port_name));
    }

    tracing::debug!(
        "resolved {} addresses for {}/{}",
        addrs.len(),
        target.cluster.name,
        target.namespace
    );

    Ok(addrs)
}

/// Extracts `ip:port` addresses for the named port from an `Endpoints` object.
///
/// Only ready addresses count; `notReadyAddresses` are ignored. A port without
/// a name matches only an empty `port_name`.
fn extract_addresses(endpoints: &Endpoints, port_name: &str) -> Vec<Address> {
    let mut addrs = Vec::new();

    for subset in endpoints.subsets.iter().flatten() {
        let ports = subset.ports.iter().flatten();

        for port in ports.filter(|p| p.name.as_deref().unwrap_or_default() == port_name) {
            for addr in subset.addresses.iter().flatten() {
                addrs.push(Address::new(&addr.ip, port.port));
            }
        }
    }

    addrs
}
