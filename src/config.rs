//! Sync configuration and the providers the coordinator reads it from.
//!
//! The configuration is a YAML document (JSON works too) with camelCase keys:
//!
//! ```yaml
//! outputPath: /etc/prometheus/sd
//! srvAddr: 0.0.0.0:8080
//! syncTargets:
//!   - kubeConfigPath: /etc/kube/cluster-a.yaml
//!     context: prod-a
//!     cluster: cluster-a
//!     namespace: monitoring
//!     services:
//!       - service: thanos-store
//!         portName: grpc
//! ```
//!
//! The coordinator asks a [`ConfigProvider`] for the current value once per
//! tick. [`ConfigHandle`] is a single-slot holder that always yields the latest
//! version; [`watch_config_file`] keeps one up to date as the file changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::error::ConfigError;

/// Name of the published file inside `outputPath`.
pub const OUTPUT_FILE_NAME: &str = "stores.yaml";

const DEFAULT_SRV_ADDR: &str = "0.0.0.0:8080";

/// Credentials used to reach one cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRef {
    /// Kubeconfig file. When absent, the default kubeconfig is used if a
    /// context is named, otherwise the environment's default configuration
    /// (in-cluster service account or `KUBECONFIG`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_config_path: Option<PathBuf>,

    /// Kubeconfig context to use instead of the file's current context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Human-readable cluster label, used in logs and errors.
    #[serde(default, rename = "cluster")]
    pub name: String,
}

/// A service and the named endpoint port to publish for it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    /// Service name; its `Endpoints` object has the same name.
    pub service: String,

    /// Endpoint port name, matched exactly. Empty matches only unnamed ports.
    #[serde(default)]
    pub port_name: String,
}

impl ServicePort {
    /// Creates a service/port pair.
    #[must_use]
    pub fn new(service: impl Into<String>, port_name: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            port_name: port_name.into(),
        }
    }
}

/// One cluster's sync request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTarget {
    /// Cluster to query.
    #[serde(flatten)]
    pub cluster: ClusterRef,

    /// Namespace holding the services.
    pub namespace: String,

    /// Service/port pairs to resolve.
    #[serde(default)]
    pub services: Vec<ServicePort>,
}

impl SyncTarget {
    /// Creates a target for a cluster label and namespace using the default
    /// client configuration.
    #[must_use]
    pub fn new(cluster: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            cluster: ClusterRef {
                name: cluster.into(),
                ..ClusterRef::default()
            },
            namespace: namespace.into(),
            services: Vec::new(),
        }
    }

    /// Adds a service/port pair.
    #[must_use]
    pub fn service(mut self, service: impl Into<String>, port_name: impl Into<String>) -> Self {
        self.services.push(ServicePort::new(service, port_name));
        self
    }

    /// Sets the kubeconfig file used to reach the cluster.
    #[must_use]
    pub fn kube_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cluster.kube_config_path = Some(path.into());
        self
    }

    /// Sets the kubeconfig context used to reach the cluster.
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.cluster.context = Some(context.into());
        self
    }

    /// Service names, for logging.
    #[must_use]
    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|sp| sp.service.as_str()).collect()
    }
}

/// Full sync configuration, read atomically at the start of each tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Directory the snapshot is published into.
    pub output_path: PathBuf,

    /// Liveness listener address.
    #[serde(default = "default_srv_addr")]
    pub srv_addr: String,

    /// Targets, resolved in order.
    #[serde(default)]
    pub sync_targets: Vec<SyncTarget>,
}

fn default_srv_addr() -> String {
    DEFAULT_SRV_ADDR.to_string()
}

impl SyncConfig {
    /// Creates a configuration publishing into `output_path` with no targets.
    #[must_use]
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            srv_addr: default_srv_addr(),
            sync_targets: Vec::new(),
        }
    }

    /// Appends a target.
    #[must_use]
    pub fn target(mut self, target: SyncTarget) -> Self {
        self.sync_targets.push(target);
        self
    }

    /// Path of the published snapshot file.
    #[must_use]
    pub fn output_file(&self) -> PathBuf {
        self.output_path.join(OUTPUT_FILE_NAME)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can drive a sync cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("outputPath is empty".to_string()));
        }

        for (i, target) in self.sync_targets.iter().enumerate() {
            if target.namespace.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "syncTargets[{i}] ({}): namespace is empty",
                    target.cluster.name
                )));
            }

            if target.services.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "syncTargets[{i}] ({}): no services",
                    target.cluster.name
                )));
            }

            if target.services.iter().any(|sp| sp.service.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "syncTargets[{i}] ({}): empty service name",
                    target.cluster.name
                )));
            }
        }

        Ok(())
    }
}

/// Source of the configuration used by each tick.
pub trait ConfigProvider: Send + Sync {
    /// Returns the current configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when no usable configuration is available; the
    /// coordinator skips that tick.
    fn current(&self) -> Result<Arc<SyncConfig>, ConfigError>;
}

/// Single-slot holder for the latest configuration.
///
/// Writers replace the value; readers always get the newest version without
/// blocking. Clones share the same slot.
#[derive(Clone, Debug)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<SyncConfig>>>,
}

impl ConfigHandle {
    /// Creates a handle holding `config`.
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        let (tx, _) = watch::channel(Arc::new(config));
        Self { tx: Arc::new(tx) }
    }

    /// Returns the latest configuration.
    #[must_use]
    pub fn latest(&self) -> Arc<SyncConfig> {
        self.tx.borrow().clone()
    }

    /// Replaces the configuration. Returns `false` if it was unchanged.
    #[must_use = "a `false` return means the value was already current"]
    pub fn replace(&self, config: SyncConfig) -> bool {
        self.tx.send_if_modified(|current| {
            if **current == config {
                false
            } else {
                *current = Arc::new(config);
                true
            }
        })
    }

    /// Subscribes to configuration changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<SyncConfig>> {
        self.tx.subscribe()
    }

    /// Reloads the configuration from `path`.
    ///
    /// Returns whether the stored configuration changed. On error the previous
    /// configuration stays in place.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be loaded.
    pub fn reload(&self, path: &Path) -> Result<bool, ConfigError> {
        let config = SyncConfig::load(path)?;
        Ok(self.replace(config))
    }
}

impl ConfigProvider for ConfigHandle {
    fn current(&self) -> Result<Arc<SyncConfig>, ConfigError> {
        Ok(self.latest())
    }
}

/// Provider that re-reads a configuration file on every call.
#[derive(Clone, Debug)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    /// Creates a provider reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for FileConfigSource {
    fn current(&self) -> Result<Arc<SyncConfig>, ConfigError> {
        SyncConfig::load(&self.path).map(Arc::new)
    }
}

/// Watches a configuration file and reloads it into `handle` on change.
///
/// The file's directory is watched rather than the file itself so that
/// replace-by-rename updates (editors, mounted `ConfigMap`s) are seen. Invalid
/// versions are logged and ignored. Reloading stops when the returned watcher
/// is dropped.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`ConfigError::Watch`] if the watcher cannot be created.
pub fn watch_config_file(
    path: impl Into<PathBuf>,
    handle: ConfigHandle,
) -> Result<RecommendedWatcher, ConfigError> {
    let path = path.into();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let watch_err = |source| ConfigError::Watch {
        path: path.clone(),
        source,
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })
    .map_err(watch_err)?;
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(watch_err)?;

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "config watcher event error");
                    continue;
                }
            };

            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                continue;
            }

            match handle.reload(&path) {
                Ok(true) => {
                    let config = handle.latest();
                    tracing::info!(
                        targets = config.sync_targets.len(),
                        output = %config.output_file().display(),
                        "config updated"
                    );
                }
                Ok(false) => {}
                Err(e) => tracing::error!("config reload failed, keeping previous: {e}"),
            }
        }

        tracing::debug!("config watcher stopped for {}", path.display());
    });

    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
outputPath: /tmp/sd
srvAddr: 127.0.0.1:9000
syncTargets:
  - kubeConfigPath: /etc/kube/a.yaml
    context: prod-a
    cluster: cluster-a
    namespace: monitoring
    services:
      - service: thanos-store
        portName: grpc
      - service: thanos-sidecar
        portName: grpc
  - cluster: cluster-b
    namespace: ns1
    services:
      - service: foo
        portName: http
";

    #[test]
    fn parses_camel_case_document() {
        let config: SyncConfig = serde_yaml::from_str(SAMPLE).unwrap();

        assert_eq!(config.output_path, PathBuf::from("/tmp/sd"));
        assert_eq!(config.srv_addr, "127.0.0.1:9000");
        assert_eq!(config.sync_targets.len(), 2);

        let first = &config.sync_targets[0];
        assert_eq!(
            first.cluster.kube_config_path,
            Some(PathBuf::from("/etc/kube/a.yaml"))
        );
        assert_eq!(first.cluster.context.as_deref(), Some("prod-a"));
        assert_eq!(first.cluster.name, "cluster-a");
        assert_eq!(first.namespace, "monitoring");
        assert_eq!(
            first.services,
            vec![
                ServicePort::new("thanos-store", "grpc"),
                ServicePort::new("thanos-sidecar", "grpc"),
            ]
        );

        let second = &config.sync_targets[1];
        assert!(second.cluster.kube_config_path.is_none());
        assert_eq!(second, &SyncTarget::new("cluster-b", "ns1").service("foo", "http"));
    }

    #[test]
    fn srv_addr_defaults() {
        let config: SyncConfig = serde_yaml::from_str("outputPath: /tmp/sd\n").unwrap();

        assert_eq!(config.srv_addr, DEFAULT_SRV_ADDR);
        assert!(config.sync_targets.is_empty());
    }

    #[test]
    fn json_is_accepted() {
        let json = r#"{"outputPath": "/tmp/sd", "syncTargets": [{"cluster": "a", "namespace": "ns", "services": [{"service": "s", "portName": "p"}]}]}"#;
        let config: SyncConfig = serde_yaml::from_str(json).unwrap();

        assert_eq!(config.sync_targets[0], SyncTarget::new("a", "ns").service("s", "p"));
    }

    #[test]
    fn output_file_is_inside_output_path() {
        let config = SyncConfig::new("/tmp/sd");
        assert_eq!(config.output_file(), PathBuf::from("/tmp/sd/stores.yaml"));
    }

    #[test]
    fn validate_rejects_empty_output_path() {
        let config = SyncConfig::new("");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_empty_namespace() {
        let config = SyncConfig::new("/tmp/sd").target(SyncTarget::new("a", "").service("s", "p"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_target_without_services() {
        let config = SyncConfig::new("/tmp/sd").target(SyncTarget::new("a", "ns"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_empty_service_name() {
        let config = SyncConfig::new("/tmp/sd").target(SyncTarget::new("a", "ns").service("", "p"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_allows_unnamed_port() {
        let config =
            SyncConfig::new("/tmp/sd").target(SyncTarget::new("a", "ns").service("s", ""));
        assert!(config.validate().is_ok());

        let parsed: SyncConfig = serde_yaml::from_str(
            "outputPath: /tmp/sd\nsyncTargets:\n  - namespace: ns\n    services:\n      - service: s\n",
        )
        .unwrap();
        assert_eq!(parsed.sync_targets[0].services[0].port_name, "");
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyncConfig::load(&dir.path().join("missing.yaml")).unwrap_err();

        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_reports_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "syncTargets: [unterminated").unwrap();

        let err = SyncConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn handle_replace_reports_changes_only() {
        let handle = ConfigHandle::new(SyncConfig::new("/tmp/a"));

        assert!(!handle.replace(SyncConfig::new("/tmp/a")));
        assert!(handle.replace(SyncConfig::new("/tmp/b")));
        assert_eq!(handle.latest().output_path, PathBuf::from("/tmp/b"));
    }

    #[test]
    fn handle_clones_share_the_slot() {
        let handle = ConfigHandle::new(SyncConfig::new("/tmp/a"));
        let reader = handle.clone();

        assert!(handle.replace(SyncConfig::new("/tmp/b")));

        assert_eq!(
            reader.current().unwrap().output_path,
            PathBuf::from("/tmp/b")
        );
    }

    #[test]
    fn handle_reload_keeps_previous_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "outputPath: ''\n").unwrap();

        let handle = ConfigHandle::new(SyncConfig::new("/tmp/a"));

        assert!(handle.reload(&path).is_err());
        assert_eq!(handle.latest().output_path, PathBuf::from("/tmp/a"));

        std::fs::write(&path, "outputPath: /tmp/c\n").unwrap();
        assert!(handle.reload(&path).unwrap());
        assert_eq!(handle.latest().output_path, PathBuf::from("/tmp/c"));
    }

    #[tokio::test]
    async fn subscribers_see_replacements() {
        let handle = ConfigHandle::new(SyncConfig::new("/tmp/a"));
        let mut rx = handle.subscribe();

        assert!(handle.replace(SyncConfig::new("/tmp/b")));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().output_path, PathBuf::from("/tmp/b"));
    }

    #[tokio::test]
    async fn watcher_reloads_changed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "outputPath: /tmp/a\n").unwrap();

        let handle = ConfigHandle::new(SyncConfig::load(&path).unwrap());
        let _watcher = watch_config_file(&path, handle.clone()).unwrap();

        std::fs::write(&path, "outputPath: /tmp/b\n").unwrap();

        let reloaded = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while handle.latest().output_path != Path::new("/tmp/b") {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        })
        .await;

        assert!(reloaded.is_ok());
    }

    #[test]
    fn file_source_reads_freshest_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let source = FileConfigSource::new(&path);

        assert!(source.current().is_err());

        std::fs::write(&path, "outputPath: /tmp/a\n").unwrap();
        assert_eq!(source.current().unwrap().output_path, PathBuf::from("/tmp/a"));

        std::fs::write(&path, "outputPath: /tmp/b\n").unwrap();
        assert_eq!(source.current().unwrap().output_path, PathBuf::from("/tmp/b"));
    }
}
