//! `storesd` daemon.
//!
//! Loads the configuration file, keeps it hot-reloaded, serves a liveness
//! endpoint on `srvAddr` (`GET /ping`), and runs the sync loop until SIGINT or
//! SIGTERM.
//!
//! # Environment Variables
//!
//! - `STORESD_CONFIG_PATH`: configuration file (default: hack/config-local.yaml)
//! - `STORESD_INTERVAL_SECS`: seconds between sync ticks (default: 5)
//! - `RUST_LOG`: log filter (default: info)

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use storesd::{ConfigHandle, KubeClusterClient, SyncConfig, SyncCoordinator, watch_config_file};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "storesd",
    about = "Sync Kubernetes endpoints from many clusters into a file-based discovery snapshot",
    version
)]
struct Cli {
    /// Configuration file (YAML or JSON).
    #[arg(long, env = "STORESD_CONFIG_PATH", default_value = "hack/config-local.yaml")]
    config_path: PathBuf,

    /// Seconds between sync ticks.
    #[arg(
        long,
        env = "STORESD_INTERVAL_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::load(&cli.config_path)?;
    let srv_addr: SocketAddr = config.srv_addr.parse()?;

    info!(
        targets = config.sync_targets.len(),
        "start sync to {}",
        config.output_file().display()
    );

    let handle = ConfigHandle::new(config);
    let _watcher = watch_config_file(&cli.config_path, handle.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let coordinator = SyncCoordinator::new(handle, KubeClusterClient::new())
        .interval(Duration::from_secs(cli.interval_secs));
    let sync = tokio::spawn(coordinator.run(stopped(shutdown_rx.clone())));

    let listener = tokio::net::TcpListener::bind(srv_addr).await?;
    info!("start http server listen on {srv_addr}");

    let liveness = Router::new().route("/ping", get(|| async {}));
    let server = tokio::spawn(async move {
        axum::serve(listener, liveness)
            .with_graceful_shutdown(stopped(shutdown_rx))
            .await
    });

    shutdown_signal().await;
    info!("received shutdown signal, exiting gracefully...");
    let _ = shutdown_tx.send(true);

    server.await??;
    sync.await?;

    Ok(())
}

/// Completes once `true` is sent on the shutdown channel or it closes.
fn stopped(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
