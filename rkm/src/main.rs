mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Commands};
use libvolume::Volume;
use rkm::config::load_config;
use rkm::{MountSource, VolumeDaemon, VolumeProxy, status};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Start { config } => start(&config).await,
        Commands::Validate { config } => validate(&config).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn start(path: &Path) -> Result<()> {
    let cfg = load_config(path)?;
    info!("Loaded config from {}", path.display());

    let daemon = VolumeDaemon::new(
        cfg.daemon_options(),
        Arc::new(cfg.mount_source()),
        cfg.volume_context(),
    );

    let token = daemon.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });

    if let Some(addr) = cfg.status_addr.clone() {
        let status_daemon = daemon.clone();
        let token = daemon.shutdown_token();
        tokio::spawn(async move {
            if let Err(e) = status::serve(&addr, status_daemon, token).await {
                error!("{e:#}");
            }
        });
    }

    let handle = daemon.start().await;
    handle.await.context("Reconcile loop aborted")?;
    info!("rkm stopped");
    Ok(())
}

async fn validate(path: &Path) -> Result<()> {
    let cfg = load_config(path)?;
    let groups = cfg.mount_source().load().await?;
    if groups.is_empty() {
        bail!("{} defines no mount groups", cfg.mounts_file.display());
    }

    let ctx = cfg.volume_context();
    for group in &groups {
        let proxy = VolumeProxy::new(group, &ctx)?;
        println!(
            "{} (node {}, default {})",
            proxy.name(),
            proxy.node(),
            proxy.default_volume().server()
        );
        for volume in proxy.volumes() {
            println!("  {} {} -> {}", volume.fs_type(), volume.server(), volume.mount_target());
        }
    }
    println!("{} mount groups OK", groups.len());
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down...");
}
