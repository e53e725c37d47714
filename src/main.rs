use brutal_core::{ConfigSnapshot, ConfigStore, ServerConfig};
use brutal_transport::BrutalServer;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

/// HTTP front that switches every accepted connection to the brutal TCP
/// congestion control at the rate configured for its host and path.
#[derive(Debug, Parser)]
#[command(name = "tcp-brutal", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, default_value = "tcp-brutal.toml")]
    config: PathBuf,

    /// Validate the configuration, print the resolved policies and exit.
    #[arg(long)]
    check: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(&cli.config)?;
    let snapshot = ConfigSnapshot::build(&config)?;

    if cli.check {
        for row in snapshot.policies() {
            println!(
                "server {:<30} location {:<20} enabled={} rate={}",
                row.server,
                row.location.as_deref().unwrap_or("-"),
                row.policy.enabled,
                row.policy.rate
            );
        }
        println!("configuration {} is ok", cli.config.display());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads)
        .thread_name("brutal-worker")
        .enable_all()
        .build()?;

    runtime.block_on(serve(cli.config, config, snapshot))
}

async fn serve(path: PathBuf, config: ServerConfig, snapshot: ConfigSnapshot) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(ConfigStore::new(snapshot));
    let server = BrutalServer::bind(config.listen, store.clone())?;

    let mut hangup = signal(SignalKind::hangup())?;
    let reload_store = store.clone();
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match ServerConfig::load(&path) {
                Ok(next) => {
                    if next.listen != config.listen || next.threads != config.threads {
                        tracing::warn!("Reload: `listen`/`threads` changes need a restart, ignoring them");
                    }
                    if let Err(e) = reload_store.reload(&next) {
                        tracing::warn!("Reload rejected, keeping generation {}: {}", reload_store.generation(), e);
                    }
                }
                Err(e) => {
                    tracing::warn!("Reload rejected, keeping generation {}: {}", reload_store.generation(), e);
                }
            }
        }
    });

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}
