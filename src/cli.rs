use crate::adapter::external::NoCredentials;
use crate::config::RuntimeConfig;
use crate::health::HealthMonitor;
use crate::http::{router, AppState};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "tcrif")]
#[command(about = "Tool Capability Registry and Invocation Fabric")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP control surface and health monitor.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// One-shot export of the current registry configuration document.
    Export {
        #[arg(long)]
        out: Option<std::path::PathBuf>,
    },
    /// Print the resolved configuration and confirm the config path is writable.
    Doctor,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { host, port } => serve(host, port).await,
        Commands::Export { out } => export(out).await,
        Commands::Doctor => doctor().await,
    }
}

async fn build_registry() -> Result<Arc<crate::registry::Registry>> {
    let config = RuntimeConfig::from_env();
    let registry = Arc::new(crate::registry::Registry::new(
        Some(config.config_path.clone()),
        Arc::new(NoCredentials),
    ));
    crate::startup::load_and_reimport(&registry, &config.config_path)
        .await
        .context("failed to reimport persisted registry configuration")?;
    crate::tools::register_builtin(&registry)
        .await
        .context("failed to register builtin local tools")?;
    Ok(registry)
}

async fn serve(host: String, port: u16) -> Result<()> {
    let config = RuntimeConfig::from_env();
    let registry = build_registry().await?;
    let health = Arc::new(HealthMonitor::new(registry.clone(), config.health_interval));
    health.start().await;

    let state = AppState {
        registry: registry.clone(),
        health: health.clone(),
    };
    let app = router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("tcrif listening on {addr}");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    health.stop().await;
    Ok(())
}

async fn export(out: Option<std::path::PathBuf>) -> Result<()> {
    let registry = build_registry().await?;
    let snapshot = registry.snapshot().await;
    let content = serde_json::to_string_pretty(&snapshot)?;
    match out {
        Some(path) => {
            std::fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

async fn doctor() -> Result<()> {
    let config = RuntimeConfig::from_env();
    println!("config path: {}", config.config_path.display());
    println!("health check interval: {}s", config.health_interval.as_secs());

    if let Some(parent) = config.config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("config directory {} is not writable", parent.display()))?;
    }
    println!("config path is writable");
    Ok(())
}
