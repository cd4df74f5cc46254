// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use filecloud::{CloudService, Config, Server};
use std::sync::Arc;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    let level = config
        .log_level
        .parse::<Directive>()
        .with_context(|| format!("invalid log level: {}", config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::builder().with_default_directive(level).from_env_lossy())
        .init();

    tracing::info!("=");
    tracing::info!("FileCloud Starting Up...");
    tracing::info!("=");

    config.validate()?;
    let root = std::fs::canonicalize(config.root_dir()?)
        .context("failed to resolve scan root")?;
    let addr = config.addr()?;
    tracing::info!("Scan directory: {}", root.display());

    // ========== INITIALIZE SERVICE ==========
    let (service, events) = CloudService::new(&config);
    let pump = tokio::spawn(Arc::clone(&service).run_events(events));
    tracing::info!("✓ Index store ready");

    // ========== START INDEXER (Scan + Watch) ==========
    let indexer = service.start_indexing(&root)?;
    tracing::info!("✓ Indexer (scan + watch) started");

    // ========== SERVE ==========
    let server = Server::bind(addr, Arc::clone(&service)).await?;
    tracing::info!("=");
    tracing::info!("Server running on http://{}", server.local_addr());
    tracing::info!("=");

    server
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    tracing::info!("FileCloud shutting down...");
    indexer.stop().await;
    pump.abort();
    Ok(())
}
