// dashgate - Session-gated, offline-capable gateway for the case management dashboard
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use clap::Parser;
use dashgate::cli::Args;
use dashgate::config::AppConfig;
use dashgate::guard::{AuthBackendClient, RouteGuard, RoutePolicy};
use dashgate::offline::{UpstreamClient, WorkerHost};
use dashgate::server::create_router;
use dashgate::utils::logging;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    args.apply(&mut config);
    config.validate()?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting dashgate v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: AppConfig) -> Result<()> {
    // Phase 3: Route guard against the hosted backend
    let backend = AuthBackendClient::new(&config.backend)?;
    let guard = RouteGuard::new(
        RoutePolicy::from_config(&config.guard),
        backend.clone(),
        backend,
    );

    // Phase 4: Offline worker in front of the dashboard origin
    let upstream = UpstreamClient::new(&config.upstream, config.performance.connection_pool_size)?;
    let host = Arc::new(WorkerHost::new(&config.offline, upstream));

    if config.offline.precache_on_start {
        info!("Installing cache generation {}", config.offline.cache_name);
        if let Err(e) = host.register(&config.offline.cache_name).await {
            // Keep serving from the network; /sw/register can retry later.
            warn!("Initial install failed: {}", e);
        }
    }

    // Phase 5: Build and start HTTP server
    let app = create_router(config.clone(), host, guard)?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 6: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
