mod auth;
mod cache;
mod config;
mod handlers;
mod mcp;
mod models;
mod query;
mod router;
mod slice;
mod testbed;
mod tools;
mod utils;

use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use cache::{CacheRefresher, ResourceCache};
use config::{Config, Transport};
use testbed::{OrchestratorClient, Testbed};
use tools::ToolContext;

/// Application state shared across handlers
pub struct AppState {
    pub tools: ToolContext,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load();
    init_tracing(&cfg);

    tracing::info!("Starting fabric-mcp v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Orchestrator: {}", cfg.orchestrator_url);
    tracing::info!("Transport: {}", cfg.transport.as_str());
    if cfg.local_mode {
        tracing::info!("Local mode enabled");
    }

    let testbed: Arc<dyn Testbed> = Arc::new(OrchestratorClient::new(
        &cfg.orchestrator_url,
        cfg.http_timeout_secs,
    )?);

    // Background topology cache, shared by both transports
    let cache = ResourceCache::new();
    tracing::info!(
        "Starting background cache refresher (interval={}s, max_fetch={})",
        cfg.refresh_interval_secs,
        cfg.cache_max_fetch
    );
    let mut refresher = CacheRefresher::new(
        cache.clone(),
        testbed.clone(),
        cfg.refresh_interval_secs,
        cfg.cache_max_fetch,
    );
    refresher.start();

    let tools = ToolContext::new(testbed, cache, cfg.clone());

    match cfg.transport {
        Transport::Stdio => {
            tracing::info!("MCP server ready, listening on stdio");
            tokio::select! {
                res = mcp::stdio::run_stdio(&tools, auth::Caller::default()) => res?,
                _ = shutdown_signal() => {},
            }
        }
        Transport::Http => {
            let state = Arc::new(AppState { tools });
            let app = router::build(state);

            let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
            tracing::info!("fabric-mcp listening on {}", cfg.listen_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    refresher.stop();
    tracing::info!("fabric-mcp shutting down");
    Ok(())
}

/// Logs go to stderr so they never mix with stdio JSON-RPC traffic
fn init_tracing(cfg: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fabric_mcp=info,tower_http=info".into());

    let fmt_layer = if cfg.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
}
