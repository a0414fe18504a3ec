mod cli;
mod config;
mod error;
mod handlers;
mod k8s;
mod model;
mod routes;
#[cfg(test)]
mod testing;
mod view;

use anyhow::{Context, Result};
use clap::Parser;
use cli::CliArgs;
use config::ServerConfig;
use handlers::AppState;
use k8s::KubeConnector;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use view::ViewRenderer;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter)?;

    let config = ServerConfig::resolve(&args)?;
    if let Some(source) = &config.source {
        info!(source = %source, "loaded settings file");
    }
    if !config.kubeconfig.exists() {
        warn!(
            kubeconfig = %config.kubeconfig.display(),
            "kubeconfig does not exist yet, requests will fail until it does"
        );
    }

    let views = ViewRenderer::load(&config.views_dir)
        .with_context(|| format!("failed to load views from {}", config.views_dir.display()))?;

    let connector = KubeConnector::new(
        config.kubeconfig.clone(),
        config.context.clone(),
        config.namespace.clone(),
        config.remote_timeout,
    );
    let state = AppState::new(
        Arc::new(connector),
        Arc::new(views),
        config.handler_settings(),
    );
    let app = routes::router(state, &config.views_dir, &config.assets_dir);

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!(
        listen = %config.listen,
        namespace = %config.namespace,
        kubeconfig = %config.kubeconfig.display(),
        "tfconsole listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("tfconsole stopped");
    Ok(())
}

fn init_tracing(level_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {error}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
