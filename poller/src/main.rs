use anyhow::Context;
use axum::{routing::get, Router};
use clap::Parser;
use poller::config::Config;
use poller::metrics;
use poller::poll::{LogSink, Poller};
use poller::session::Session;
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting CoreIoT telemetry poller");
    info!("Host: {}", config.host);
    info!("Device: {}, keys: {}", config.device_id, config.keys);

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Shutting down");
}

async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    metrics::init_metrics().context("Failed to register metrics")?;
    if let Some(addr) = config.metrics_addr {
        serve_metrics(addr).await?;
    }

    let session = Session::new(config.host.as_str(), config.request_timeout())?;
    let mut poller = Poller::new(session, config.poll_settings(), LogSink);

    poller.run(shutdown_signal()).await?;
    Ok(())
}

async fn serve_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics endpoint to {}", addr))?;

    info!("Metrics endpoint listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
