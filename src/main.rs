//! hybridroute HTTP server
//!
//! Starts an Axum web server embedding one routing session.

use clap::Parser;
use hybridroute::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    models::{DetachedRunner, LoadProgress, LocalModelRunner, LocalServerRunner, ProgressCallback},
    shared::{HttpTransport, ReqwestTransport},
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Connect timeout shared by every outbound request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Cli { config, command } = Cli::parse();

    match command.unwrap_or(Command::Serve) {
        Command::Config { output } => write_template(output.as_deref()),
        Command::Probe => probe(&config).await,
        Command::Serve => serve(&config).await,
    }
}

fn write_template(output: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            std::fs::write(path, generate_config_template())?;
            eprintln!("Wrote configuration template to {path}");
        }
        None => print!("{}", generate_config_template()),
    }
    Ok(())
}

/// Load config, then build the shared transport, local runner and app state
async fn build_state(config_path: &str) -> Result<AppState, Box<dyn std::error::Error>> {
    let config = Arc::new(Config::from_file(config_path)?);
    telemetry::init(&config.observability.log_level);

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(CONNECT_TIMEOUT)?);
    let runner: Arc<dyn LocalModelRunner> = match &config.local.base_url {
        Some(base_url) => Arc::new(LocalServerRunner::new(base_url.as_str(), transport.clone())),
        None => Arc::new(DetachedRunner),
    };

    if config.local.base_url.is_some() && config.local.load_on_startup {
        let log_progress: &ProgressCallback = &|p: &LoadProgress| {
            tracing::info!(progress = p.progress, text = %p.text, "Local model loading");
        };
        // A missing local model only disables the Browser tier
        if let Err(e) = runner.load(&config.local.model, Some(log_progress)).await {
            tracing::warn!(
                model = %config.local.model,
                error = %e,
                "Local model unavailable, Browser tier disabled"
            );
        }
    }

    Ok(AppState::new(config, transport, runner)?)
}

async fn probe(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(config_path).await?;
    let availability = state.refresh_availability().await;
    println!("{}", serde_json::to_string_pretty(&availability)?);
    Ok(())
}

async fn serve(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(config_path).await?;
    let config = state.config().clone();

    tracing::info!(
        "Starting hybridroute server on {}:{}",
        config.server.host,
        config.server.port
    );

    if config.availability.probe_on_startup {
        let availability = state.refresh_availability().await;
        tracing::info!(availability = ?availability, "Initial availability probe completed");
    }

    if config.availability.probe_interval_seconds > 0 {
        spawn_probe_loop(
            state.clone(),
            Duration::from_secs(config.availability.probe_interval_seconds),
        );
    }

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([127, 0, 0, 1])),
        config.server.port,
    ));

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, handlers::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Re-probe availability on a fixed period
///
/// The router never probes on its own; this loop is the server's choice.
fn spawn_probe_loop(state: AppState, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately; startup already probed
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let availability = state.refresh_availability().await;
            tracing::debug!(availability = ?availability, "Periodic availability probe");
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
