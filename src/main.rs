//! Reseedwatch - Reseed Server Status Monitor
//!
//! Receives probe reports from external reseed checkers, tracks offline
//! durations, alerts operators, and answers status and proxy-check queries.

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use reseedwatch::{app::App, cli::Cli, config::Config};
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment,
    // and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        // Manually initialize logger for this specific error
        env_logger::init();
        error!("Failed to load configuration: {}", err);
        // Exit if configuration fails, as it's a critical step.
        std::process::exit(1);
    });

    // Initialize logging. The fmt subscriber also collects `log` records.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Reseedwatch starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Listen Address: {}", config.http.listen_addr);
    info!(
        "Ingestion Auth: {}",
        if config.auth.api_token.is_some() {
            "Enabled"
        } else {
            "Disabled (all writes rejected)"
        }
    );
    info!(
        "Offline Threshold: {}h",
        config.monitoring.offline_threshold_hours
    );
    info!(
        "Notification Cooldown: {}h",
        config.monitoring.notification_cooldown_hours
    );
    info!(
        "Always-Online Anchors: {}",
        if config.monitoring.always_online.is_empty() {
            "None".to_string()
        } else {
            config.monitoring.always_online.join(", ")
        }
    );
    info!(
        "Mail API: {}",
        if config.notification.api_key.is_some() {
            config.notification.api_url.as_str()
        } else {
            "Not configured"
        }
    );
    if let Some(path) = &config.proxy.table_path {
        info!("Proxy Table: {}", path.display());
    } else {
        info!("Proxy Table: Not configured");
    }
    if config.proxy.debug {
        info!("Proxy Debug: Enabled");
    }
    if let Some(dir) = &config.artifacts.directory {
        info!("Artifact Directory: {}", dir.display());
    } else {
        info!("Artifact Directory: Not configured");
    }
    info!("-------------------------------------------------------");

    let listen_addr = config.http.listen_addr.clone();
    let app = App::builder(config).build()?;
    let listener = TcpListener::bind(&listen_addr).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(app.serve(listener, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Shutting down gracefully...");
    shutdown_tx.send(true).ok();

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server error: {}", e),
        Err(e) => error!("Server task panicked: {:?}", e),
    }

    info!("Exiting.");
    Ok(())
}
