use airline_etl::config::AppConfig;
use airline_etl::http::app_server::AppServer;
use airline_etl::telemetry::{init_telemetry, shutdown_telemetry};
use airline_etl::EtlEngine;
use anyhow::Result;
use clap::Parser;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "etl-server", about = "Airline ETL HTTP Server")]
struct Cli {
    /// Path to config file. Environment variables (ETL_*) apply either way.
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let now = Instant::now();
    init_telemetry().map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let cli = Cli::parse();

    tracing::info!("Starting Airline ETL HTTP Server");

    // Load configuration
    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;

    match &cli.config {
        Some(path) => tracing::info!("Configuration '{}' loaded successfully", path),
        None => tracing::info!("Configuration loaded from environment"),
    }

    // Initialize engine from config
    let engine = EtlEngine::from_config(&config).await?;

    tracing::info!("Engine initialized");

    // Create router
    let app = AppServer::new(engine, &config.server)?;
    let engine = app.engine.clone();

    // Create server address
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server started in {}ms", now.elapsed().as_millis());
    tracing::info!("Server listening on {}", addr);

    // Start server
    let server = axum::serve(listener, app.router).with_graceful_shutdown(shutdown());

    server.await?;

    // Close the warehouse pool before exiting
    engine.shutdown().await;
    shutdown_telemetry();

    tracing::info!("Server shutdown complete");

    Ok(())
}

async fn shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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

    tracing::info!("Shutdown signal received, stopping server...");
}
