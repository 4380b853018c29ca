//! Entry point for the documentation service
//!
//! Normally spawned by the gateway; runs standalone the same way. The
//! Notion API token is required configuration with no default: startup
//! fails fast when it is absent.

use fleetgate::docs::DocsServer;
use fleetgate::notion::NotionClient;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::{error, info};

const DEFAULT_PORT: u16 = 3001;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fleetgate=debug".parse().expect("valid log directive")),
        )
        .init();

    let token = std::env::var("NOTION_API_TOKEN").map_err(|_| {
        error!("NOTION_API_TOKEN is not set");
        anyhow::anyhow!("NOTION_API_TOKEN is required, refusing to start without it")
    })?;

    let port = std::env::var("DOCS_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let bind_addr: SocketAddr = format!("127.0.0.1:{}", port)
        .parse()
        .expect("valid loopback address");

    let client = NotionClient::new(&token)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = DocsServer::new(bind_addr, client, shutdown_rx);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "Documentation service error");
            std::process::exit(1);
        }
    });

    // The gateway stops us with SIGTERM; honor Ctrl+C for standalone runs
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }

    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), server_handle).await;

    info!("Shutdown complete");
    Ok(())
}
