use fleetgate::assets::StaticAssets;
use fleetgate::config::Config;
use fleetgate::forward::UpstreamClient;
use fleetgate::gateway::GatewayServer;
use fleetgate::supervisor::{spawn_docs_service, Supervisor};
use fleetgate::{PKG_NAME, VERSION};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fleetgate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration; an absent file means built-in defaults
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load_or_default(&config_path)
        .map_err(|e| {
            error!(path = %config_path.display(), error = %e, "Failed to load configuration");
            e
        })?
        .apply_env_overrides();

    print_startup_banner(&config, &config_path);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn the documentation service and take ownership of its lifecycle
    let handle = spawn_docs_service(&config.docs)?;
    let supervisor = Supervisor::start(handle, config.docs.shutdown_grace_period());

    // Public gateway server
    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .map_err(|e| {
            error!(bind = %config.server.bind, port = config.server.port, error = %e, "Invalid bind address");
            anyhow::anyhow!("Invalid bind address: {}", e)
        })?;

    let upstream = UpstreamClient::new(
        config.docs.upstream_base(),
        config.server.request_timeout(),
    );
    let assets = StaticAssets::new(&config.server.assets_dir, &config.server.index_file);

    let gateway = GatewayServer::new(
        bind_addr,
        upstream,
        assets,
        config.docs.proxy_prefix.clone(),
        shutdown_rx.clone(),
    )
    .with_supervisor(Arc::clone(&supervisor));

    let gateway_handle = tokio::spawn(async move {
        if let Err(e) = gateway.run().await {
            error!(error = %e, "Gateway server error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
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

    // Signal shutdown
    let _ = shutdown_tx.send(true);

    // Kill the child before our own exit so no orphan survives
    info!("Stopping documentation service...");
    supervisor.stop().await;

    // Wait for the server to stop (with timeout)
    let _ = tokio::time::timeout(Duration::from_secs(5), gateway_handle).await;

    info!("Shutdown complete");
    Ok(())
}

fn print_startup_banner(config: &Config, config_path: &std::path::Path) {
    info!(name = PKG_NAME, version = VERSION, "Starting gateway");
    info!(
        path = %config_path.display(),
        loaded = config_path.exists(),
        "Configuration source"
    );
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        assets_dir = %config.server.assets_dir,
        request_timeout_secs = config.server.request_timeout_secs,
        "Server configuration"
    );
    info!(
        command = %config.docs.command,
        port = config.docs.port,
        proxy_prefix = %config.docs.proxy_prefix,
        shutdown_grace_period_secs = config.docs.shutdown_grace_period_secs,
        "Documentation service configuration"
    );
}
