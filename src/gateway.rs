use crate::assets::StaticAssets;
use crate::error::is_addr_in_use;
use crate::forward::{match_proxy_path, UpstreamClient};
use crate::supervisor::{ServiceState, Supervisor};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The public-facing server: serves the frontend and forwards the reserved
/// prefix to the documentation service.
pub struct GatewayServer {
    bind_addr: SocketAddr,
    upstream: Arc<UpstreamClient>,
    assets: Arc<StaticAssets>,
    proxy_prefix: Arc<String>,
    supervisor: Option<Arc<Supervisor>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    pub fn new(
        bind_addr: SocketAddr,
        upstream: UpstreamClient,
        assets: StaticAssets,
        proxy_prefix: String,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_addr,
            upstream: Arc::new(upstream),
            assets: Arc::new(assets),
            proxy_prefix: Arc::new(proxy_prefix),
            supervisor: None,
            shutdown_rx,
        }
    }

    /// Attach the child supervisor so proxy failures can be attributed to a
    /// dead documentation service in the logs
    pub fn with_supervisor(mut self, supervisor: Arc<Supervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = match TcpListener::bind(self.bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                if is_addr_in_use(&e) {
                    error!(
                        addr = %self.bind_addr,
                        "Gateway port already in use, is another instance running?"
                    );
                } else {
                    error!(addr = %self.bind_addr, error = %e, "Failed to bind gateway port");
                }
                return Err(e.into());
            }
        };
        info!(addr = %self.bind_addr, "Gateway listening (HTTP/1.1 and HTTP/2)");

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let upstream = Arc::clone(&self.upstream);
                            let assets = Arc::clone(&self.assets);
                            let prefix = Arc::clone(&self.proxy_prefix);
                            let supervisor = self.supervisor.clone();

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, upstream, assets, prefix, supervisor).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Gateway shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection<S>(
    stream: S,
    _addr: SocketAddr,
    upstream: Arc<UpstreamClient>,
    assets: Arc<StaticAssets>,
    prefix: Arc<String>,
    supervisor: Option<Arc<Supervisor>>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let upstream = Arc::clone(&upstream);
        let assets = Arc::clone(&assets);
        let prefix = Arc::clone(&prefix);
        let supervisor = supervisor.clone();
        async move { handle_request(req, upstream, assets, prefix, supervisor).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

async fn handle_request(
    req: Request<Incoming>,
    upstream: Arc<UpstreamClient>,
    assets: Arc<StaticAssets>,
    prefix: Arc<String>,
    supervisor: Option<Arc<Supervisor>>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    // Request id is for log correlation only; forwarded headers stay untouched
    let request_id = Uuid::new_v4().to_string();
    debug!(method = %req.method(), uri = %req.uri(), request_id, "Incoming request");

    if let Some(remainder) = match_proxy_path(req.uri(), &prefix) {
        let remainder = remainder.to_string();

        // The proxy stays permissive even when the child is gone; the failed
        // connect below turns into the fixed 500. Name the real cause here.
        if let Some(supervisor) = &supervisor {
            if let ServiceState::Exited(code) = supervisor.state() {
                warn!(request_id, ?code, "Proxying while the documentation service has exited");
            }
        }

        return Ok(upstream.forward(req, &remainder, &request_id).await);
    }

    Ok(assets.respond(req.uri().path()).await)
}
