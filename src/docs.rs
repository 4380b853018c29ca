//! The documentation-service HTTP surface
//!
//! One read endpoint over loopback HTTP: given an opaque page identifier,
//! return the simplified `{ id, title, blocks }` document. Errors from the
//! content API are relayed as `{ "error": message }` with an ordinary HTTP
//! status.

use crate::error::{is_addr_in_use, NotionError};
use crate::notion::NotionClient;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Helper to create a simple response - infallible with valid StatusCode
fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum")
}

/// Helper to create a JSON response
fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum and static header")
}

fn json_error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": message }).to_string();
    json_response(status, body)
}

/// HTTP server wrapping the Notion client
pub struct DocsServer {
    bind_addr: SocketAddr,
    client: Arc<NotionClient>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DocsServer {
    pub fn new(
        bind_addr: SocketAddr,
        client: NotionClient,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_addr,
            client: Arc::new(client),
            shutdown_rx,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = match TcpListener::bind(self.bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                if is_addr_in_use(&e) {
                    error!(
                        addr = %self.bind_addr,
                        "Documentation service port already in use, is another instance running?"
                    );
                } else {
                    error!(addr = %self.bind_addr, error = %e, "Failed to bind documentation service port");
                }
                return Err(e.into());
            }
        };
        info!(addr = %self.bind_addr, "Documentation service listening");

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let client = Arc::clone(&self.client);
                            tokio::spawn(async move {
                                if let Err(e) = serve_docs_connection(stream, addr, client).await {
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
                        info!("Documentation service shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn serve_docs_connection<S>(
    stream: S,
    _addr: SocketAddr,
    client: Arc<NotionClient>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let client = Arc::clone(&client);
        async move { handle_docs_request(req, client).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

async fn handle_docs_request(
    req: Request<hyper::body::Incoming>,
    client: Arc<NotionClient>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    debug!(%method, %path, "Documentation service request");

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => response(StatusCode::OK, "ok"),

        (&Method::GET, path) if path.starts_with("/api/notion/page/") => {
            let page_id = path.trim_start_matches("/api/notion/page/");
            if page_id.is_empty() || page_id.contains('/') {
                json_error(StatusCode::BAD_REQUEST, "missing or invalid page id")
            } else {
                serve_page(&client, page_id).await
            }
        }

        _ => json_error(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(response)
}

async fn serve_page(client: &NotionClient, page_id: &str) -> Response<Full<Bytes>> {
    match client.page_document(page_id).await {
        Ok(document) => match serde_json::to_string(&document) {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(e) => {
                error!(page_id, error = %e, "Failed to serialize page document");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
            }
        },
        Err(e) => {
            warn!(page_id, error = %e, "Failed to fetch page");
            let status = StatusCode::from_u16(e.relay_status())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let message = match &e {
                NotionError::Api { message, .. } => message.clone(),
                other => other.to_string(),
            };
            json_error(status, &message)
        }
    }
}
