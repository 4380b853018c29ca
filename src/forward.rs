//! Forwarding of reserved-prefix requests to the documentation service
//!
//! This is a transparent pass-through: method, headers and body travel
//! unmodified in both directions. Bodies are fully buffered in memory before
//! the outbound call is issued; the only traffic here is small JSON API
//! payloads, not uploads.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::{debug, error};

/// Fixed body sent whenever the upstream call fails, whatever the cause
pub const PROXY_ERROR_BODY: &str = "proxy error";

/// Check whether a request path falls under the reserved proxy prefix.
///
/// A path matches when it equals the prefix or continues it at a `/`
/// boundary (`/api/notionx` is not a candidate). Returns the path+query
/// remainder verbatim, ready to append to the upstream base URL.
pub fn match_proxy_path<'a>(uri: &'a Uri, prefix: &str) -> Option<&'a str> {
    let path = uri.path();
    let rest = path.strip_prefix(prefix)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or(path);
    Some(&path_and_query[prefix.len()..])
}

/// Methods that conventionally carry no request body
fn skip_body(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}

/// Copy every header verbatim, multi-valued headers included. The single
/// place a forwarding allow/deny policy would swap in.
pub fn copy_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for (name, value) in src.iter() {
        dst.append(name, value.clone());
    }
}

/// The substituted response for any upstream failure. The only error path:
/// no retries, no circuit breaker, no backoff.
pub fn proxy_error_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(PROXY_ERROR_BODY)))
        .expect("valid response with StatusCode enum and static header")
}

/// Pooled HTTP client pinned to the documentation service's loopback base URL
pub struct UpstreamClient {
    client: Client<HttpConnector, Full<Bytes>>,
    base: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(base: String, timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.enforce_http(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            base,
            timeout,
        }
    }

    /// The loopback base URL the reserved prefix is rewritten onto
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Construct the upstream target for a stripped path+query remainder
    pub fn target_for(&self, remainder: &str) -> String {
        format!("{}{}", self.base, remainder)
    }

    /// Forward one inbound request and relay the upstream response.
    ///
    /// Any failure (connect refused, timeout, a mid-stream read error)
    /// substitutes the fixed 500 response; the underlying error is logged
    /// with the request id.
    pub async fn forward<B>(
        &self,
        req: Request<B>,
        remainder: &str,
        request_id: &str,
    ) -> Response<Full<Bytes>>
    where
        B: hyper::body::Body<Data = Bytes> + Send,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        match self.try_forward(req, remainder).await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    request_id,
                    base = %self.base,
                    error = %e,
                    "Failed to forward request to documentation service"
                );
                proxy_error_response()
            }
        }
    }

    async fn try_forward<B>(
        &self,
        req: Request<B>,
        remainder: &str,
    ) -> anyhow::Result<Response<Full<Bytes>>>
    where
        B: hyper::body::Body<Data = Bytes> + Send,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let target = self.target_for(remainder);
        let (parts, body) = req.into_parts();

        // Read-only methods forward no body, whatever the client sent;
        // everything else is buffered to the last byte before the outbound
        // call starts (no streaming overlap)
        let body_bytes = if skip_body(&parts.method) {
            Bytes::new()
        } else {
            body.collect().await?.to_bytes()
        };

        let mut outbound = Request::builder()
            .method(parts.method.clone())
            .uri(&target)
            .body(Full::new(body_bytes))?;
        copy_headers(&parts.headers, outbound.headers_mut());

        // A skipped body makes any copied framing headers a lie the HTTP
        // stack refuses to send; they are the one exception to verbatim copy
        if skip_body(&parts.method) {
            outbound.headers_mut().remove(hyper::header::CONTENT_LENGTH);
            outbound.headers_mut().remove(hyper::header::TRANSFER_ENCODING);
        }

        debug!(method = %parts.method, target = %target, "Forwarding request");

        let upstream = tokio::time::timeout(self.timeout, self.client.request(outbound))
            .await
            .map_err(|_| anyhow::anyhow!("Upstream request timed out"))??;

        // Status verbatim, every raw header copied, body read fully into
        // memory and then sent
        let (up_parts, up_body) = upstream.into_parts();
        let up_bytes = up_body.collect().await?.to_bytes();

        let mut response = Response::builder()
            .status(up_parts.status)
            .body(Full::new(up_bytes))?;
        copy_headers(&up_parts.headers, response.headers_mut());

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_match_proxy_path() {
        let prefix = "/api/notion";

        assert_eq!(
            match_proxy_path(&uri("/api/notion/page/abc"), prefix),
            Some("/page/abc")
        );
        assert_eq!(match_proxy_path(&uri("/api/notion"), prefix), Some(""));
        assert_eq!(
            match_proxy_path(&uri("/api/notion/page/abc?depth=2&raw=1"), prefix),
            Some("/page/abc?depth=2&raw=1")
        );

        // Not a prefix boundary
        assert_eq!(match_proxy_path(&uri("/api/notions/page"), prefix), None);
        // Outside the prefix entirely
        assert_eq!(match_proxy_path(&uri("/devices/42"), prefix), None);
        assert_eq!(match_proxy_path(&uri("/"), prefix), None);
    }

    #[test]
    fn test_skip_body_methods() {
        assert!(skip_body(&Method::GET));
        assert!(skip_body(&Method::HEAD));
        assert!(!skip_body(&Method::POST));
        assert!(!skip_body(&Method::PUT));
        assert!(!skip_body(&Method::PATCH));
        assert!(!skip_body(&Method::DELETE));
    }

    #[test]
    fn test_copy_headers_preserves_multi_values() {
        let mut src = HeaderMap::new();
        src.append("set-cookie", "a=1".parse().unwrap());
        src.append("set-cookie", "b=2".parse().unwrap());
        src.insert("x-total-count", "17".parse().unwrap());

        let mut dst = HeaderMap::new();
        copy_headers(&src, &mut dst);

        let cookies: Vec<_> = dst.get_all("set-cookie").iter().collect();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0], "a=1");
        assert_eq!(cookies[1], "b=2");
        assert_eq!(dst.get("x-total-count").unwrap(), "17");
    }

    #[test]
    fn test_target_construction() {
        let client = UpstreamClient::new(
            "http://127.0.0.1:3001/api/notion".to_string(),
            Duration::from_secs(5),
        );
        assert_eq!(
            client.target_for("/page/abc?x=1"),
            "http://127.0.0.1:3001/api/notion/page/abc?x=1"
        );
        assert_eq!(client.base(), "http://127.0.0.1:3001/api/notion");
    }

    #[test]
    fn test_proxy_error_response_shape() {
        let response = proxy_error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
    }
}
