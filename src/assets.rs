//! Static serving of the prebuilt frontend
//!
//! Every path that is not a proxy candidate resolves against the asset
//! directory; anything that does not match an existing file falls back to
//! the SPA entry document with a 200 so client-side routes resolve.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use std::path::PathBuf;
use tracing::{debug, error};

pub struct StaticAssets {
    root: PathBuf,
    index: PathBuf,
}

impl StaticAssets {
    pub fn new(root: impl Into<PathBuf>, index_file: &str) -> Self {
        let root = root.into();
        let index = root.join(index_file);
        Self { root, index }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Map a request path to a file inside the asset root. Traversal
    /// segments and empty paths yield None, which lands on the SPA fallback.
    fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let trimmed = request_path.trim_start_matches('/');
        if trimmed.is_empty() {
            return None;
        }

        let mut path = self.root.clone();
        for segment in trimmed.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return None;
            }
            path.push(segment);
        }
        Some(path)
    }

    pub async fn respond(&self, request_path: &str) -> Response<Full<Bytes>> {
        if let Some(path) = self.resolve(request_path) {
            // A directory path fails the read and falls through to the index
            if let Ok(contents) = tokio::fs::read(&path).await {
                let mime = mime_guess::from_path(&path).first_or_octet_stream();
                debug!(path = %path.display(), "Serving static asset");
                return Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, mime.as_ref())
                    .body(Full::new(Bytes::from(contents)))
                    .expect("valid response with StatusCode enum");
            }
        }

        match tokio::fs::read(&self.index).await {
            Ok(contents) => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "text/html; charset=utf-8")
                .body(Full::new(Bytes::from(contents)))
                .expect("valid response with StatusCode enum"),
            Err(e) => {
                error!(path = %self.index.display(), error = %e, "SPA entry document unavailable");
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .header(CONTENT_TYPE, "text/plain")
                    .body(Full::new(Bytes::from("entry document unavailable")))
                    .expect("valid response with StatusCode enum")
            }
        }
    }
}
