//! Error types shared by the gateway and the documentation service

use thiserror::Error;

/// Errors from the Notion content API client
#[derive(Debug, Error)]
pub enum NotionError {
    /// Transport-level failure talking to the API
    #[error("notion request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-2xx status
    #[error("notion api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The API answered 2xx but the payload was not the expected shape
    #[error("unexpected notion payload: {0}")]
    InvalidPayload(String),
}

impl NotionError {
    /// HTTP status to relay to the caller of the documentation service.
    /// API errors keep their original status; transport errors become 502.
    pub fn relay_status(&self) -> u16 {
        match self {
            NotionError::Api { status, .. } => *status,
            NotionError::Http(_) => 502,
            NotionError::InvalidPayload(_) => 502,
        }
    }
}

/// Distinguish "port already in use" from other bind failures so operators
/// can tell an already-running instance apart from genuine startup errors.
pub fn is_addr_in_use(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::AddrInUse
}
