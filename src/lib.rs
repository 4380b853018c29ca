//! Fleetgate - serving gateway for the fleet dashboard
//!
//! This library provides the two halves of the dashboard's serving layer:
//! - A public gateway that serves the prebuilt SPA frontend and transparently
//!   proxies the reserved `/api/notion` prefix to an inner documentation
//!   service over loopback HTTP
//! - Supervision of that inner service as a child process: spawned at boot,
//!   stdout/stderr piped into the gateway's logs, killed on shutdown
//! - The inner documentation service itself, a thin HTTP wrapper around the
//!   Notion content API that returns a page's fully expanded block tree

pub mod assets;
pub mod config;
pub mod docs;
pub mod error;
pub mod forward;
pub mod gateway;
pub mod notion;
pub mod supervisor;

/// Version information for the gateway
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
