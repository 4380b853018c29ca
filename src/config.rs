use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Global configuration for the gateway
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Public server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Inner documentation service configuration
    #[serde(default)]
    pub docs: DocsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Public listening port (default: 3000, overridable via the PORT env var)
    #[serde(default = "default_listen_port")]
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Directory holding the prebuilt frontend assets (default: dist)
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    /// SPA entry document inside the asset directory (default: index.html)
    #[serde(default = "default_index_file")]
    pub index_file: String,

    /// Max time to wait for a response from the inner service in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_listen_port(),
            bind: default_bind_address(),
            assets_dir: default_assets_dir(),
            index_file: default_index_file(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration for the supervised documentation service
#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    /// Command line used to start the service (default: "fleetdocs").
    /// Split with shell-words, so quoted arguments work.
    #[serde(default = "default_docs_command")]
    pub command: String,

    /// Loopback port the service listens on (default: 3001).
    /// Handed to the child via the DOCS_PORT environment variable.
    #[serde(default = "default_docs_port")]
    pub port: u16,

    /// Reserved path prefix forwarded to the service (default: /api/notion)
    #[serde(default = "default_proxy_prefix")]
    pub proxy_prefix: String,

    /// Grace period in seconds between SIGTERM and SIGKILL at shutdown (default: 5)
    #[serde(default = "default_shutdown_grace_period")]
    pub shutdown_grace_period_secs: u64,

    /// Extra environment variables for the child (the gateway's own
    /// environment is inherited as-is)
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            command: default_docs_command(),
            port: default_docs_port(),
            proxy_prefix: default_proxy_prefix(),
            shutdown_grace_period_secs: default_shutdown_grace_period(),
            env: HashMap::new(),
        }
    }
}

impl DocsConfig {
    /// Split the configured command into program + arguments
    pub fn command_line(&self) -> anyhow::Result<(String, Vec<String>)> {
        let mut parts = shell_words::split(&self.command)
            .map_err(|e| anyhow::anyhow!("Invalid docs command '{}': {}", self.command, e))?;
        if parts.is_empty() {
            anyhow::bail!("Docs command is empty");
        }
        let program = parts.remove(0);
        Ok((program, parts))
    }

    /// Loopback base URL the reserved prefix is rewritten onto
    pub fn upstream_base(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, self.proxy_prefix)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_secs)
    }

    /// Validate the docs service configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.command.trim().is_empty() {
            return Err("docs: 'command' must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("docs: 'port' must be greater than 0".to_string());
        }
        if !self.proxy_prefix.starts_with('/') || self.proxy_prefix.len() < 2 {
            return Err(format!(
                "docs: 'proxy_prefix' must be an absolute path, got '{}'",
                self.proxy_prefix
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Apply environment overrides (PORT for the public port)
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(port) = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
        {
            self.server.port = port;
        }
        self
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.docs.validate() {
            errors.push(e);
        }
        if self.server.port == self.docs.port {
            errors.push(format!(
                "server: public port {} collides with the docs service port",
                self.server.port
            ));
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}

// Default value functions
fn default_listen_port() -> u16 {
    3000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_assets_dir() -> String {
    "dist".to_string()
}

fn default_index_file() -> String {
    "index.html".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_docs_command() -> String {
    "fleetdocs".to_string()
}

fn default_docs_port() -> u16 {
    3001
}

fn default_proxy_prefix() -> String {
    "/api/notion".to_string()
}

fn default_shutdown_grace_period() -> u64 {
    5
}
