use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use ws_relay::{ShutdownPolicy, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_MESSAGE_SIZE};

use crate::cli::ServeArgs;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: Option<String>,
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: u64,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            port: default_port(),
            path: default_path(),
            backend_url: None,
            max_message_size: default_max_message_size(),
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default = "default_policy")]
    pub policy: String,
    #[serde(default = "default_grace")]
    pub grace_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            grace_secs: default_grace(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OperatorConfig {
    /// Web page that encrypts a value for a given `?pk=`.
    #[serde(default = "default_encryptor_url")]
    pub encryptor_url: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            encryptor_url: default_encryptor_url(),
        }
    }
}

impl Config {
    /// Apply command-line and environment overrides on top of the file.
    pub fn apply_overrides(&mut self, args: &ServeArgs) {
        if let Some(ref host) = args.listen_host {
            self.network.listen_host = host.clone();
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(ref path) = args.path {
            self.network.path = Some(path.clone()).filter(|p| !p.is_empty());
        }
        if let Some(ref backend) = args.backend {
            self.network.backend_url = Some(backend.clone());
        }
        if let Some(size) = args.max_message_size {
            self.network.max_message_size = size;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        let host: IpAddr = self
            .network
            .listen_host
            .parse()
            .with_context(|| format!("invalid listen host '{}'", self.network.listen_host))?;
        Ok(SocketAddr::new(host, self.network.port))
    }

    pub fn backend_url(&self) -> anyhow::Result<&str> {
        self.network
            .backend_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .context("backend URL not configured (set BROWSER_URL or network.backend_url)")
    }

    pub fn shutdown_policy(&self) -> anyhow::Result<ShutdownPolicy> {
        self.shutdown.policy.parse()
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.network.handshake_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_secs)
    }

    /// Operator link that pre-fills the public key in the web encryptor.
    pub fn encryptor_link(&self, public_key: &str) -> String {
        format!("{}?pk={public_key}", self.operator.encryptor_url)
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> Option<String> {
    Some("/srv".to_string())
}

fn default_max_message_size() -> u64 {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_handshake_timeout() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT.as_secs()
}

fn default_policy() -> String {
    "drain".to_string()
}

fn default_grace() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_encryptor_url() -> String {
    "https://dzharikhin.github.io/ecies/".to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// Returns `None` when the file does not exist, so the relay can run from
/// environment variables alone. Callers report that once logging is up.
pub fn load(path: &Path) -> anyhow::Result<Option<Config>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config file {}", path.display()))
        }
    };

    serde_yml::from_str::<Config>(&contents)
        .map(Some)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}
