// src/config/models.rs
use crate::health::ParallelMode;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default path of the health endpoint.
pub const DEFAULT_PATH: &str = "/healthy";

/// Default response header carrying the aggregate status token.
pub const DEFAULT_HEADER: &str = "X-Service-Health";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub checker: CheckerSettings,
    pub client: ClientSettings,
    pub metrics: MetricsSettings,
    /// Remote services whose health endpoints are aggregated as sub-checks.
    pub checks: Vec<RemoteCheckSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub header: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            path: DEFAULT_PATH.to_string(),
            header: DEFAULT_HEADER.to_string(),
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerSettings {
    pub timeout_ms: u64,
    pub parallel: ParallelMode,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            parallel: ParallelMode::Auto,
        }
    }
}

impl CheckerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base url of the target, of form `[scheme://]host[:port]`.
    pub base_url: String,
    pub path: String,
    pub timeout_ms: u64,
    pub header: String,
    /// PEM encoded root certificates; when set the target is probed over https.
    pub root_certificates: Vec<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "localhost".to_string(),
            path: DEFAULT_PATH.to_string(),
            timeout_ms: default_timeout_ms(),
            header: DEFAULT_HEADER.to_string(),
            root_certificates: Vec::new(),
        }
    }
}

impl ClientSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCheckSettings {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_header")]
    pub header: String,
    #[serde(default)]
    pub root_certificates: Vec<PathBuf>,
}

impl RemoteCheckSettings {
    pub fn client(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.base_url.clone(),
            path: self.path.clone(),
            timeout_ms: self.timeout_ms,
            header: self.header.clone(),
            root_certificates: self.root_certificates.clone(),
        }
    }
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

fn default_header() -> String {
    DEFAULT_HEADER.to_string()
}

fn default_timeout_ms() -> u64 {
    3000
}

impl Settings {
    /// Client settings used by the `--health` flag. A client left at its
    /// default target probes this service's own endpoint.
    pub fn probe_settings(&self) -> ClientSettings {
        let mut client = self.client.clone();
        if client == ClientSettings::default() {
            client.base_url = format!("localhost:{}", self.server.port);
            client.path = self.server.path.clone();
            client.header = self.server.header.clone();
        }
        client
    }

    /// Checks every section and reports all problems together.
    pub fn validate(&self) -> Result<(), super::ConfigError> {
        let mut problems = Vec::new();

        if self.server.addr().is_err() {
            problems.push(format!(
                "server: invalid listen address {}:{}",
                self.server.host, self.server.port
            ));
        }
        if !self.server.path.starts_with('/') {
            problems.push(format!("server.path must start with '/': {}", self.server.path));
        }
        if self.server.header.trim().is_empty() {
            problems.push("server.header must not be empty".to_string());
        }
        if self.checker.timeout_ms == 0 {
            problems.push("checker.timeout_ms must be greater than zero".to_string());
        }
        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            problems.push(format!("metrics.path must start with '/': {}", self.metrics.path));
        }
        if self.metrics.enabled && self.metrics.path == self.server.path {
            problems.push("metrics.path must differ from server.path".to_string());
        }
        validate_client("client", &self.client, &mut problems);

        for (i, check) in self.checks.iter().enumerate() {
            if check.name.trim().is_empty() {
                problems.push(format!("checks[{}]: name must not be empty", i));
            }
            validate_client(&format!("checks[{}]", i), &check.client(), &mut problems);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(super::ConfigError::Invalid(problems))
        }
    }
}

fn validate_client(section: &str, client: &ClientSettings, problems: &mut Vec<String>) {
    if client.base_url.trim().is_empty() {
        problems.push(format!("{}.base_url must not be empty", section));
    }
    if client.timeout_ms == 0 {
        problems.push(format!("{}.timeout_ms must be greater than zero", section));
    }
}
