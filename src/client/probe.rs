// src/client/probe.rs
use crate::config::ClientSettings;
use crate::health::{effective_deadline, Check, CheckContext, Status};
use async_trait::async_trait;
use reqwest::{Certificate, Client};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid status code {0}")]
    InvalidStatusCode(u16),

    #[error("invalid target url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("health request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("health request timed out")]
    Timeout,

    #[error("failed to load root certificate {path}: {reason}")]
    Certificate { path: String, reason: String },
}

/// Requests the health endpoint of a (remote) service and maps the response
/// back to a [`Status`].
#[derive(Debug, Clone)]
pub struct ProbeClient {
    settings: ClientSettings,
    client: Client,
    target: Url,
}

impl ProbeClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ProbeError> {
        let mut builder = Client::builder();
        for path in &settings.root_certificates {
            let pem = std::fs::read(path).map_err(|e| ProbeError::Certificate {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| ProbeError::Certificate {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder.build()?;
        Self::with_client(settings, client)
    }

    /// Uses a preconfigured `reqwest::Client`, e.g. one shared with the rest
    /// of the application.
    pub fn with_client(settings: ClientSettings, client: Client) -> Result<Self, ProbeError> {
        let target = target_url(&settings)?;
        Ok(Self {
            settings,
            client,
            target,
        })
    }

    pub fn target_url(&self) -> &Url {
        &self.target
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Performs a single health request bounded by the tighter of `deadline`
    /// and the configured timeout.
    ///
    /// The status header, when present, takes precedence over the response
    /// status code. Unexpected status codes and transport failures yield
    /// [`Status::Unknown`] together with the error.
    pub async fn request(&self, deadline: Option<Instant>) -> (Status, Option<ProbeError>) {
        let deadline = effective_deadline(deadline, self.settings.timeout());

        let response = match timeout_at(deadline, self.client.get(self.target.clone()).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return (Status::Unknown, Some(ProbeError::Transport(e))),
            Err(_) => return (Status::Unknown, Some(ProbeError::Timeout)),
        };

        if let Some(token) = response
            .headers()
            .get(self.settings.header.as_str())
            .and_then(|v| v.to_str().ok())
        {
            return (Status::parse(token), None);
        }

        match response.status().as_u16() {
            200 | 204 => (Status::Healthy, None),
            503 => (Status::Unhealthy, None),
            425 => (Status::Unknown, None),
            other => (Status::Unknown, Some(ProbeError::InvalidStatusCode(other))),
        }
    }

    /// Probes the target once, logging any error. Used by the `--health`
    /// flag, which exits with the returned status.
    pub async fn probe(&self) -> Status {
        let (status, err) = self.request(None).await;
        if let Some(err) = err {
            warn!("Health probe {} failed: {}", self.target, err);
        }
        status
    }
}

#[async_trait]
impl Check for ProbeClient {
    async fn check_health(&self, ctx: CheckContext) -> Status {
        let (status, err) = self.request(Some(ctx.deadline())).await;
        match err {
            Some(e) => warn!("Health probe {} failed: {}", self.target, e),
            None => debug!("Health probe {} reported {}", self.target, status),
        }
        status
    }
}

fn target_url(settings: &ClientSettings) -> Result<Url, ProbeError> {
    let mut base = settings.base_url.trim().trim_end_matches('/').to_string();
    if !base.contains("://") {
        let scheme = if settings.root_certificates.is_empty() {
            "http"
        } else {
            "https"
        };
        base = format!("{}://{}", scheme, base);
    }

    let mut url = Url::parse(&base).map_err(|source| ProbeError::InvalidUrl {
        url: base.clone(),
        source,
    })?;
    if !settings.root_certificates.is_empty() && url.scheme() == "http" {
        let _ = url.set_scheme("https");
    }
    url.set_path(&settings.path);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: &str) -> ClientSettings {
        ClientSettings {
            base_url: base_url.to_string(),
            ..ClientSettings::default()
        }
    }

    #[test]
    fn test_target_url_defaults() {
        let client = ProbeClient::with_client(ClientSettings::default(), Client::new()).unwrap();
        assert_eq!(client.target_url().as_str(), "http://localhost/healthy");
    }

    #[test]
    fn test_target_url_with_port_and_scheme() {
        let url = target_url(&settings("localhost:1234")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:1234/healthy");

        let url = target_url(&settings("https://example.com/")).unwrap();
        assert_eq!(url.as_str(), "https://example.com/healthy");
    }

    #[test]
    fn test_target_url_tls_forces_https() {
        let mut s = settings("http://localhost:1234");
        s.root_certificates.push("ca.pem".into());
        let url = target_url(&s).unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_invalid_target_url() {
        let err = target_url(&settings("http://[::1")).unwrap_err();
        assert!(matches!(err, ProbeError::InvalidUrl { .. }));
    }

    #[test]
    fn test_missing_certificate() {
        let mut s = settings("localhost");
        s.root_certificates.push("/nonexistent/ca.pem".into());
        assert!(matches!(
            ProbeClient::new(s),
            Err(ProbeError::Certificate { .. })
        ));
    }
}
