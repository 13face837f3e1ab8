//! Dependency probes.
//!
//! # Responsibilities
//! - Define the probe seam used by the health checker
//! - Provide network probes per dependency type
//!
//! # Probe selection
//! ```text
//! api       → GET  <endpoint>/health
//! external  → HEAD <endpoint>
//! internal  → GET  <endpoint>
//! database  → TCP connect to host:port
//! cache     → TCP connect to host:port
//! ```
//!
//! # Design Decisions
//! - Probes do not enforce their own deadline; the circuit breaker's request
//!   timeout bounds every attempt
//! - Only 2xx counts as success for HTTP probes

use futures_util::future::BoxFuture;
use reqwest::Method;
use thiserror::Error;
use url::Url;

use crate::health::types::{DependencyType, ServiceDependency};

const USER_AGENT: &str = "health-guard-probe";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("request failed: {0}")]
    Http(String),

    #[error("unhealthy status code {0}")]
    Status(u16),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("probe timed out")]
    Timeout,
}

/// Checks whether a dependency is reachable and serving.
pub trait HealthProbe: Send + Sync {
    fn probe(&self, dependency: &ServiceDependency) -> BoxFuture<'static, Result<(), ProbeError>>;
}

impl<F> HealthProbe for F
where
    F: Fn(&ServiceDependency) -> BoxFuture<'static, Result<(), ProbeError>> + Send + Sync,
{
    fn probe(&self, dependency: &ServiceDependency) -> BoxFuture<'static, Result<(), ProbeError>> {
        self(dependency)
    }
}

/// HTTP probe for `api`, `external` and `internal` dependencies.
#[derive(Debug, Clone, Default)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Method and URL probed for `dependency`.
    pub fn target(dependency: &ServiceDependency) -> Result<(Method, Url), ProbeError> {
        let invalid = |reason: String| ProbeError::InvalidEndpoint {
            endpoint: dependency.endpoint.clone(),
            reason,
        };
        let (method, raw) = match dependency.kind {
            DependencyType::Api => (
                Method::GET,
                format!("{}/health", dependency.endpoint.trim_end_matches('/')),
            ),
            DependencyType::External => (Method::HEAD, dependency.endpoint.clone()),
            _ => (Method::GET, dependency.endpoint.clone()),
        };
        let url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok((method, url)),
            other => Err(invalid(format!("unsupported scheme '{}'", other))),
        }
    }
}

impl HealthProbe for HttpProbe {
    fn probe(&self, dependency: &ServiceDependency) -> BoxFuture<'static, Result<(), ProbeError>> {
        let target = Self::target(dependency);
        let client = self.client.clone();
        Box::pin(async move {
            let (method, url) = target?;
            let response = client
                .request(method, url)
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ProbeError::Timeout
                    } else if e.is_connect() {
                        ProbeError::Connect(e.to_string())
                    } else {
                        ProbeError::Http(e.to_string())
                    }
                })?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(ProbeError::Status(status.as_u16()))
            }
        })
    }
}

/// TCP connect probe for `database` and `cache` dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

impl TcpProbe {
    /// Accepts `host:port` or a URL with an explicit or well-known port.
    pub fn address(endpoint: &str) -> Result<(String, u16), ProbeError> {
        let invalid = |reason: &str| ProbeError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        if endpoint.contains("://") {
            let url = Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
            let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
            let port = url
                .port_or_known_default()
                .or_else(|| default_port(url.scheme()))
                .ok_or_else(|| invalid("missing port"))?;
            return Ok((host.to_string(), port));
        }

        let (host, port) = endpoint.rsplit_once(':').ok_or_else(|| invalid("expected host:port"))?;
        let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        Ok((host.to_string(), port))
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "postgres" | "postgresql" => Some(5432),
        "mysql" => Some(3306),
        "redis" => Some(6379),
        "memcached" => Some(11211),
        "mongodb" => Some(27017),
        _ => None,
    }
}

impl HealthProbe for TcpProbe {
    fn probe(&self, dependency: &ServiceDependency) -> BoxFuture<'static, Result<(), ProbeError>> {
        let address = Self::address(&dependency.endpoint);
        Box::pin(async move {
            let (host, port) = address?;
            tokio::net::TcpStream::connect((host.as_str(), port))
                .await
                .map(|_| ())
                .map_err(|e| ProbeError::Connect(e.to_string()))
        })
    }
}
