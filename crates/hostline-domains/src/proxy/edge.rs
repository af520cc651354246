use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const HEALTH_PATH: &str = "v1/proxy-health";

/// Body of the tenant edge health endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EdgeHealthResponse {
    #[serde(default)]
    pub status: String,
    /// The X-Forwarded-For value the edge received through the proxy
    #[serde(default)]
    pub x_forwarded_for: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl EdgeHealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok") || self.status.eq_ignore_ascii_case("healthy")
    }

    /// First address of the echoed header, which is the original client
    pub fn forwarded_client_ip(&self) -> Option<&str> {
        self.x_forwarded_for
            .as_deref()
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    }
}

/// Raw body plus its decoded form when it was valid JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeHealthReply {
    pub http_status: u16,
    pub raw: String,
    pub response: Option<EdgeHealthResponse>,
}

#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Invalid proxy URL {url}: {details}")]
    InvalidUrl { url: String, details: String },

    #[error("Request through proxy failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EdgeHealthClient: Send + Sync {
    /// `GET <proxy_url>/v1/proxy-health?domain_id=..&x_forwarded_for=..`
    async fn check(
        &self,
        proxy_url: &str,
        domain_id: i32,
        expected_ip: &str,
    ) -> Result<EdgeHealthReply, EdgeError>;
}

pub struct HttpEdgeHealthClient {
    client: Client,
}

impl HttpEdgeHealthClient {
    pub fn new(timeout: Duration) -> Result<Self, EdgeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EdgeError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

/// Health endpoint under the proxy URL, keeping any path prefix it has
pub fn health_url(proxy_url: &str, domain_id: i32, expected_ip: &str) -> Result<Url, EdgeError> {
    let invalid = |details: String| EdgeError::InvalidUrl {
        url: proxy_url.to_string(),
        details,
    };

    let mut base = Url::parse(proxy_url.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", base.scheme())));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let mut url = base.join(HEALTH_PATH).map_err(|e| invalid(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("domain_id", &domain_id.to_string())
        .append_pair("x_forwarded_for", expected_ip);
    Ok(url)
}

#[async_trait]
impl EdgeHealthClient for HttpEdgeHealthClient {
    async fn check(
        &self,
        proxy_url: &str,
        domain_id: i32,
        expected_ip: &str,
    ) -> Result<EdgeHealthReply, EdgeError> {
        let url = health_url(proxy_url, domain_id, expected_ip)?;
        debug!("Checking proxy health at {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EdgeError::Transport(e.to_string()))?;

        let http_status = response.status().as_u16();
        let raw = response
            .text()
            .await
            .map_err(|e| EdgeError::Transport(e.to_string()))?;
        let response = serde_json::from_str::<EdgeHealthResponse>(&raw).ok();

        Ok(EdgeHealthReply {
            http_status,
            raw,
            response,
        })
    }
}
