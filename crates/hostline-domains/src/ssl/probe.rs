use async_trait::async_trait;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid hostname {0}")]
    InvalidHostname(String),

    #[error("Could not connect to {host}: {details}")]
    Connect { host: String, details: String },

    #[error("TLS handshake with {host} failed: {details}")]
    Handshake { host: String, details: String },

    #[error("TLS probe of {host} timed out after {timeout_ms}ms")]
    Timeout { host: String, timeout_ms: u128 },

    #[error("TLS client configuration error: {0}")]
    Config(String),
}

/// Dials a host and completes a TLS handshake against the public roots
#[async_trait]
pub trait TlsProbe: Send + Sync {
    async fn handshake(&self, host: &str) -> Result<(), ProbeError>;
}

pub struct RustlsProbe {
    connector: TlsConnector,
    port: u16,
    timeout: Duration,
}

impl RustlsProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Config(e.to_string()))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            port: 443,
            timeout,
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    async fn dial(&self, host: &str) -> Result<(), ProbeError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| ProbeError::InvalidHostname(host.to_string()))?;

        let stream = TcpStream::connect((host, self.port))
            .await
            .map_err(|e| ProbeError::Connect {
                host: host.to_string(),
                details: e.to_string(),
            })?;

        self.connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ProbeError::Handshake {
                host: host.to_string(),
                details: e.to_string(),
            })?;

        Ok(())
    }
}

#[async_trait]
impl TlsProbe for RustlsProbe {
    async fn handshake(&self, host: &str) -> Result<(), ProbeError> {
        debug!("Probing TLS on {}:{}", host, self.port);

        match tokio::time::timeout(self.timeout, self.dial(host)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout {
                host: host.to_string(),
                timeout_ms: self.timeout.as_millis(),
            }),
        }
    }
}
