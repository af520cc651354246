use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Credentials the identity oracle uses to identify the calling platform
#[derive(Clone)]
pub struct CallerAuthorization(String);

impl CallerAuthorization {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

// Keeps the token out of logs
impl fmt::Debug for CallerAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallerAuthorization(***)")
    }
}

/// What the oracle saw: the public IP of the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IdentityLookup {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Identity oracle request failed: {0}")]
    Request(String),

    #[error("Identity oracle answered with status {0}")]
    Status(u16),

    #[error("Could not decode identity oracle response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait IdentityOracle: Send + Sync {
    async fn lookup(&self, caller: &CallerAuthorization) -> Result<IdentityLookup, OracleError>;
}

pub struct HttpIdentityOracle {
    client: Client,
    url: String,
}

impl HttpIdentityOracle {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IdentityOracle for HttpIdentityOracle {
    async fn lookup(&self, caller: &CallerAuthorization) -> Result<IdentityLookup, OracleError> {
        debug!("Asking identity oracle at {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .bearer_auth(caller.token())
            .send()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        response
            .json::<IdentityLookup>()
            .await
            .map_err(|e| OracleError::Decode(e.to_string()))
    }
}
