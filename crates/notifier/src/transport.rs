//! HTTP transport shared by all delivery tasks.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use herald_common::config::AppConfig;
use herald_common::error::AddonError;

use crate::adapters::RequestDescriptor;

/// Response status and body. The body is kept for log lines only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

impl From<TransportError> for AddonError {
    fn from(err: TransportError) -> Self {
        AddonError::Transport(err.to_string())
    }
}

/// Sends built requests. Implementations must be safe to share between
/// concurrently running tasks.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] over a pooled `reqwest::Client` with a fixed timeout.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, TransportError> {
        Self::new(Duration::from_secs(config.request_timeout_secs))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) => text,
            Err(e) => format!("[Failed to read response body: {e}]"),
        };

        tracing::debug!(url = %redact_query(&request.url), status, "Request completed");

        Ok(HttpResponse { status, body })
    }
}

/// URL with the query string dropped, since auth tokens travel there.
pub fn redact_query(url: &str) -> &str {
    url.split_once('?').map(|(base, _)| base).unwrap_or(url)
}
