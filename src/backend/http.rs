//! HTTP aggregation backend
//!
//! Sends `POST {base_url}{endpoint}` with body `{ "filters": [...] }` and
//! returns the raw JSON. Normalization happens in the loader.

use super::AggregationBackend;
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::filter::FilterSet;
use crate::types::Endpoint;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Maximum number of body characters kept in status errors
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Serialize)]
struct FilterRequest<'a> {
    filters: &'a FilterSet,
}

/// reqwest-based backend client
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBackend {
    /// Create a client from backend configuration
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let timeout = config.timeout();
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ouvidoria-dash/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, endpoint: &Endpoint) -> String {
        let path = endpoint.as_str();
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout.as_millis() as u64)
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl AggregationBackend for HttpBackend {
    async fn fetch(&self, endpoint: &Endpoint, filters: &FilterSet) -> Result<Value, BackendError> {
        let url = self.url_for(endpoint);
        debug!(%url, filters = %filters, "POST filter request");

        let response = self
            .http
            .post(&url)
            .json(&FilterRequest { filters })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| BackendError::MalformedPayload(format!("invalid JSON from {}: {}", url, e)))
    }
}
