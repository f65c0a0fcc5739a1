use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

// Instant queries against the live dashboard must answer fast or not at all.
const QUERY_TIMEOUT_SECONDS: u64 = 5;

#[derive(Debug, Error)]
pub enum MetricsClientError {
    #[error("failed to build metrics client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("metrics query failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("metrics backend returned unexpected status {0}")]
    Status(StatusCode),
    #[error("failed to decode metrics response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Thin pass-through client for a Prometheus-compatible instant-query API
/// (VictoriaMetrics in the default deployment).
#[derive(Debug, Clone)]
pub struct MetricsClient {
    base_url: String,
    http: reqwest::Client,
}

impl MetricsClient {
    pub fn new(base_url: &str) -> Result<Self, MetricsClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(QUERY_TIMEOUT_SECONDS))
            .build()
            .map_err(MetricsClientError::Build)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn query(&self, query: &str) -> Result<Value, MetricsClientError> {
        let response = self
            .http
            .get(format!("{}/api/v1/query", self.base_url))
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|error| {
                if error.is_builder() {
                    MetricsClientError::Build(error)
                } else {
                    MetricsClientError::Transport(error)
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(MetricsClientError::Status(status));
        }

        response.json().await.map_err(MetricsClientError::Decode)
    }
}
