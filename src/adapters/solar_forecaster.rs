use std::path::Path;
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode, multipart};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

const REQUEST_TIMEOUT_SECONDS: u64 = 60;

pub const SESSION_ID_HEADER: &str = "Session-ID";
pub const ENV_FILE_FIELD: &str = "env_file";

/// Parameter set for a `/run` call. Serialized with the forecaster's
/// environment-variable key style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RunRequest {
    pub prometheus_url: String,
    pub metric_name: String,
    pub train_days: i64,
    pub battery_capacity_wh: f64,
    pub initial_soc_percent: f64,
    pub constant_load_w: f64,
    pub detailed_summary: bool,
    pub use_cython: bool,
}

#[derive(Debug, Error)]
pub enum ForecasterClientError {
    #[error("failed to build forecaster client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("forecaster request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("forecaster returned unexpected status {0}")]
    Status(StatusCode),
    #[error("failed to decode forecaster response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Client for the session-addressable solar-forecaster service. Holds no
/// session state of its own; session identity is caller-supplied per call.
#[derive(Debug, Clone)]
pub struct SolarForecasterClient {
    base_url: String,
    http: reqwest::Client,
}

impl SolarForecasterClient {
    pub fn new(base_url: &str) -> Result<Self, ForecasterClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(ForecasterClientError::Build)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn run_forecast(
        &self,
        request: &RunRequest,
    ) -> Result<Map<String, Value>, ForecasterClientError> {
        self.dispatch(self.http.post(self.url("/run")).json(request))
            .await
    }

    pub async fn upload_env_file(
        &self,
        path: &Path,
    ) -> Result<Map<String, Value>, ForecasterClientError> {
        let content = std::fs::read(path).map_err(|source| ForecasterClientError::EnvFile {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "env".to_string());

        let form = multipart::Form::new()
            .part(ENV_FILE_FIELD, multipart::Part::bytes(content).file_name(file_name));

        self.dispatch(self.http.post(self.url("/upload-env")).multipart(form))
            .await
    }

    pub async fn run_with_env(
        &self,
        session_id: &str,
        overrides: Option<&Map<String, Value>>,
    ) -> Result<Map<String, Value>, ForecasterClientError> {
        let mut request = self
            .http
            .post(self.url(&format!("/run-with-env/{session_id}")))
            .header(SESSION_ID_HEADER, session_id);

        if let Some(overrides) = overrides {
            request = request.json(overrides);
        }

        self.dispatch(request).await
    }

    pub async fn list_sessions(&self) -> Result<Map<String, Value>, ForecasterClientError> {
        self.dispatch(self.http.get(self.url("/sessions"))).await
    }

    pub async fn delete_session(
        &self,
        session_id: &str,
    ) -> Result<Map<String, Value>, ForecasterClientError> {
        self.dispatch(
            self.http
                .delete(self.url(&format!("/sessions/{session_id}")))
                .header(SESSION_ID_HEADER, session_id),
        )
        .await
    }

    pub async fn sample_env(&self) -> Result<Map<String, Value>, ForecasterClientError> {
        self.dispatch(self.http.get(self.url("/sample-env"))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Shared dispatcher for every verb: send, require 200, decode the body
    /// as a generic JSON object. One attempt, no retries.
    async fn dispatch(
        &self,
        request: RequestBuilder,
    ) -> Result<Map<String, Value>, ForecasterClientError> {
        let response = request.send().await.map_err(|error| {
            if error.is_builder() {
                ForecasterClientError::Build(error)
            } else {
                ForecasterClientError::Transport(error)
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ForecasterClientError::Status(status));
        }

        response.json().await.map_err(ForecasterClientError::Decode)
    }
}
