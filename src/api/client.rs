//! HTTP client for the training history service.

use crate::lineage::{ModelGroup, ModelGroupId, ParameterRecord, SessionRecord};
use crate::training::TrainingForm;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {0}")]
    Status(StatusCode),
    #[error("{0} not found")]
    NotFound(String),
    #[error("failed to parse response: {0}")]
    Decode(String),
}

/// Operations the console needs from the history service.
///
/// Calls block; the console runs them on worker threads.
pub trait HistoryService: Send + Sync {
    fn fetch_model_groups(&self) -> Result<Vec<ModelGroup>, ApiError>;

    /// Every session of a model group. An empty list means "no runs yet".
    fn fetch_sessions(&self, model_group_id: ModelGroupId) -> Result<Vec<SessionRecord>, ApiError>;

    /// Parameters of one session, or [`ApiError::NotFound`] if none were recorded.
    fn fetch_parameters(&self, session_id: &str) -> Result<ParameterRecord, ApiError>;

    /// Start a new training run; returns the session it created.
    fn retrain(&self, form: &TrainingForm) -> Result<SessionRecord, ApiError>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the API is healthy
    pub fn health(&self) -> Result<(), ApiError> {
        let url = format!("{}/health", self.base_url);
        let resp = self.client.get(&url).timeout(REQUEST_TIMEOUT).send()?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::Status(resp.status()))
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "GET");
        let resp = self.client.get(&url).timeout(REQUEST_TIMEOUT).send()?;
        decode(resp, what)
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

impl HistoryService for ApiClient {
    fn fetch_model_groups(&self) -> Result<Vec<ModelGroup>, ApiError> {
        self.get_json("/history/finetuned_models", "fine-tuned models")
    }

    fn fetch_sessions(&self, model_group_id: ModelGroupId) -> Result<Vec<SessionRecord>, ApiError> {
        let path = format!("/history/training_sessions/{}", model_group_id);
        let sessions: Option<Vec<SessionRecord>> =
            self.get_json(&path, &format!("model {}", model_group_id))?;
        Ok(sessions.unwrap_or_default())
    }

    fn fetch_parameters(&self, session_id: &str) -> Result<ParameterRecord, ApiError> {
        let what = format!("parameters for session {}", session_id);
        let path = format!(
            "/history/training_parameters/{}",
            urlencoding::encode(session_id)
        );
        // The service answers 200 with a null body for sessions without parameters
        let params: Option<ParameterRecord> = self.get_json(&path, &what)?;
        params.ok_or(ApiError::NotFound(what))
    }

    fn retrain(&self, form: &TrainingForm) -> Result<SessionRecord, ApiError> {
        let url = format!("{}/training/training/re_train_model", self.base_url);
        tracing::info!(
            parent = ?form.parent_session_no,
            name = %form.ts_model_name,
            "requesting continued training"
        );
        let resp = self
            .client
            .post(&url)
            .json(form)
            .timeout(Duration::from_secs(60)) // Longer timeout, the trainer queues the job first
            .send()?;
        decode(resp, "re-train endpoint")
    }
}

fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T, ApiError> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(what.to_string()));
    }
    if !status.is_success() {
        return Err(ApiError::Status(status));
    }
    resp.json().map_err(|e| ApiError::Decode(e.to_string()))
}
