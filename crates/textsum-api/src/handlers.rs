//! API Handlers
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use textsum_core::{TextsumError, TextsumResult, TEXTSUM_VERSION};
use textsum_stages::{reference_backend, run_pipeline, PipelineSelection, PredictionService};
use tracing::{error, info};

pub const INDEX_MESSAGE: &str =
    "Text Summarization API is running. Send a POST request to /predict with your text to get a summary.";

/// Status code plus plain-text message.
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub String);

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }
}

impl From<TextsumError> for ApiError {
    fn from(e: TextsumError) -> Self {
        let status = if e.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let message = match e {
            TextsumError::InvalidInput(msg) => msg,
            other => other.to_string(),
        };
        Self(status, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

pub async fn index() -> &'static str {
    INDEX_MESSAGE
}

/// Runs the whole training pipeline in-process and returns its report.
pub async fn train(State(state): State<AppState>) -> Result<String, ApiError> {
    let manager = Arc::clone(&state.manager);
    let outcome = tokio::task::spawn_blocking(move || run_pipeline(&manager, &PipelineSelection::All))
        .await
        .map_err(|e| ApiError::internal(format!("training task failed: {e}")))?;

    match outcome {
        Ok(report) if report.succeeded() => {
            state.metrics.pipeline_runs.with_label_values(&["succeeded"]).inc();
            info!(run_id = %report.run_id, "training pipeline completed");
            Ok(report.render())
        }
        Ok(report) => {
            state.metrics.pipeline_runs.with_label_values(&["aborted"]).inc();
            error!(run_id = %report.run_id, aborted_at = ?report.aborted_at, "training pipeline aborted");
            Err(ApiError::internal(report.render()))
        }
        Err(e) => {
            state.metrics.pipeline_runs.with_label_values(&["error"]).inc();
            error!(error = %e, "training pipeline failed");
            Err(e.into())
        }
    }
}

/// Plain-text dialogue in, plain-text summary out.
pub async fn predict(State(state): State<AppState>, body: String) -> Result<String, ApiError> {
    if body.trim().is_empty() {
        return Err(TextsumError::InvalidInput("Text cannot be empty".to_string()).into());
    }

    let manager = Arc::clone(&state.manager);
    let timer = state.metrics.prediction_seconds.start_timer();
    let result = tokio::task::spawn_blocking(move || -> TextsumResult<String> {
        let backend = reference_backend(&manager)?;
        PredictionService::new(manager.prediction_config(), backend).predict(&body)
    })
    .await
    .map_err(|e| ApiError::internal(format!("prediction task failed: {e}")))?;
    timer.observe_duration();

    Ok(result?)
}

pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "version": TEXTSUM_VERSION })),
    )
}

pub async fn metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .metrics
        .encode()
        .map_err(|e| ApiError::internal(format!("metrics encoding failed: {e}")))
}
