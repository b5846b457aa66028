//! Request handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::pipeline::{ClipRequest, ClipResult};

/// The only clip format we produce
const SUPPORTED_FORMAT: &str = "mp3";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoRequest {
    pub url: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoResponse {
    pub success: bool,
    pub download_url: String,
}

/// Non-blank field value
fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ProcessVideoRequest {
    fn into_clip_request(self) -> ApiResult<ClipRequest> {
        if let Some(format) = self.format.as_deref() {
            if !format.trim().eq_ignore_ascii_case(SUPPORTED_FORMAT) {
                return Err(ApiError::bad_request(format!(
                    "Unsupported format '{}'. Only {} clips are supported.",
                    format, SUPPORTED_FORMAT
                )));
            }
        }

        match (required(self.url), required(self.start_time), required(self.end_time)) {
            (Some(url), Some(start_time), Some(end_time)) => Ok(ClipRequest::new(url.trim(), start_time, end_time)),
            _ => Err(ApiError::bad_request("Missing required parameters.")),
        }
    }
}

/// POST /process-video
pub async fn process_video(
    State(state): State<AppState>,
    payload: Result<Json<ProcessVideoRequest>, JsonRejection>,
) -> ApiResult<Json<ProcessVideoResponse>> {
    let Json(payload) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    tracing::info!("Received a request for an audio clip");
    let request = payload.into_clip_request()?;
    tracing::info!(
        "Params: URL={}, Start={}, End={}",
        request.source_url,
        request.start_time,
        request.end_time
    );

    // The run lives on its own task so a client disconnect cannot cut it short
    let pipeline = Arc::clone(&state.pipeline);
    let run = tokio::spawn(async move { pipeline.run(request).await })
        .await
        .map_err(|e| ApiError::internal(format!("clip task failed: {}", e)))?;

    match run.result {
        ClipResult::Success { download_url } => Ok(Json(ProcessVideoResponse {
            success: true,
            download_url,
        })),
        ClipResult::Failure { message } => Err(ApiError::Pipeline(message)),
    }
}

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
