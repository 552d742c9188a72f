use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use axum_typed_multipart::{TypedMultipart, TypedMultipartError};
use chrono::{SecondsFormat, Utc};

use super::error::{form_error, Result};
use super::state::AppState;
use super::types::*;

/// Compare the faces in `realMedia` and `fakeMedia`.
pub async fn detect_handler(
    State(state): State<Arc<AppState>>,
    form: std::result::Result<TypedMultipart<DetectRequest>, TypedMultipartError>,
) -> Result<Json<DetectResponse>> {
    let limit = state.orchestrator.limits().max_upload_bytes;
    let TypedMultipart(form) = form.map_err(|e| form_error(e, limit))?;
    let result = state
        .orchestrator
        .run(to_upload(form.real_media), to_upload(form.fake_media))
        .await?;
    Ok(Json(result.into()))
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
