//! Apply-changes handler
//!
//! Validation failures are rejected before anything is touched. Once
//! processing starts, per-change failures are reported inside a 200 response.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{AppError, AppState};
use leasesync_core::models::{ApplyRequest, ApplyResult};

/// Request body for applying selected changes
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyChangesRequest {
    pub session_id: Option<String>,
    pub selected_change_ids: Option<Vec<String>>,
    pub applied_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplyChangesResponse {
    pub success: bool,
    pub result: ApplyResult,
}

/// POST /api/apply-changes - Apply the operator's selection for a session
pub async fn apply_changes(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ApplyChangesRequest>, JsonRejection>,
) -> Result<Json<ApplyChangesResponse>, AppError> {
    let Json(req) = body.map_err(|e| AppError::bad_request(&e.body_text()))?;

    let session_id = req
        .session_id
        .ok_or_else(|| AppError::bad_request("sessionId is required"))?;
    let change_ids = req
        .selected_change_ids
        .ok_or_else(|| AppError::bad_request("selectedChangeIds is required"))?;

    let request = ApplyRequest::parse(
        &session_id,
        &change_ids,
        req.applied_by.as_deref().unwrap_or_default(),
    )
    .map_err(AppError::from_core)?;

    info!(
        session = %request.session_id,
        selected = request.change_ids.len(),
        applied_by = %request.applied_by,
        "Applying changes"
    );

    let result = state
        .db
        .apply_changes(&request)
        .map_err(AppError::from_core)?;

    Ok(Json(ApplyChangesResponse {
        success: true,
        result,
    }))
}
