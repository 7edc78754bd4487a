//! Extraction session handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{request_actor, AppError, AppState};
use leasesync_core::models::{
    ChangeFilter, ExtractionChange, ExtractionSession, ReconciliationSummary, VehicleRecord,
};
use leasesync_core::Reconciler;

/// Request body for reconciling an extracted batch
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub seller_id: Uuid,
    pub records: Vec<VehicleRecord>,
}

/// POST /api/sessions - Reconcile a batch against the seller's inventory
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<ReconciliationSummary>, AppError> {
    let actor = request_actor(&headers);

    let summary = Reconciler::with_config(&state.db, state.config.reconcile.clone())
        .run(req.seller_id, &req.records, &actor)
        .map_err(AppError::from_core)?;

    Ok(Json(summary))
}

/// Query parameters for listing sessions
#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    /// Filter by seller
    pub seller_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<ExtractionSession>,
    pub total: i64,
}

/// GET /api/sessions - List sessions, newest first
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SessionsQuery>,
) -> Result<Json<SessionsResponse>, AppError> {
    let limit = state.config.clamp_limit(params.limit);

    let sessions = state
        .db
        .list_sessions(params.seller_id, limit, params.offset.max(0))?;
    let total = state.db.count_sessions(params.seller_id)?;

    Ok(Json(SessionsResponse { sessions, total }))
}

/// GET /api/sessions/:id - Get a single session with its counters
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExtractionSession>, AppError> {
    let session = state
        .db
        .get_session(id)?
        .ok_or_else(|| AppError::not_found("Session not found"))?;

    Ok(Json(session))
}

/// Query parameters for listing a session's changes
#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    /// create, update, delete or unchanged
    pub change_type: Option<String>,
    /// pending, selected, applied, discarded or failed
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct ChangesResponse {
    pub changes: Vec<ExtractionChange>,
    pub total: i64,
}

/// GET /api/sessions/:id/changes - Page through a session's changes
pub async fn list_session_changes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<ChangesQuery>,
) -> Result<Json<ChangesResponse>, AppError> {
    let limit = state.config.clamp_limit(params.limit);

    state
        .db
        .get_session(id)?
        .ok_or_else(|| AppError::not_found("Session not found"))?;

    let filter = ChangeFilter {
        change_type: params
            .change_type
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e: String| AppError::bad_request(&e))?,
        status: params
            .status
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e: String| AppError::bad_request(&e))?,
    };

    let changes = state
        .db
        .list_changes(id, &filter, limit, params.offset.max(0))?;
    let total = state.db.count_changes(id, &filter)?;

    Ok(Json(ChangesResponse { changes, total }))
}
