//! Seller, make and listing handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{request_actor, AppError, AppState};
use leasesync_core::models::{Make, Seller, VehicleRecord};

/// Request body for creating a seller or make
#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

/// GET /api/sellers - List sellers
pub async fn list_sellers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Seller>>, AppError> {
    Ok(Json(state.db.list_sellers()?))
}

/// POST /api/sellers - Register a seller
pub async fn create_seller(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NameRequest>,
) -> Result<Json<Seller>, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Seller name is required"));
    }

    let seller = state.db.create_seller(name)?;

    state.db.log_audit(
        &request_actor(&headers),
        "create",
        Some("seller"),
        Some(seller.id.to_string().as_str()),
        Some(&format!("name={}", seller.name)),
    )?;

    Ok(Json(seller))
}

/// GET /api/sellers/:id/listings - Current inventory of a seller
pub async fn list_seller_listings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<VehicleRecord>>, AppError> {
    state
        .db
        .get_seller(id)?
        .ok_or_else(|| AppError::not_found("Seller not found"))?;

    Ok(Json(state.db.list_listings(id)?))
}

/// GET /api/makes - List reference makes
pub async fn list_makes(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Make>>, AppError> {
    Ok(Json(state.db.list_makes()?))
}

/// POST /api/makes - Register a make (existing names are returned as-is)
pub async fn create_make(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NameRequest>,
) -> Result<Json<Make>, AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Make name is required"));
    }

    let make = state.db.create_make(name)?;

    state.db.log_audit(
        &request_actor(&headers),
        "create",
        Some("make"),
        Some(make.id.to_string().as_str()),
        Some(&format!("name={}", make.name)),
    )?;

    Ok(Json(make))
}
