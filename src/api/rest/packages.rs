use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::rest::courier_identity;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::courier::Courier;
use crate::models::location::LocationSample;
use crate::models::package::{Package, PackageStatus};
use crate::packages::NewPackage;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/packages", post(create_package))
        .route("/packages/:tracking", get(get_package).delete(archive_package))
        .route("/packages/:tracking/assign", post(assign_package))
        .route("/packages/:tracking/unassign", post(unassign_package))
        .route("/packages/:tracking/status", post(update_status))
        .route("/packages/:tracking/location", post(submit_location))
        .route("/packages/:tracking/history", get(get_history))
}

#[derive(Deserialize)]
pub struct CreatePackageRequest {
    pub pickup_address: String,
    pub delivery_address: String,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub pickup_zone: Option<String>,
    pub weight_kg: f64,
    pub description: String,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: PackageStatus,
}

#[derive(Deserialize)]
pub struct LocationUpdateRequest {
    pub lat: f64,
    pub lng: f64,
    pub zone: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

async fn create_package(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePackageRequest>,
) -> Result<Json<Package>, AppError> {
    if payload.weight_kg <= 0.0 {
        return Err(AppError::BadRequest("weight must be > 0".to_string()));
    }

    let package = state.packages.create(NewPackage {
        pickup_address: payload.pickup_address,
        delivery_address: payload.delivery_address,
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        pickup_zone: payload.pickup_zone,
        weight_kg: payload.weight_kg,
        description: payload.description,
    });
    state.history.open(&package.tracking_number);

    Ok(Json(package))
}

async fn get_package(
    State(state): State<Arc<AppState>>,
    Path(tracking): Path<String>,
) -> Result<Json<Package>, AppError> {
    Ok(Json(state.packages.get(&tracking)?))
}

async fn assign_package(
    State(state): State<Arc<AppState>>,
    Path(tracking): Path<String>,
) -> Result<Json<Courier>, AppError> {
    let start = Instant::now();
    let result = state.engine.assign(&tracking);
    let outcome = if result.is_ok() { "success" } else { "error" };

    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome])
        .inc();

    let courier = result?;
    state
        .broadcaster
        .publish_status(&tracking, PackageStatus::Assigned);
    Ok(Json(courier))
}

async fn unassign_package(
    State(state): State<Arc<AppState>>,
    Path(tracking): Path<String>,
) -> Result<Json<Package>, AppError> {
    let package = state.engine.unassign(&tracking)?;
    state
        .broadcaster
        .publish_status(&tracking, PackageStatus::Created);
    Ok(Json(package))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(tracking): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Package>, AppError> {
    let actor = courier_identity(&headers)?;
    let package = state.engine.update_status(&tracking, payload.status, &actor)?;
    state.broadcaster.publish_status(&tracking, package.status);
    Ok(Json(package))
}

async fn submit_location(
    State(state): State<Arc<AppState>>,
    Path(tracking): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<LocationUpdateRequest>,
) -> Result<Json<LocationSample>, AppError> {
    let submitter = courier_identity(&headers)?;

    let result = state.broadcaster.publish_location(
        &tracking,
        &submitter,
        GeoPoint {
            lat: payload.lat,
            lng: payload.lng,
        },
        payload.zone,
        payload.recorded_at,
    );

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .location_updates_total
        .with_label_values(&[outcome])
        .inc();

    Ok(Json(result?))
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(tracking): Path<String>,
) -> Result<Json<Vec<LocationSample>>, AppError> {
    Ok(Json(state.history.get_history(&tracking)?))
}

async fn archive_package(
    State(state): State<Arc<AppState>>,
    Path(tracking): Path<String>,
) -> Result<Json<Package>, AppError> {
    let package = state.packages.remove(&tracking)?;
    state.history.purge(&tracking);
    Ok(Json(package))
}
