use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::courier::{Courier, VehicleKind};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(register_courier).get(list_couriers))
        .route("/couriers/:username", get(get_courier))
        .route("/couriers/:username/availability", patch(set_availability))
        .route("/couriers/:username/location", patch(update_location))
}

#[derive(Deserialize)]
pub struct RegisterCourierRequest {
    pub username: String,
    pub vehicle: VehicleKind,
}

#[derive(Deserialize)]
pub struct SetAvailabilityRequest {
    pub available: bool,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
    pub zone: Option<String>,
}

async fn register_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("username cannot be empty".to_string()));
    }

    let courier = state.registry.register(username, payload.vehicle)?;
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<Courier>> {
    Json(state.registry.list())
}

async fn get_courier(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<Courier>, AppError> {
    Ok(Json(state.registry.get(&username)?))
}

async fn set_availability(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Json(payload): Json<SetAvailabilityRequest>,
) -> Result<Json<Courier>, AppError> {
    let courier = state.registry.set_available(&username, payload.available)?;
    Ok(Json(courier))
}

/// Idle position report, not tied to a package. Delivery-scoped updates go
/// through the package location endpoint, which gates on the assignment.
async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Courier>, AppError> {
    let courier = state
        .registry
        .update_location(&username, payload.location, payload.zone)?;
    Ok(Json(courier))
}
