use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::{LocationStats, LocationUpdate, NearbyQuery, RegisterDriver};
use crate::error::AppError;
use crate::lifecycle;
use crate::models::driver::{Driver, GeoPoint, LocationPing, NearbyDriver, Vehicle, VehicleType};
use crate::state::AppState;

const MIN_SEARCH_RADIUS_KM: f64 = 1.0;
const MAX_SEARCH_RADIUS_KM: f64 = 50.0;
const MAX_SEARCH_LIMIT: usize = 50;
const MIN_VEHICLE_YEAR: u16 = 1900;
const MAX_VEHICLE_YEAR: u16 = 2030;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/nearby", get(search_nearby))
        .route("/drivers/:id", get(get_driver))
        .route("/drivers/:id/availability", patch(update_availability))
        .route(
            "/drivers/:id/location",
            patch(update_location).get(get_location),
        )
        .route("/drivers/:id/location/history", get(location_history))
        .route("/location/stats", get(location_stats))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub full_name: String,
    pub phone: String,
    pub license_number: String,
    pub identity_document: Option<String>,
    pub vehicle: Vehicle,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub is_available: bool,
    pub current_lat: Option<f64>,
    pub current_lng: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct NearbyParams {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<f64>,
    pub vehicle_type: Option<VehicleType>,
    pub limit: Option<usize>,
    pub available: Option<bool>,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchLocation {
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
}

#[derive(Serialize)]
pub struct NearbyResponse {
    pub search_location: SearchLocation,
    pub drivers: Vec<NearbyDriver>,
}

#[derive(Serialize)]
pub struct DriverLocationResponse {
    pub driver_id: Uuid,
    pub location: GeoPoint,
    pub last_update: Option<DateTime<Utc>>,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<Json<Driver>, AppError> {
    if payload.full_name.trim().is_empty() {
        return Err(AppError::Validation("full_name cannot be empty".to_string()));
    }
    if payload.phone.trim().is_empty() {
        return Err(AppError::Validation("phone cannot be empty".to_string()));
    }
    if payload.license_number.trim().is_empty() {
        return Err(AppError::Validation(
            "license_number cannot be empty".to_string(),
        ));
    }
    if payload.vehicle.plate_number.trim().is_empty() {
        return Err(AppError::Validation(
            "plate_number cannot be empty".to_string(),
        ));
    }
    if !(MIN_VEHICLE_YEAR..=MAX_VEHICLE_YEAR).contains(&payload.vehicle.year) {
        return Err(AppError::Validation(format!(
            "vehicle year must be between {MIN_VEHICLE_YEAR} and {MAX_VEHICLE_YEAR}"
        )));
    }

    let driver = state.directory.register(RegisterDriver {
        full_name: payload.full_name,
        phone: payload.phone,
        license_number: payload.license_number,
        identity_document: payload.identity_document,
        vehicle: payload.vehicle,
    })?;

    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    Json(state.directory.list())
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    let driver = state
        .directory
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
    Ok(Json(driver))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Driver>, AppError> {
    let location = match (payload.current_lat, payload.current_lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        _ => None,
    };

    let driver = lifecycle::set_availability(&state, id, payload.is_available, location)?;
    Ok(Json(driver))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = lifecycle::record_location(
        &state,
        id,
        LocationUpdate {
            location: GeoPoint {
                lat: payload.latitude,
                lng: payload.longitude,
            },
            accuracy: payload.accuracy,
            speed: payload.speed,
            heading: payload.heading,
            recorded_at: payload.timestamp,
        },
    )?;

    Ok(Json(driver))
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DriverLocationResponse>, AppError> {
    let driver = state
        .directory
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
    let location = driver
        .location
        .ok_or_else(|| AppError::NotFound(format!("no location recorded for driver {id}")))?;

    Ok(Json(DriverLocationResponse {
        driver_id: driver.id,
        location,
        last_update: driver.last_location_update,
    }))
}

async fn location_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<LocationPing>>, AppError> {
    let limit = params.limit.unwrap_or(50);
    let pings = state.directory.location_history(id, limit)?;
    Ok(Json(pings))
}

async fn search_nearby(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearbyParams>,
) -> Result<Json<NearbyResponse>, AppError> {
    let start = Instant::now();
    let result = run_nearby_search(&state, params);

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .nearby_search_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());

    result.map(Json)
}

fn run_nearby_search(
    state: &AppState,
    params: NearbyParams,
) -> Result<NearbyResponse, AppError> {
    let (lat, lng) = match (params.lat, params.lng) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => {
            return Err(AppError::Validation(
                "lat and lng are required for a proximity search".to_string(),
            ));
        }
    };

    let radius_km = params
        .radius
        .unwrap_or(state.config.default_search_radius_km);
    if !(MIN_SEARCH_RADIUS_KM..=MAX_SEARCH_RADIUS_KM).contains(&radius_km) {
        return Err(AppError::Validation(format!(
            "radius must be between {MIN_SEARCH_RADIUS_KM} and {MAX_SEARCH_RADIUS_KM} km"
        )));
    }

    let limit = params.limit.unwrap_or(state.config.default_search_limit);
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_SEARCH_LIMIT}"
        )));
    }

    let drivers = state.directory.find_nearby(&NearbyQuery {
        center: GeoPoint { lat, lng },
        radius_km,
        vehicle_type: params.vehicle_type,
        limit,
        require_available: params.available.unwrap_or(true),
    });

    Ok(NearbyResponse {
        search_location: SearchLocation {
            lat,
            lng,
            radius: radius_km,
        },
        drivers,
    })
}

async fn location_stats(State(state): State<Arc<AppState>>) -> Json<LocationStats> {
    Json(state.directory.stats())
}
