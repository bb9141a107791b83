use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::lifecycle::{self, AcceptRide, CreateRide};
use crate::models::driver::GeoPoint;
use crate::models::ride::{Ride, RideStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(create_ride))
        .route("/rides/available", get(available_rides))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/accept", post(accept_ride))
        .route("/rides/:id/status", patch(update_ride_status))
        .route("/rides/passenger/:passenger_id", get(rides_by_passenger))
        .route("/rides/driver/:driver_id", get(rides_by_driver))
}

#[derive(Deserialize)]
pub struct CreateRideRequest {
    pub passenger_id: Uuid,
    pub pickup: GeoPoint,
    pub pickup_address: String,
    pub dropoff: GeoPoint,
    pub dropoff_address: String,
    pub price: f64,
    pub distance_km: Option<f64>,
    pub duration_min: Option<u32>,
}

#[derive(Deserialize)]
pub struct AcceptRideRequest {
    pub driver_id: Uuid,
    pub current_lat: Option<f64>,
    pub current_lng: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateRideStatusRequest {
    pub status: RideStatus,
    pub cancel_reason: Option<String>,
}

async fn create_ride(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRideRequest>,
) -> Result<Json<Ride>, AppError> {
    let ride = lifecycle::create_ride(
        &state,
        CreateRide {
            passenger_id: payload.passenger_id,
            pickup: payload.pickup,
            pickup_address: payload.pickup_address,
            dropoff: payload.dropoff,
            dropoff_address: payload.dropoff_address,
            price: payload.price,
            distance_km: payload.distance_km,
            duration_min: payload.duration_min,
        },
    )?;
    Ok(Json(ride))
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = state
        .rides
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))?;
    Ok(Json(ride))
}

async fn accept_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRideRequest>,
) -> Result<Json<Ride>, AppError> {
    let ride = lifecycle::accept_ride(
        &state,
        id,
        AcceptRide {
            driver_id: payload.driver_id,
            current_lat: payload.current_lat,
            current_lng: payload.current_lng,
        },
    )?;
    Ok(Json(ride))
}

async fn update_ride_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRideStatusRequest>,
) -> Result<Json<Ride>, AppError> {
    let ride = lifecycle::update_status(&state, id, payload.status, payload.cancel_reason)?;
    Ok(Json(ride))
}

async fn available_rides(State(state): State<Arc<AppState>>) -> Json<Vec<Ride>> {
    Json(state.rides.list_available())
}

async fn rides_by_passenger(
    State(state): State<Arc<AppState>>,
    Path(passenger_id): Path<Uuid>,
) -> Json<Vec<Ride>> {
    Json(state.rides.list_by_passenger(passenger_id))
}

async fn rides_by_driver(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<Uuid>,
) -> Json<Vec<Ride>> {
    Json(state.rides.list_by_driver(driver_id))
}
