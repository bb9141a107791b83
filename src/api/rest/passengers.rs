use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::passenger::Passenger;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/passengers", post(register_passenger))
        .route("/passengers/:id", get(get_passenger))
}

#[derive(Deserialize)]
pub struct RegisterPassengerRequest {
    pub name: String,
    pub phone: String,
}

async fn register_passenger(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPassengerRequest>,
) -> Result<Json<Passenger>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if payload.phone.trim().is_empty() {
        return Err(AppError::Validation("phone cannot be empty".to_string()));
    }

    let passenger = Passenger {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        created_at: Utc::now(),
    };

    state.passengers.insert(passenger.id, passenger.clone());
    Ok(Json(passenger))
}

async fn get_passenger(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Passenger>, AppError> {
    let passenger = state
        .passengers
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("passenger {id} not found")))?;
    Ok(Json(passenger))
}
