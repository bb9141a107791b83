pub mod transitions;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::directory::LocationUpdate;
use crate::error::AppError;
use crate::geo::{haversine_km, round_km};
use crate::models::driver::{Driver, GeoPoint};
use crate::models::event::{events, rooms};
use crate::models::ride::{Ride, RideStatus};
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct CreateRide {
    pub passenger_id: Uuid,
    pub pickup: GeoPoint,
    pub pickup_address: String,
    pub dropoff: GeoPoint,
    pub dropoff_address: String,
    pub price: f64,
    pub distance_km: Option<f64>,
    pub duration_min: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AcceptRide {
    pub driver_id: Uuid,
    pub current_lat: Option<f64>,
    pub current_lng: Option<f64>,
}

/// Creates a ride in REQUESTED. The passenger's active-ride slot is claimed
/// atomically by the store, so two racing requests cannot both succeed.
pub fn create_ride(state: &AppState, request: CreateRide) -> Result<Ride, AppError> {
    if !state.passengers.contains_key(&request.passenger_id) {
        return Err(AppError::NotFound(format!(
            "passenger {} not found",
            request.passenger_id
        )));
    }
    if request.price < 0.0 {
        return Err(AppError::Validation(
            "price must be non-negative".to_string(),
        ));
    }

    let distance_km = request
        .distance_km
        .unwrap_or_else(|| round_km(haversine_km(&request.pickup, &request.dropoff), 2));

    let ride = Ride {
        id: Uuid::new_v4(),
        passenger_id: request.passenger_id,
        driver_id: None,
        pickup: request.pickup,
        pickup_address: request.pickup_address,
        dropoff: request.dropoff,
        dropoff_address: request.dropoff_address,
        distance_km,
        duration_min: request.duration_min,
        price: request.price,
        status: RideStatus::Requested,
        cancel_reason: None,
        requested_at: Utc::now(),
        accepted_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
    };

    let ride = state.rides.insert_active(ride)?;

    state
        .metrics
        .rides_total
        .with_label_values(&[ride.status.as_str()])
        .inc();
    state.notifier.broadcast(
        rooms::DRIVERS.to_string(),
        events::RIDE_REQUESTED,
        json!({
            "ride_id": ride.id,
            "passenger_id": ride.passenger_id,
            "pickup_address": ride.pickup_address,
            "dropoff_address": ride.dropoff_address,
            "distance_km": ride.distance_km,
            "price": ride.price,
        }),
    );

    info!(ride_id = %ride.id, passenger_id = %ride.passenger_id, "ride requested");
    Ok(ride)
}

/// Binds a driver to a ride. The early checks give callers the expected
/// error precedence; the store re-validates atomically, so of any set of
/// concurrent accepts on one ride exactly one wins.
///
/// The driver's availability flag is left untouched: double-booking is
/// prevented by the driver's active-ride slot, not the flag.
pub fn accept_ride(state: &AppState, ride_id: Uuid, request: AcceptRide) -> Result<Ride, AppError> {
    let ride = state
        .rides
        .get(ride_id)
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
    if !matches!(ride.status, RideStatus::Requested | RideStatus::Searching) {
        return Err(AppError::Conflict(format!(
            "ride cannot be accepted (status: {})",
            ride.status
        )));
    }

    let driver = state
        .directory
        .get(request.driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", request.driver_id)))?;
    if !driver.is_available {
        return Err(AppError::Conflict("driver is not available".to_string()));
    }
    if !driver.is_registration_complete {
        return Err(AppError::Conflict(
            "driver registration is not complete".to_string(),
        ));
    }

    // move the driver snapshot before the ride commits
    if let (Some(lat), Some(lng)) = (request.current_lat, request.current_lng) {
        record_location(
            state,
            request.driver_id,
            LocationUpdate {
                location: GeoPoint { lat, lng },
                accuracy: None,
                speed: None,
                heading: None,
                recorded_at: None,
            },
        )?;
    }

    let ride = state
        .rides
        .try_accept(ride_id, request.driver_id, Utc::now())?;

    state
        .metrics
        .rides_total
        .with_label_values(&[ride.status.as_str()])
        .inc();
    state.notifier.notify_user(
        ride.passenger_id,
        "Driver found",
        &format!("{} is on the way", driver.full_name),
    );
    state.notifier.broadcast(
        rooms::ride(ride.id),
        events::RIDE_STATUS_UPDATED,
        json!({
            "ride_id": ride.id,
            "status": ride.status,
            "driver_id": ride.driver_id,
        }),
    );

    info!(ride_id = %ride.id, driver_id = %request.driver_id, "ride accepted");
    Ok(ride)
}

/// Applies a validated status transition. Timestamps are first-write-wins:
/// ARRIVING stamps `started_at` (driver en route) and the IN_PROGRESS
/// transition leaves an existing value untouched.
pub fn update_status(
    state: &AppState,
    ride_id: Uuid,
    new_status: RideStatus,
    cancel_reason: Option<String>,
) -> Result<Ride, AppError> {
    let now = Utc::now();

    let ride = state.rides.with_ride_mut(ride_id, |ride| {
        transitions::ensure_allowed(ride.status, new_status)?;

        ride.status = new_status;
        match new_status {
            RideStatus::Accepted => {
                ride.accepted_at.get_or_insert(now);
            }
            RideStatus::Arriving | RideStatus::InProgress => {
                ride.started_at.get_or_insert(now);
            }
            RideStatus::Completed => {
                ride.completed_at.get_or_insert(now);
            }
            RideStatus::Cancelled => {
                ride.cancelled_at.get_or_insert(now);
                ride.cancel_reason = cancel_reason.clone();
            }
            RideStatus::Requested | RideStatus::Searching => {}
        }

        Ok(ride.clone())
    })?;

    state.rides.release_terminal(&ride);

    if ride.status == RideStatus::Completed {
        if let Some(driver_id) = ride.driver_id {
            refresh_driver_stats(state, driver_id);
        }
    }

    state
        .metrics
        .rides_total
        .with_label_values(&[ride.status.as_str()])
        .inc();
    state.notifier.broadcast(
        rooms::ride(ride.id),
        events::RIDE_STATUS_UPDATED,
        json!({
            "ride_id": ride.id,
            "status": ride.status,
            "driver_id": ride.driver_id,
            "cancel_reason": ride.cancel_reason,
        }),
    );

    info!(ride_id = %ride.id, status = %ride.status, "ride status updated");
    Ok(ride)
}

/// Records a location ping: snapshot upsert, history append, then fan-out
/// to the driver's room and, when the driver is on a ride, the ride's room.
pub fn record_location(
    state: &AppState,
    driver_id: Uuid,
    update: LocationUpdate,
) -> Result<Driver, AppError> {
    let driver = state.directory.update_location(driver_id, update)?;
    state.metrics.location_updates_total.inc();

    let payload = json!({
        "driver_id": driver.id,
        "location": driver.location,
        "recorded_at": driver.last_location_update,
    });
    state.notifier.broadcast(
        rooms::driver(driver.id),
        events::DRIVER_LOCATION_UPDATED,
        payload.clone(),
    );
    if let Some(ride_id) = state.rides.driver_active_ride(driver_id) {
        state
            .notifier
            .broadcast(rooms::ride(ride_id), events::DRIVER_LOCATION_UPDATED, payload);
    }

    Ok(driver)
}

/// Toggles availability and keeps the gauge in step.
pub fn set_availability(
    state: &AppState,
    driver_id: Uuid,
    available: bool,
    location: Option<GeoPoint>,
) -> Result<Driver, AppError> {
    let driver = state
        .directory
        .set_availability(driver_id, available, location)?;
    state
        .metrics
        .drivers_available
        .set(state.directory.available_count() as i64);

    info!(driver_id = %driver.id, available = driver.is_available, "driver availability updated");
    Ok(driver)
}

fn refresh_driver_stats(state: &AppState, driver_id: Uuid) {
    let completed = state.rides.completed_count_for_driver(driver_id);
    if let Err(err) = state.directory.set_total_rides(driver_id, completed) {
        // stats refresh is a side effect; the completed ride stands
        warn!(driver_id = %driver_id, error = %err, "failed to refresh driver stats");
    }
}
