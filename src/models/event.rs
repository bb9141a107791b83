use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event fanned out over the realtime broadcast channel. `room` scopes
/// delivery: connected clients only see the rooms they subscribed to.
#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent {
    pub room: String,
    pub event: &'static str,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

pub mod events {
    pub const RIDE_REQUESTED: &str = "ride-requested";
    pub const RIDE_STATUS_UPDATED: &str = "ride-status-updated";
    pub const DRIVER_LOCATION_UPDATED: &str = "driver-location-updated";
    pub const NEW_NOTIFICATION: &str = "new-notification";
}

pub mod rooms {
    use uuid::Uuid;

    pub const DRIVERS: &str = "drivers";
    pub const PASSENGERS: &str = "passengers";

    pub fn ride(id: Uuid) -> String {
        format!("ride:{id}")
    }

    pub fn driver(id: Uuid) -> String {
        format!("driver:{id}")
    }

    pub fn user(id: Uuid) -> String {
        format!("user:{id}")
    }
}

/// In-app inbox record, written by the notification sink alongside the
/// realtime event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
