use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Requested,
    Searching,
    Accepted,
    Arriving,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    /// Terminal statuses have no outgoing transitions and release the
    /// passenger's and driver's active-ride slots.
    pub fn is_terminal(self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RideStatus::Requested => "REQUESTED",
            RideStatus::Searching => "SEARCHING",
            RideStatus::Accepted => "ACCEPTED",
            RideStatus::Arriving => "ARRIVING",
            RideStatus::InProgress => "IN_PROGRESS",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single requested transport from pickup to dropoff. Mutated only through
/// validated status transitions; never deleted, terminal rides are kept for
/// history. Each timestamp is written at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: GeoPoint,
    pub pickup_address: String,
    pub dropoff: GeoPoint,
    pub dropoff_address: String,
    pub distance_km: f64,
    pub duration_min: Option<u32>,
    pub price: f64,
    pub status: RideStatus,
    pub cancel_reason: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}
