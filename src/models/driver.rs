use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Owned,
    Rental,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub brand: String,
    pub model: String,
    pub color: String,
    pub year: u16,
    pub plate_number: String,
    pub city: String,
    pub vehicle_type: VehicleType,
}

/// A driver together with its current availability and last-known position.
/// The position fields are a point-in-time snapshot, not a history log; the
/// append-only ping log lives in the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub license_number: String,
    pub identity_document: Option<String>,
    pub vehicle: Vehicle,
    pub is_registration_complete: bool,
    pub is_available: bool,
    pub location: Option<GeoPoint>,
    pub last_location_update: Option<DateTime<Utc>>,
    pub rating: f64,
    pub total_rides: u64,
    pub created_at: DateTime<Utc>,
}

/// One entry of the append-only location ping log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationPing {
    pub location: GeoPoint,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Candidate returned by a proximity search. `distance_km` is rounded for
/// display; sorting and the radius cutoff use the pre-round value.
#[derive(Debug, Clone, Serialize)]
pub struct NearbyDriver {
    pub driver_id: Uuid,
    pub full_name: String,
    pub location: GeoPoint,
    pub distance_km: f64,
    pub is_available: bool,
    pub rating: f64,
    pub total_rides: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub vehicle: Vehicle,
}
