use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{haversine_km, round_km, BoundingBox};
use crate::models::driver::{Driver, GeoPoint, LocationPing, NearbyDriver, Vehicle, VehicleType};

#[derive(Debug, Clone)]
pub struct RegisterDriver {
    pub full_name: String,
    pub phone: String,
    pub license_number: String,
    pub identity_document: Option<String>,
    pub vehicle: Vehicle,
}

#[derive(Debug, Clone)]
pub struct LocationUpdate {
    pub location: GeoPoint,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NearbyQuery {
    pub center: GeoPoint,
    pub radius_km: f64,
    pub vehicle_type: Option<VehicleType>,
    pub limit: usize,
    pub require_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationStats {
    pub total_drivers: usize,
    pub active_drivers: usize,
    pub average_update_frequency: f64,
}

/// Per-driver availability and last-known position, plus the append-only
/// ping log. One snapshot row per driver; pings are capped per driver and
/// the oldest entries are dropped past the cap.
pub struct DriverDirectory {
    drivers: DashMap<Uuid, Driver>,
    history: DashMap<Uuid, VecDeque<LocationPing>>,
    history_cap: usize,
}

impl DriverDirectory {
    pub fn new(history_cap: usize) -> Self {
        Self {
            drivers: DashMap::new(),
            history: DashMap::new(),
            history_cap,
        }
    }

    /// Registers a driver together with its vehicle. Phone, license number
    /// and plate number must be unique across the directory. Registration
    /// is complete once an identity document is on file.
    pub fn register(&self, new: RegisterDriver) -> Result<Driver, AppError> {
        for entry in self.drivers.iter() {
            let existing = entry.value();
            if existing.phone == new.phone {
                return Err(AppError::Conflict(format!(
                    "a driver with phone {} already exists",
                    new.phone
                )));
            }
            if existing.license_number == new.license_number {
                return Err(AppError::Conflict(format!(
                    "a driver with license number {} already exists",
                    new.license_number
                )));
            }
            if existing.vehicle.plate_number == new.vehicle.plate_number {
                return Err(AppError::Conflict(format!(
                    "a vehicle with plate number {} already exists",
                    new.vehicle.plate_number
                )));
            }
        }

        let is_registration_complete = new.identity_document.is_some();
        let driver = Driver {
            id: Uuid::new_v4(),
            full_name: new.full_name,
            phone: new.phone,
            license_number: new.license_number,
            identity_document: new.identity_document,
            vehicle: new.vehicle,
            is_registration_complete,
            is_available: false,
            location: None,
            last_location_update: None,
            rating: 0.0,
            total_rides: 0,
            created_at: Utc::now(),
        };

        self.drivers.insert(driver.id, driver.clone());
        Ok(driver)
    }

    pub fn get(&self, driver_id: Uuid) -> Option<Driver> {
        self.drivers
            .get(&driver_id)
            .map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<Driver> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        drivers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        drivers
    }

    /// Toggles availability. Going available requires a complete
    /// registration; going unavailable never fails. A supplied position
    /// also moves the snapshot, otherwise the location is left unchanged.
    pub fn set_availability(
        &self,
        driver_id: Uuid,
        available: bool,
        location: Option<GeoPoint>,
    ) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        if available && !driver.is_registration_complete {
            return Err(AppError::Conflict(
                "driver registration must be complete to go available".to_string(),
            ));
        }

        driver.is_available = available;
        if let Some(point) = location {
            driver.location = Some(point);
            driver.last_location_update = Some(Utc::now());
        }

        Ok(driver.clone())
    }

    /// Upserts the driver's location snapshot (one row per driver,
    /// last-writer-wins) and appends to the ping log.
    pub fn update_location(
        &self,
        driver_id: Uuid,
        update: LocationUpdate,
    ) -> Result<Driver, AppError> {
        let recorded_at = update.recorded_at.unwrap_or_else(Utc::now);

        let snapshot = {
            let mut driver = self
                .drivers
                .get_mut(&driver_id)
                .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
            driver.location = Some(update.location);
            driver.last_location_update = Some(recorded_at);
            driver.clone()
        };

        let mut log = self
            .history
            .entry(driver_id)
            .or_insert_with(VecDeque::new);
        log.push_back(LocationPing {
            location: update.location,
            accuracy: update.accuracy,
            speed: update.speed,
            heading: update.heading,
            recorded_at,
        });
        while log.len() > self.history_cap {
            log.pop_front();
        }

        Ok(snapshot)
    }

    /// Ping log for a driver, newest first.
    pub fn location_history(
        &self,
        driver_id: Uuid,
        limit: usize,
    ) -> Result<Vec<LocationPing>, AppError> {
        if !self.drivers.contains_key(&driver_id) {
            return Err(AppError::NotFound(format!("driver {driver_id} not found")));
        }

        let pings = self
            .history
            .get(&driver_id)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(pings)
    }

    /// Drivers near a point, closest first. Bounding box pre-filter, then
    /// the exact haversine cutoff (the box over-selects at corners), then a
    /// stable sort: pre-round distance ascending, ties by driver id.
    pub fn find_nearby(&self, query: &NearbyQuery) -> Vec<NearbyDriver> {
        let bounds = BoundingBox::around(&query.center, query.radius_km);

        let mut candidates: Vec<(f64, NearbyDriver)> = self
            .drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                let location = driver.location?;

                if query.require_available
                    && !(driver.is_available && driver.is_registration_complete)
                {
                    return None;
                }
                if let Some(wanted) = query.vehicle_type {
                    if driver.vehicle.vehicle_type != wanted {
                        return None;
                    }
                }
                if !bounds.contains(&location) {
                    return None;
                }

                let distance = haversine_km(&query.center, &location);
                if distance > query.radius_km {
                    return None;
                }

                Some((
                    distance,
                    NearbyDriver {
                        driver_id: driver.id,
                        full_name: driver.full_name.clone(),
                        location,
                        distance_km: round_km(distance, 3),
                        is_available: driver.is_available,
                        rating: driver.rating,
                        total_rides: driver.total_rides,
                        last_update: driver.last_location_update,
                        vehicle: driver.vehicle.clone(),
                    },
                ))
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.driver_id.cmp(&b.1.driver_id))
        });
        candidates
            .into_iter()
            .take(query.limit)
            .map(|(_, driver)| driver)
            .collect()
    }

    /// Overwrites a driver's completed-ride total after a ride completes.
    pub fn set_total_rides(&self, driver_id: Uuid, total_rides: u64) -> Result<(), AppError> {
        let mut driver = self
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;
        driver.total_rides = total_rides;
        Ok(())
    }

    pub fn available_count(&self) -> usize {
        self.drivers
            .iter()
            .filter(|entry| entry.value().is_available)
            .count()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn stats(&self) -> LocationStats {
        let now = Utc::now();
        let active_cutoff = now - Duration::minutes(5);
        let frequency_cutoff = now - Duration::hours(1);

        let mut total_drivers = 0;
        let mut active_drivers = 0;
        for entry in self.drivers.iter() {
            let driver = entry.value();
            if !driver.is_registration_complete {
                continue;
            }
            total_drivers += 1;
            if driver.is_available
                && driver
                    .last_location_update
                    .is_some_and(|at| at >= active_cutoff)
            {
                active_drivers += 1;
            }
        }

        let recent_updates: usize = self
            .history
            .iter()
            .map(|log| {
                log.value()
                    .iter()
                    .rev()
                    .take_while(|ping| ping.recorded_at >= frequency_cutoff)
                    .count()
            })
            .sum();

        let average_update_frequency = if total_drivers > 0 {
            (recent_updates as f64 / total_drivers as f64 * 100.0).round() / 100.0
        } else {
            0.0
        };

        LocationStats {
            total_drivers,
            active_drivers,
            average_update_frequency,
        }
    }
}
