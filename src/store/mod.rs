use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ride::{Ride, RideStatus};

/// Ride records plus the uniqueness indexes that keep the lifecycle
/// invariants atomic: at most one non-terminal ride per passenger, at most
/// one bound ride per driver, and exactly one winner when several drivers
/// race to accept the same ride.
///
/// Lock discipline: an index entry guard is always dropped before the ride
/// guard is taken, and terminal release touches the indexes only after the
/// ride guard is dropped. No two guards are ever held at the same time.
pub struct RideStore {
    rides: DashMap<Uuid, Ride>,
    active_by_passenger: DashMap<Uuid, Uuid>,
    active_by_driver: DashMap<Uuid, Uuid>,
}

impl RideStore {
    pub fn new() -> Self {
        Self {
            rides: DashMap::new(),
            active_by_passenger: DashMap::new(),
            active_by_driver: DashMap::new(),
        }
    }

    /// Claims the passenger's single active-ride slot and inserts the ride.
    /// The entry lock makes the check-and-reserve atomic: of any set of
    /// concurrent creates for one passenger, exactly one wins.
    pub fn insert_active(&self, ride: Ride) -> Result<Ride, AppError> {
        match self.active_by_passenger.entry(ride.passenger_id) {
            Entry::Occupied(_) => Err(AppError::Conflict(
                "passenger already has a ride in progress".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(ride.id);
                self.rides.insert(ride.id, ride.clone());
                Ok(ride)
            }
        }
    }

    pub fn get(&self, ride_id: Uuid) -> Option<Ride> {
        self.rides.get(&ride_id).map(|entry| entry.value().clone())
    }

    /// The ride currently occupying a driver's slot, if any.
    pub fn driver_active_ride(&self, driver_id: Uuid) -> Option<Uuid> {
        self.active_by_driver
            .get(&driver_id)
            .map(|entry| *entry.value())
    }

    /// Binds a driver to a ride and moves it to ACCEPTED. The driver slot is
    /// claimed first; the status check-and-mutate then runs under the ride
    /// entry's guard, so concurrent accepts on the same ride have exactly
    /// one winner and losers fail with `Conflict`.
    pub fn try_accept(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Ride, AppError> {
        match self.active_by_driver.entry(driver_id) {
            Entry::Occupied(_) => {
                return Err(AppError::Conflict(
                    "driver already has a ride in progress".to_string(),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(ride_id);
            }
        }

        let accepted = self.bind_driver(ride_id, driver_id, now);
        if accepted.is_err() {
            self.active_by_driver
                .remove_if(&driver_id, |_, claimed| *claimed == ride_id);
        }
        accepted
    }

    fn bind_driver(
        &self,
        ride_id: Uuid,
        driver_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Ride, AppError> {
        let mut ride = self
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

        if !matches!(ride.status, RideStatus::Requested | RideStatus::Searching) {
            return Err(AppError::Conflict(format!(
                "ride cannot be accepted (status: {})",
                ride.status
            )));
        }

        ride.driver_id = Some(driver_id);
        ride.status = RideStatus::Accepted;
        ride.accepted_at.get_or_insert(now);

        Ok(ride.clone())
    }

    /// Runs `f` under the ride entry's guard. The closure must validate
    /// before mutating: returning an error leaves the ride untouched.
    pub fn with_ride_mut<T>(
        &self,
        ride_id: Uuid,
        f: impl FnOnce(&mut Ride) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut ride = self
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
        f(&mut ride)
    }

    /// Frees the uniqueness slots once a terminal status has committed.
    /// `remove_if` keeps the release idempotent and ignores slots that a
    /// newer ride has already re-claimed.
    pub fn release_terminal(&self, ride: &Ride) {
        if !ride.status.is_terminal() {
            return;
        }

        self.active_by_passenger
            .remove_if(&ride.passenger_id, |_, claimed| *claimed == ride.id);

        if let Some(driver_id) = ride.driver_id {
            self.active_by_driver
                .remove_if(&driver_id, |_, claimed| *claimed == ride.id);
        }
    }

    pub fn list_by_passenger(&self, passenger_id: Uuid) -> Vec<Ride> {
        let mut rides: Vec<Ride> = self
            .rides
            .iter()
            .filter(|entry| entry.value().passenger_id == passenger_id)
            .map(|entry| entry.value().clone())
            .collect();
        rides.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        rides
    }

    pub fn list_by_driver(&self, driver_id: Uuid) -> Vec<Ride> {
        let mut rides: Vec<Ride> = self
            .rides
            .iter()
            .filter(|entry| entry.value().driver_id == Some(driver_id))
            .map(|entry| entry.value().clone())
            .collect();
        rides.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        rides
    }

    /// Rides a driver can still pick up, oldest request first.
    pub fn list_available(&self) -> Vec<Ride> {
        let mut rides: Vec<Ride> = self
            .rides
            .iter()
            .filter(|entry| {
                matches!(
                    entry.value().status,
                    RideStatus::Requested | RideStatus::Searching
                )
            })
            .map(|entry| entry.value().clone())
            .collect();
        rides.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        rides
    }

    pub fn completed_count_for_driver(&self, driver_id: Uuid) -> u64 {
        self.rides
            .iter()
            .filter(|entry| {
                entry.value().driver_id == Some(driver_id)
                    && entry.value().status == RideStatus::Completed
            })
            .count() as u64
    }

    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }
}
