use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::directory::DriverDirectory;
use crate::models::passenger::Passenger;
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;
use crate::store::RideStore;

pub struct AppState {
    pub config: Config,
    pub passengers: DashMap<Uuid, Passenger>,
    pub directory: DriverDirectory,
    pub rides: RideStore,
    pub notifier: Notifier,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let directory = DriverDirectory::new(config.location_history_cap);
        let notifier = Notifier::new(config.event_buffer_size);

        Self {
            config,
            passengers: DashMap::new(),
            directory,
            rides: RideStore::new(),
            notifier,
            metrics: Metrics::new(),
        }
    }
}
