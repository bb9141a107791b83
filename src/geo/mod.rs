use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Kilometers per degree of latitude, used by the bounding-box pre-filter.
const KM_PER_DEGREE: f64 = 111.32;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Rectangular pre-filter around a point. The box over-selects at the
/// corners, so callers must apply the exact haversine cutoff afterwards.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(center: &GeoPoint, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE;
        let lng_delta = radius_km / (KM_PER_DEGREE * center.lat.to_radians().cos());

        Self {
            min_lat: center.lat - lat_delta,
            max_lat: center.lat + lat_delta,
            min_lng: center.lng - lng_delta,
            max_lng: center.lng + lng_delta,
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }
}

/// Rounds a distance for display. Sorting and radius filtering always use
/// the pre-round value.
pub fn round_km(distance_km: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (distance_km * factor).round() / factor
}
