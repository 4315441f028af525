//! Great-circle distance and arrival-time estimation.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS-84 coordinate pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

impl Point {
    /// Construct a point from latitude/longitude degrees.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Great-circle distance between two points in kilometres (haversine).
#[must_use]
pub fn haversine_km(a: Point, b: Point) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Estimated minutes to cover `distance_km` at `average_speed_kmh`.
///
/// Rounded to the nearest whole minute.
#[must_use]
pub fn eta_minutes(distance_km: f64, average_speed_kmh: f64) -> u32 {
    if average_speed_kmh <= 0.0 {
        return 0;
    }
    let minutes = distance_km / average_speed_kmh * 60.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        minutes.round().max(0.0) as u32
    }
}
