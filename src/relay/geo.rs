//! Great-circle distance and travel-time estimates.

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// ETA reported when the assumed speed cannot reach the target.
pub const UNREACHABLE_ETA_MINUTES: f64 = 999.0;

/// Haversine distance between two points given in degrees.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    // Rounding can push `a` a hair above 1 for antipodal points
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Minutes needed to cover the great-circle distance at `speed_kmh`,
/// rounded to one decimal.
///
/// A non-positive speed yields [`UNREACHABLE_ETA_MINUTES`].
pub fn eta_minutes(lat1: f64, lon1: f64, lat2: f64, lon2: f64, speed_kmh: f64) -> f64 {
    if speed_kmh <= 0.0 {
        return UNREACHABLE_ETA_MINUTES;
    }
    let hours = distance_km(lat1, lon1, lat2, lon2) / speed_kmh;
    round_to(hours * 60.0, 1)
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
