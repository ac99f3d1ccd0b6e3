// Geodesy module - spherical-earth distance and destination calculations
//
// All public functions take and return degrees; radians are used internally.

use std::f64::consts::PI;

use crate::constants::EARTH_RADIUS_M;

/// Degrees to radians conversion factor
const DTOR: f64 = PI / 180.0;

/// Radians to degrees conversion factor
const RTOD: f64 = 180.0 / PI;

/// Returns great-circle distance in meters between two lat/lon points
///
/// **Assumes spherical Earth**. Accuracy is ~0.5% for most purposes.
///
/// # Arguments
/// * `lat0`, `lon0` - First point (latitude, longitude) in degrees
/// * `lat1`, `lon1` - Second point (latitude, longitude) in degrees
///
/// # Example
/// ```
/// let distance = geotick::geodesy::greatcircle(51.5, -0.1, 48.8, 2.3); // London to Paris
/// ```
pub fn greatcircle(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> f64 {
    let lat0_rad = lat0 * DTOR;
    let lon0_rad = lon0 * DTOR;
    let lat1_rad = lat1 * DTOR;
    let lon1_rad = lon1 * DTOR;

    let cos_angle = lat0_rad.sin() * lat1_rad.sin()
        + lat0_rad.cos() * lat1_rad.cos() * (lon0_rad - lon1_rad).abs().cos();

    // Rounding can push identical points just past 1.0
    EARTH_RADIUS_M * cos_angle.clamp(-1.0, 1.0).acos()
}

/// Returns the point reached by travelling `distance` meters from (lat, lon)
/// along the great circle with initial `bearing` (degrees clockwise from north).
///
/// A zero distance returns the start point unchanged. Longitude is wrapped
/// back into [-180, 180] only when the projection leaves that range.
///
/// # Example
/// ```
/// let (lat, lon) = geotick::geodesy::destination(0.0, 0.0, 90.0, 111_195.0);
/// assert!(lat.abs() < 1e-9);
/// assert!((lon - 1.0).abs() < 1e-3);
/// ```
pub fn destination(lat: f64, lon: f64, bearing: f64, distance: f64) -> (f64, f64) {
    if distance == 0.0 {
        return (lat, lon);
    }

    let lat1 = lat * DTOR;
    let lon1 = lon * DTOR;
    let theta = bearing * DTOR;
    let delta = distance / EARTH_RADIUS_M;

    let (sin_lat1, cos_lat1) = lat1.sin_cos();
    let (sin_delta, cos_delta) = delta.sin_cos();

    let lat2 = (sin_lat1 * cos_delta + cos_lat1 * sin_delta * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * sin_delta * cos_lat1).atan2(cos_delta - sin_lat1 * lat2.sin());

    (lat2 * RTOD, wrap_longitude(lon2 * RTOD))
}

#[inline]
fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}
