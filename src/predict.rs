// Dead-reckoning prediction
// Constant-velocity, straight-line extrapolation along a great circle.

use std::time::Duration;
use tokio::time::Instant;

use crate::fix::Fix;
use crate::geodesy;

/// Project `last` forward by `elapsed` at its own speed and bearing.
///
/// The result keeps speed and bearing and is stamped with `now`. A negative or
/// non-finite speed is treated as standing still.
pub fn predict_location(last: &Fix, elapsed: Duration, now: Instant) -> Fix {
    let speed = if last.speed.is_finite() && last.speed > 0.0 { last.speed } else { 0.0 };
    let distance = speed * elapsed.as_secs_f64();

    let (latitude, longitude) =
        geodesy::destination(last.latitude, last.longitude, last.bearing, distance);

    Fix {
        latitude,
        longitude,
        bearing: last.bearing,
        speed: last.speed,
        timestamp: now,
    }
}
