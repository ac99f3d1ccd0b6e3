// Position fixes and location requests
// A Fix is an immutable sample, either reported by a provider or synthesized by prediction.

use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::constants::UPDATE_INTERVAL_MS;

/// A single reported or synthesized position/velocity sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Heading in degrees clockwise from north
    pub bearing: f64,
    /// Ground speed in m/s
    pub speed: f64,
    /// Monotonic time the fix was taken
    pub timestamp: Instant,
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64, bearing: f64, speed: f64, timestamp: Instant) -> Self {
        Fix { latitude, longitude, bearing, speed, timestamp }
    }

    /// Coordinates are finite and on the globe, speed is non-negative.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.bearing.is_finite()
            && self.speed.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.speed >= 0.0
    }
}

/// Batch of fixes delivered by one provider callback. Only the last one matters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationResult {
    pub locations: Vec<Fix>,
}

impl LocationResult {
    pub fn new(locations: Vec<Fix>) -> Self {
        LocationResult { locations }
    }

    pub fn last_location(&self) -> Option<Fix> {
        self.locations.last().copied()
    }
}

impl From<Fix> for LocationResult {
    fn from(fix: Fix) -> Self {
        LocationResult { locations: vec![fix] }
    }
}

/// Accuracy/power trade-off asked of the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    HighAccuracy,
    Balanced,
    LowPower,
}

/// Parameters for a provider subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationRequest {
    /// Minimum spacing between delivered fixes
    pub interval: Duration,
    pub priority: Priority,
}

impl LocationRequest {
    pub fn new(interval: Duration) -> Self {
        LocationRequest { interval, priority: Priority::default() }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for LocationRequest {
    fn default() -> Self {
        LocationRequest::new(Duration::from_millis(UPDATE_INTERVAL_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_request_is_1hz_high_accuracy() {
        let request = LocationRequest::default();
        assert_eq!(request.interval, Duration::from_secs(1));
        assert_eq!(request.priority, Priority::HighAccuracy);
    }

    #[test]
    fn test_last_location_of_batch() {
        let now = Instant::now();
        let result = LocationResult::new(vec![
            Fix::new(1.0, 2.0, 0.0, 0.0, now),
            Fix::new(3.0, 4.0, 90.0, 1.5, now),
        ]);
        let last = result.last_location().unwrap();
        assert_eq!(last.latitude, 3.0);
        assert_eq!(last.longitude, 4.0);
        assert!(LocationResult::default().last_location().is_none());
    }

    #[test]
    fn test_fix_validity() {
        let now = Instant::now();
        assert!(Fix::new(45.0, -120.0, 10.0, 3.0, now).is_valid());
        assert!(!Fix::new(91.0, 0.0, 0.0, 0.0, now).is_valid());
        assert!(!Fix::new(0.0, 180.5, 0.0, 0.0, now).is_valid());
        assert!(!Fix::new(0.0, 0.0, 0.0, -1.0, now).is_valid());
        assert!(!Fix::new(f64::NAN, 0.0, 0.0, 0.0, now).is_valid());
    }

    #[test]
    fn test_priority_serializes_snake_case() {
        let json = serde_json::to_string(&Priority::HighAccuracy).unwrap();
        assert_eq!(json, "\"high_accuracy\"");
    }
}
