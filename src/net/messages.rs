// JSON message type definitions
// Defines the fix feed protocol: one request line from us, then line-delimited fixes.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::fix::{Fix, LocationRequest, LocationResult, Priority};

/// A fix as reported on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixReport {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub bearing: f64,
    #[serde(default)]
    pub speed: f64,
}

impl FixReport {
    /// Convert to a fix stamped `now`. Bearing is folded into [0, 360).
    /// Returns None for coordinates off the globe or a negative speed.
    pub fn into_fix(self, now: Instant) -> Option<Fix> {
        let bearing = self.bearing.rem_euclid(360.0);
        let fix = Fix::new(self.lat, self.lon, bearing, self.speed, now);
        fix.is_valid().then_some(fix)
    }
}

/// Messages sent from the feed to us: a single fix or a batch
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FeedMessage {
    Batch { locations: Vec<FixReport> },
    Single(FixReport),
}

impl FeedMessage {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// Valid fixes of this message, stamped `now`, plus the count of rejected ones
    pub fn into_result(self, now: Instant) -> (LocationResult, usize) {
        let reports = match self {
            FeedMessage::Batch { locations } => locations,
            FeedMessage::Single(report) => vec![report],
        };
        let total = reports.len();
        let locations: Vec<Fix> = reports.into_iter().filter_map(|r| r.into_fix(now)).collect();
        let rejected = total - locations.len();
        (LocationResult::new(locations), rejected)
    }
}

/// Messages sent from us to the feed
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Subscription parameters, sent once after connecting
    Request {
        interval_ms: u64,
        priority: Priority,
    },
}

impl From<&LocationRequest> for ClientMessage {
    fn from(request: &LocationRequest) -> Self {
        ClientMessage::Request {
            interval_ms: u64::try_from(request.interval.as_millis()).unwrap_or(u64::MAX),
            priority: request.priority,
        }
    }
}
