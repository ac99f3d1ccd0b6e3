// Shared constants for tracking and prediction

/// Mean earth radius for the spherical projection (m).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Minimum interval between provider fixes (ms). 1 Hz.
pub const UPDATE_INTERVAL_MS: u64 = 1000;

/// Prediction loop tick (ms).
pub const PREDICT_INTERVAL_MS: u64 = 1000;

/// A real fix older than this is stale and gets replaced by a prediction (ms).
pub const STALE_AFTER_MS: u64 = 3000;

/// Caveat shown next to a predicted position.
pub const PREDICTED_CAVEAT: &str = "Using predicted location";

/// Base delay before reconnecting to the fix feed (s), fuzzed by +/-10%.
pub const RECONNECT_DELAY_SECS: f64 = 5.0;

/// Timeout for the one-shot readiness probe (ms).
pub const SETTINGS_PROBE_TIMEOUT_MS: u64 = 2000;

/// Heartbeat interval for TCP state listeners (s).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
