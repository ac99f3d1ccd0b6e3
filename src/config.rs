use std::time::Duration;
use clap::Parser;

use crate::constants::{PREDICT_INTERVAL_MS, STALE_AFTER_MS, UPDATE_INTERVAL_MS};
use crate::fix::LocationRequest;
use crate::tracker::TrackerConfig;

/// geotick configuration
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Connect to a host:port serving line-delimited JSON fixes.
    #[arg(long, value_name = "HOST:PORT")]
    pub provider_connect: String,

    /// Listen on a [host:]port and stream JSON state lines to clients that connect.
    #[arg(long, value_name = "ADDR")]
    pub state_listen: Vec<String>,

    /// Append published states in CSV format to a local file.
    #[arg(long, value_name = "FILE")]
    pub write_csv: Vec<String>,

    /// Serve GET /state on this port.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Minimum interval between fixes requested from the provider (ms).
    #[arg(long, default_value_t = UPDATE_INTERVAL_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub update_interval_ms: u64,

    /// Prediction loop period (ms).
    #[arg(long, default_value_t = PREDICT_INTERVAL_MS, value_parser = clap::value_parser!(u64).range(1..))]
    pub predict_interval_ms: u64,

    /// Age after which a fix is replaced by a prediction (ms).
    #[arg(long, default_value_t = STALE_AFTER_MS)]
    pub stale_after_ms: u64,

    /// Do not print each published state to the log.
    #[arg(long, default_value_t = false)]
    pub no_log_state: bool,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            request: LocationRequest::new(Duration::from_millis(self.update_interval_ms)),
            predict_interval: Duration::from_millis(self.predict_interval_ms),
            stale_after: Duration::from_millis(self.stale_after_ms),
        }
    }
}

/// Normalise a [host:]port listen address to host:port, defaulting the host to 0.0.0.0.
pub fn listen_addr(listen: &str) -> String {
    if listen.chars().all(|c| c.is_ascii_digit()) {
        format!("0.0.0.0:{}", listen)
    } else {
        listen.to_string()
    }
}
