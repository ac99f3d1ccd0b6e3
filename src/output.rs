use std::io::Write;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info};

use crate::state::LocationState;

/// Trait for output handlers
pub trait OutputHandler: Send + Sync {
    /// Handle a newly published state
    fn handle_state(&mut self, state: &LocationState);
}

/// Dispatch every published state to `outputs` until the publisher goes away.
pub async fn run_outputs(
    mut rx: watch::Receiver<LocationState>,
    mut outputs: Vec<Box<dyn OutputHandler>>,
) {
    while rx.changed().await.is_ok() {
        let state = *rx.borrow_and_update();
        for output in outputs.iter_mut() {
            output.handle_state(&state);
        }
    }
    debug!("State publisher closed, outputs stopped");
}

/// Text output to the log, laid out like the on-screen data panel
pub struct LogOutput;

impl OutputHandler for LogOutput {
    fn handle_state(&mut self, state: &LocationState) {
        for line in state.to_string().lines() {
            info!("{}", line);
        }
    }
}

/// JSON lines fed to a broadcast channel (TCP listeners subscribe to it)
pub struct JsonLinesOutput {
    tx: Option<broadcast::Sender<Vec<u8>>>,
}

impl JsonLinesOutput {
    pub fn new(tx: Option<broadcast::Sender<Vec<u8>>>) -> Self {
        JsonLinesOutput { tx }
    }

    pub fn format_json(state: &LocationState) -> serde_json::Result<String> {
        serde_json::to_string(state)
    }
}

impl OutputHandler for JsonLinesOutput {
    fn handle_state(&mut self, state: &LocationState) {
        let json = match Self::format_json(state) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode state: {}", e);
                return;
            }
        };
        if let Some(tx) = &self.tx {
            let mut line = json.into_bytes();
            line.push(b'\n');
            // No listeners connected is fine
            let _ = tx.send(line);
        }
    }
}

/// CSV format output
pub struct CsvOutput {
    writer: std::io::BufWriter<std::fs::File>,
}

impl CsvOutput {
    pub fn new(path: &str) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(CsvOutput { writer: std::io::BufWriter::new(file) })
    }

    /// Format: utc_time,lat,lon,bearing,speed,status
    pub fn format_row(time: chrono::DateTime<chrono::Utc>, state: &LocationState) -> String {
        format!(
            "{},{:.7},{:.7},{:.1},{:.2},{}",
            time.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            state.latitude,
            state.longitude,
            state.bearing,
            state.speed,
            if state.is_predicted() { "predicted" } else { "" },
        )
    }
}

impl OutputHandler for CsvOutput {
    fn handle_state(&mut self, state: &LocationState) {
        let row = Self::format_row(chrono::Utc::now(), state);
        if let Err(e) = writeln!(self.writer, "{}", row).and_then(|_| self.writer.flush()) {
            error!("Failed to write CSV: {}", e);
        }
    }
}
