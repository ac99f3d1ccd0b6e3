// Fix feed client
// Location provider backed by a line-delimited JSON feed over TCP, with reconnects.

use std::io;
use std::sync::Mutex;
use std::time::Duration;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::messages::{ClientMessage, FeedMessage};
use crate::constants::{RECONNECT_DELAY_SECS, SETTINGS_PROBE_TIMEOUT_MS};
use crate::fix::LocationRequest;
use crate::provider::{LocationProvider, ProviderError, SettingsError};
use crate::tracker::FixSink;

/// Random value in [0.9*t, 1.1*t], so reconnecting clients spread out.
fn fuzzy(t: f64) -> f64 {
    rand::thread_rng().gen_range(0.9 * t..=1.1 * t)
}

/// Drops fixes that arrive faster than the requested interval.
///
/// A 10% slack keeps a feed running at exactly the requested rate from losing
/// every other fix to jitter.
#[derive(Debug)]
pub struct Throttle {
    min_gap: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Throttle { min_gap: interval.mul_f64(0.9), last: None }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.min_gap {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

struct FeedTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Provider that reads fixes from `host:port`
pub struct TcpFixProvider {
    addr: String,
    reconnect_delay: Duration,
    task: Mutex<Option<FeedTask>>,
}

impl TcpFixProvider {
    pub fn new(addr: impl Into<String>) -> Self {
        TcpFixProvider {
            addr: addr.into(),
            reconnect_delay: Duration::from_secs_f64(RECONNECT_DELAY_SECS),
            task: Mutex::new(None),
        }
    }

    /// Base delay before reconnecting, jittered by ±10% on each attempt.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_subscribed(&self) -> bool {
        match self.task.lock() {
            Ok(task) => task.as_ref().is_some_and(|t| !t.handle.is_finished()),
            Err(_) => false,
        }
    }

    /// One-shot readiness probe: can the feed be reached at all?
    ///
    /// The readiness connection is closed with a clean shutdown before any request is
    /// sent, so the feed sees a client that connects and leaves without a request line.
    pub async fn check_settings(&self) -> Result<(), SettingsError> {
        let timeout = Duration::from_millis(SETTINGS_PROBE_TIMEOUT_MS);
        match tokio::time::timeout(timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(mut stream)) => {
                let _ = stream.shutdown().await;
                Ok(())
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                Err(SettingsError::Resolvable {
                    resolution: format!("start the location source at {}", self.addr),
                })
            }
            Ok(Err(e)) => Err(SettingsError::Unavailable(format!("{}: {}", self.addr, e))),
            Err(_) => Err(SettingsError::Unavailable(format!("{}: connect timed out", self.addr))),
        }
    }
}

impl LocationProvider for TcpFixProvider {
    fn request_location_updates(
        &self,
        request: LocationRequest,
        sink: FixSink,
    ) -> Result<(), ProviderError> {
        let runtime = Handle::try_current().map_err(|_| ProviderError::NoRuntime)?;
        let mut task = self.task.lock().map_err(|_| ProviderError::Poisoned)?;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Err(ProviderError::AlreadySubscribed);
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = runtime.spawn(run_fix_feed(
            self.addr.clone(),
            request,
            sink,
            self.reconnect_delay,
            shutdown_rx,
        ));
        *task = Some(FeedTask { shutdown_tx, handle });
        Ok(())
    }

    fn remove_location_updates(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                let _ = task.shutdown_tx.try_send(());
            }
        }
    }
}

impl Drop for TcpFixProvider {
    fn drop(&mut self) {
        self.remove_location_updates();
    }
}

/// Keep a connection to the feed open until shut down, reconnecting after failures.
async fn run_fix_feed(
    addr: String,
    request: LocationRequest,
    sink: FixSink,
    reconnect_delay: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    info!("Starting fix feed client to {}", addr);
    let mut throttle = Throttle::new(request.interval);

    loop {
        tokio::select! {
            result = stream_fixes(&addr, &request, &sink, &mut throttle) => match result {
                Ok(()) => warn!("Fix feed at {} closed the connection", addr),
                Err(e) => warn!("Fix feed at {} failed: {}", addr, e),
            },
            _ = shutdown_rx.recv() => break,
        }

        // Wait before reconnecting
        let delay = Duration::from_secs_f64(fuzzy(reconnect_delay.as_secs_f64()));
        debug!("Reconnecting to {} in {:.1}s", addr, delay.as_secs_f64());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.recv() => break,
        }
    }
    info!("Fix feed client to {} stopped", addr);
}

async fn stream_fixes(
    addr: &str,
    request: &LocationRequest,
    sink: &FixSink,
    throttle: &mut Throttle,
) -> io::Result<()> {
    let mut conn = Connection::connect(addr).await?;
    info!("Connected to fix feed at {}", conn.peer_addr());
    conn.write_json(&ClientMessage::from(request)).await?;

    while let Some(line) = conn.read_line().await? {
        let line = line.trim();
        if line.is_empty() {
            // Heartbeat
            continue;
        }

        let message = match FeedMessage::parse(line) {
            Ok(m) => m,
            Err(e) => {
                warn!("Ignoring malformed fix from {}: {}", addr, e);
                continue;
            }
        };

        let now = Instant::now();
        let (result, rejected) = message.into_result(now);
        if rejected > 0 {
            warn!("Dropped {} invalid fix(es) from {}", rejected, addr);
        }
        if result.locations.is_empty() {
            continue;
        }
        if !throttle.admit(now) {
            debug!("Fix from {} arrived inside the update interval, dropped", addr);
            continue;
        }

        sink.on_location_result(result).await;
    }
    Ok(())
}
