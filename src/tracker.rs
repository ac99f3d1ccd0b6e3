// Location tracking
// Holds the last known fix, publishes LocationState, and runs the dead-reckoning loop
// that fills in while real fixes are stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::constants::{PREDICT_INTERVAL_MS, STALE_AFTER_MS};
use crate::fix::{Fix, LocationRequest, LocationResult};
use crate::geodesy;
use crate::predict::predict_location;
use crate::provider::{LocationProvider, ProviderError};
use crate::state::LocationState;

/// Tracker tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Subscription parameters passed to the provider
    pub request: LocationRequest,
    /// Prediction loop period
    pub predict_interval: Duration,
    /// A fix older than this (strictly) is replaced by a prediction
    pub stale_after: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            request: LocationRequest::default(),
            predict_interval: Duration::from_millis(PREDICT_INTERVAL_MS),
            stale_after: Duration::from_millis(STALE_AFTER_MS),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracking is already active")]
    AlreadyActive,
    #[error("provider subscription failed: {0}")]
    Provider(#[from] ProviderError),
}

/// State shared by the fix handler, the prediction loop and the tracker handle.
pub struct TrackerContext {
    last_fix: Option<Fix>,
    last_update_time: Instant,
    state_tx: watch::Sender<LocationState>,
}

impl TrackerContext {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(LocationState::default());
        TrackerContext {
            last_fix: None,
            last_update_time: Instant::now(),
            state_tx,
        }
    }

    pub fn last_fix(&self) -> Option<Fix> {
        self.last_fix
    }

    pub fn last_update_time(&self) -> Instant {
        self.last_update_time
    }

    pub fn subscribe(&self) -> watch::Receiver<LocationState> {
        self.state_tx.subscribe()
    }

    /// Record `fix` as current and publish its state.
    pub fn update_location(&mut self, fix: Fix, predicted: bool, now: Instant) {
        self.last_fix = Some(fix);
        self.last_update_time = now;
        self.state_tx.send_replace(LocationState::from_fix(&fix, predicted));
    }

    /// If the current fix is older than `stale_after`, replace it with a projection
    /// and return the projected fix. Does nothing before the first fix.
    pub fn predict_if_stale(&mut self, now: Instant, stale_after: Duration) -> Option<Fix> {
        let last = self.last_fix?;
        let elapsed = now.saturating_duration_since(self.last_update_time);
        if elapsed <= stale_after {
            return None;
        }

        let predicted = predict_location(&last, elapsed, now);
        debug!(
            "Predicting location after {:.1}s without a fix: moved {:.1}m to ({:.6}, {:.6})",
            elapsed.as_secs_f64(),
            geodesy::greatcircle(last.latitude, last.longitude, predicted.latitude, predicted.longitude),
            predicted.latitude,
            predicted.longitude,
        );
        self.update_location(predicted, true, now);
        Some(predicted)
    }
}

impl Default for TrackerContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Id of the session whose fixes are accepted. Session ids start at 1, so 0 means stopped.
pub(crate) type ActiveSession = Arc<AtomicU64>;

const NO_SESSION: u64 = 0;

/// Handler given to a provider: receives fixes on behalf of one tracking session.
#[derive(Clone)]
pub struct FixSink {
    context: Arc<RwLock<TrackerContext>>,
    active: ActiveSession,
    session: u64,
}

impl FixSink {
    pub(crate) fn new(context: Arc<RwLock<TrackerContext>>, active: ActiveSession, session: u64) -> Self {
        FixSink { context, active, session }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Apply the last fix of `result` as a real update. Returns false when the batch
    /// is empty or this sink's session is no longer active.
    pub async fn on_location_result(&self, result: LocationResult) -> bool {
        let Some(fix) = result.last_location() else {
            return false;
        };

        let mut context = self.context.write().await;
        if self.active.load(Ordering::SeqCst) != self.session {
            debug!("Dropping fix for inactive session {}", self.session);
            return false;
        }
        context.update_location(fix, false, Instant::now());
        true
    }
}

struct Session {
    id: u64,
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the provider subscription and the prediction loop for start/stop cycles.
pub struct Tracker {
    config: TrackerConfig,
    provider: Arc<dyn LocationProvider>,
    context: Arc<RwLock<TrackerContext>>,
    state_rx: watch::Receiver<LocationState>,
    active: ActiveSession,
    session: Option<Session>,
    next_session: u64,
}

impl Tracker {
    pub fn new(provider: Arc<dyn LocationProvider>, config: TrackerConfig) -> Self {
        let context = TrackerContext::new();
        let state_rx = context.subscribe();
        Tracker {
            config,
            provider,
            context: Arc::new(RwLock::new(context)),
            state_rx,
            active: Arc::new(AtomicU64::new(NO_SESSION)),
            session: None,
            next_session: 1,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_some()
    }

    /// Latest published state
    pub fn location_state(&self) -> LocationState {
        *self.state_rx.borrow()
    }

    /// Receiver that sees every published state
    pub fn subscribe(&self) -> watch::Receiver<LocationState> {
        self.state_rx.clone()
    }

    pub async fn last_fix(&self) -> Option<Fix> {
        self.context.read().await.last_fix()
    }

    /// Subscribe to the provider and start the prediction loop.
    pub async fn start(&mut self) -> Result<(), TrackerError> {
        if self.session.is_some() {
            warn!("start() called while tracking is already active");
            return Err(TrackerError::AlreadyActive);
        }

        let id = self.next_session;
        self.next_session += 1;
        self.active.store(id, Ordering::SeqCst);

        let sink = FixSink::new(Arc::clone(&self.context), Arc::clone(&self.active), id);
        if let Err(e) = self.provider.request_location_updates(self.config.request, sink) {
            self.active.store(NO_SESSION, Ordering::SeqCst);
            return Err(e.into());
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_prediction_loop(
            Arc::clone(&self.context),
            self.config.predict_interval,
            self.config.stale_after,
            shutdown_rx,
        ));
        self.session = Some(Session { id, shutdown_tx, handle });

        info!(
            "Tracking started (session {}, interval {}ms, {:?} priority)",
            id,
            self.config.request.interval.as_millis(),
            self.config.request.priority,
        );
        Ok(())
    }

    /// Unsubscribe from the provider and cancel the prediction loop. No-op when stopped.
    pub async fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            debug!("stop() called while not tracking");
            return;
        };

        self.provider.remove_location_updates();
        self.close_session(session.id);
        // A fix that passed the session check before the close holds the write lock
        drop(self.context.write().await);

        let _ = session.shutdown_tx.send(()).await;
        if let Err(e) = session.handle.await {
            warn!("Prediction loop for session {} ended abnormally: {}", session.id, e);
        }
        info!("Tracking stopped (session {})", session.id);
    }

    /// Start when stopped, stop when started. Returns whether tracking is now active.
    pub async fn toggle(&mut self) -> Result<bool, TrackerError> {
        if self.is_tracking() {
            self.stop().await;
        } else {
            self.start().await?;
        }
        Ok(self.is_tracking())
    }

    /// Record `fix` as current and publish it, flagged as predicted when asked.
    pub async fn update_location(&self, fix: Fix, predicted: bool) {
        self.context.write().await.update_location(fix, predicted, Instant::now());
    }

    /// Stop accepting fixes from sinks of session `id`.
    fn close_session(&self, id: u64) {
        let _ = self.active.compare_exchange(id, NO_SESSION, Ordering::SeqCst, Ordering::SeqCst);
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.provider.remove_location_updates();
            self.close_session(session.id);
            let _ = session.shutdown_tx.try_send(());
        }
    }
}

async fn run_prediction_loop(
    context: Arc<RwLock<TrackerContext>>,
    period: Duration,
    stale_after: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                context.write().await.predict_if_stale(Instant::now(), stale_after);
            }
            _ = shutdown_rx.recv() => break,
        }
    }
    debug!("Prediction loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use crate::provider::ManualProvider;

    fn fix(latitude: f64, longitude: f64, bearing: f64, speed: f64) -> Fix {
        Fix::new(latitude, longitude, bearing, speed, Instant::now())
    }

    fn manual_tracker() -> (Arc<ManualProvider>, Tracker) {
        let provider = Arc::new(ManualProvider::new());
        let tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        (provider, tracker)
    }

    /// Provider that keeps handing out fixes after being told to stop
    #[derive(Default)]
    struct LeakyProvider {
        sink: Mutex<Option<FixSink>>,
    }

    impl LocationProvider for LeakyProvider {
        fn request_location_updates(&self, _request: LocationRequest, sink: FixSink) -> Result<(), ProviderError> {
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn remove_location_updates(&self) {}
    }

    #[test]
    fn test_context_update_publishes_state() {
        let mut context = TrackerContext::new();
        let rx = context.subscribe();
        let now = Instant::now();
        context.update_location(Fix::new(10.0, 20.0, 30.0, 4.0, now), false, now);

        let state = *rx.borrow();
        assert_eq!(state.latitude, 10.0);
        assert_eq!(state.longitude, 20.0);
        assert_eq!(state.bearing, 30.0);
        assert_eq!(state.speed, 4.0);
        assert_eq!(state.status, None);
        assert_eq!(context.last_update_time(), now);
    }

    #[test]
    fn test_context_skips_prediction_without_fix() {
        let mut context = TrackerContext::new();
        let later = Instant::now() + Duration::from_secs(60);
        assert!(context.predict_if_stale(later, Duration::from_secs(3)).is_none());
        assert_eq!(*context.subscribe().borrow(), LocationState::default());
    }

    #[test]
    fn test_context_threshold_is_strict() {
        let mut context = TrackerContext::new();
        let t0 = Instant::now();
        context.update_location(Fix::new(0.0, 0.0, 90.0, 10.0, t0), false, t0);

        let stale_after = Duration::from_secs(3);
        assert!(context.predict_if_stale(t0 + Duration::from_secs(2), stale_after).is_none());
        assert!(context.predict_if_stale(t0 + stale_after, stale_after).is_none());
        assert!(context.predict_if_stale(t0 + Duration::from_millis(3001), stale_after).is_some());
    }

    #[test]
    fn test_context_prediction_follows_projection() {
        let mut context = TrackerContext::new();
        let rx = context.subscribe();
        let t0 = Instant::now();
        context.update_location(Fix::new(0.0, 0.0, 90.0, 10.0, t0), false, t0);

        let t1 = t0 + Duration::from_secs(4);
        let predicted = context.predict_if_stale(t1, Duration::from_secs(3)).unwrap();
        let (lat, lon) = geodesy::destination(0.0, 0.0, 90.0, 40.0);
        assert_eq!(predicted.latitude, lat);
        assert_eq!(predicted.longitude, lon);
        assert_eq!(predicted.timestamp, t1);

        let state = *rx.borrow();
        assert!(state.is_predicted());
        assert_eq!(state.longitude, lon);
        assert_eq!(context.last_update_time(), t1);
        assert_eq!(context.last_fix(), Some(predicted));
    }

    #[test]
    fn test_context_prediction_at_rest() {
        let mut context = TrackerContext::new();
        let t0 = Instant::now();
        context.update_location(Fix::new(51.4778, -0.0014, 180.0, 0.0, t0), false, t0);

        let predicted = context.predict_if_stale(t0 + Duration::from_secs(10), Duration::from_secs(3)).unwrap();
        assert_eq!(predicted.latitude, 51.4778);
        assert_eq!(predicted.longitude, -0.0014);
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_fix_is_published_immediately() {
        let (provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();

        assert!(provider.push(fix(35.6762, 139.6503, 270.0, 2.5)).await);

        let state = tracker.location_state();
        assert_eq!(state.latitude, 35.6762);
        assert_eq!(state.longitude, 139.6503);
        assert_eq!(state.bearing, 270.0);
        assert_eq!(state.speed, 2.5);
        assert_eq!(state.status, None);
        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fix_becomes_predicted() {
        let (provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();
        provider.push(fix(0.0, 0.0, 90.0, 10.0)).await;

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!tracker.location_state().is_predicted());

        tokio::time::sleep(Duration::from_millis(2000)).await;
        let state = tracker.location_state();
        assert!(state.is_predicted());
        assert!(state.longitude > 0.0, "should have moved east: {}", state.longitude);
        assert!(state.latitude.abs() < 1e-9);
        assert_eq!(state.bearing, 90.0);
        assert_eq!(state.speed, 10.0);
        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_real_fix_clears_predicted_status() {
        let (provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();
        provider.push(fix(1.0, 1.0, 0.0, 5.0)).await;

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert!(tracker.location_state().is_predicted());

        provider.push(fix(2.0, 2.0, 0.0, 5.0)).await;
        let state = tracker.location_state();
        assert_eq!(state.status, None);
        assert_eq!(state.latitude, 2.0);
        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_rest_prediction_keeps_coordinates() {
        let (provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();
        provider.push(fix(-33.8688, 151.2093, 45.0, 0.0)).await;

        tokio::time::sleep(Duration::from_millis(4500)).await;
        let state = tracker.location_state();
        assert!(state.is_predicted());
        assert_eq!(state.latitude, -33.8688);
        assert_eq!(state.longitude, 151.2093);
        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fix_means_no_prediction() {
        let (_provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(tracker.location_state(), LocationState::default());
        assert!(tracker.last_fix().await.is_none());
        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_prediction_loop() {
        let (provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();
        provider.push(fix(10.0, 10.0, 0.0, 20.0)).await;
        tracker.stop().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        let state = tracker.location_state();
        assert!(!state.is_predicted());
        assert_eq!(state.latitude, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unsubscribes_provider() {
        let (provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();
        assert!(provider.active_request().is_some());

        tracker.stop().await;
        assert!(provider.active_request().is_none());
        assert!(!provider.push(fix(5.0, 5.0, 0.0, 0.0)).await);
        assert_eq!(tracker.location_state(), LocationState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callbacks_after_stop_are_ignored() {
        let provider = Arc::new(LeakyProvider::default());
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        tracker.start().await.unwrap();

        let sink = provider.sink.lock().unwrap().clone().unwrap();
        assert!(sink.on_location_result(fix(1.0, 2.0, 0.0, 0.0).into()).await);

        tracker.stop().await;
        assert!(!sink.on_location_result(fix(3.0, 4.0, 0.0, 0.0).into()).await);
        assert_eq!(tracker.location_state().latitude, 1.0);

        // A sink from the old session stays dead after a restart
        tracker.start().await.unwrap();
        assert!(!sink.on_location_result(fix(5.0, 6.0, 0.0, 0.0).into()).await);
        assert_eq!(tracker.location_state().latitude, 1.0);
        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_closes_session() {
        let provider = Arc::new(LeakyProvider::default());
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        let rx = tracker.subscribe();
        tracker.start().await.unwrap();

        let sink = provider.sink.lock().unwrap().clone().unwrap();
        assert!(sink.on_location_result(fix(1.0, 2.0, 0.0, 0.0).into()).await);

        // Dropped without stop(); the provider keeps the sink alive
        drop(tracker);
        assert!(!sink.on_location_result(fix(9.0, 9.0, 0.0, 0.0).into()).await);
        assert_eq!(rx.borrow().latitude, 1.0);
        assert_eq!(rx.borrow().longitude, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let (provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();

        let err = tracker.start().await.unwrap_err();
        assert!(matches!(err, TrackerError::AlreadyActive));
        assert!(tracker.is_tracking());
        assert!(provider.active_request().is_some());
        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failure_leaves_tracker_stopped() {
        let provider = Arc::new(ManualProvider::new());
        let mut first = Tracker::new(provider.clone(), TrackerConfig::default());
        let mut second = Tracker::new(provider.clone(), TrackerConfig::default());
        first.start().await.unwrap();

        let err = second.start().await.unwrap_err();
        assert!(matches!(err, TrackerError::Provider(ProviderError::AlreadySubscribed)));
        assert!(!second.is_tracking());
        first.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_is_noop() {
        let (_provider, mut tracker) = manual_tracker();
        tracker.stop().await;
        assert!(!tracker.is_tracking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle() {
        let (provider, mut tracker) = manual_tracker();
        assert!(tracker.toggle().await.unwrap());
        assert!(provider.active_request().is_some());
        assert!(!tracker.toggle().await.unwrap());
        assert!(provider.active_request().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_fix_survives_restart() {
        let (provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();
        provider.push(fix(0.0, 0.0, 0.0, 10.0)).await;
        tracker.stop().await;

        tracker.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(4500)).await;
        let state = tracker.location_state();
        assert!(state.is_predicted());
        assert!(state.latitude > 0.0);
        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_is_ignored() {
        let (provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();
        assert!(!provider.push(LocationResult::default()).await);
        assert!(tracker.last_fix().await.is_none());
        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_applies_last_fix() {
        let (provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();
        let batch = LocationResult::new(vec![fix(1.0, 1.0, 0.0, 0.0), fix(2.0, 3.0, 0.0, 0.0)]);
        assert!(provider.push(batch).await);
        assert_eq!(tracker.location_state().latitude, 2.0);
        assert_eq!(tracker.location_state().longitude, 3.0);
        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_location_flags_prediction() {
        let (_provider, tracker) = manual_tracker();
        tracker.update_location(fix(7.0, 8.0, 90.0, 1.0), true).await;
        assert!(tracker.location_state().is_predicted());

        tracker.update_location(fix(7.5, 8.5, 90.0, 1.0), false).await;
        let state = tracker.location_state();
        assert!(!state.is_predicted());
        assert_eq!(state.latitude, 7.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_passed_to_provider() {
        let (provider, mut tracker) = manual_tracker();
        tracker.start().await.unwrap();
        let request = provider.active_request().unwrap();
        assert_eq!(request.interval, Duration::from_secs(1));
        assert_eq!(request.priority, crate::fix::Priority::HighAccuracy);
        tracker.stop().await;
    }
}
