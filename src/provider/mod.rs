// Location provider seam
// Anything that pushes fixes to the tracker: an in-process source or the TCP feed in net::fix_client.

pub mod settings;

use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::fix::{LocationRequest, LocationResult};
use crate::tracker::FixSink;

pub use settings::{check_and_prompt_enable_gps, SettingsError};

/// Errors raised when subscribing to a provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider already has an active subscription")]
    AlreadySubscribed,
    #[error("provider must be subscribed from within a tokio runtime")]
    NoRuntime,
    #[error("provider state lock poisoned")]
    Poisoned,
}

/// Source of push-style fixes
///
/// `request_location_updates` hands the provider a [`FixSink`]; the provider
/// calls [`FixSink::on_location_result`] for every batch until
/// `remove_location_updates` is called.
pub trait LocationProvider: Send + Sync {
    fn request_location_updates(
        &self,
        request: LocationRequest,
        sink: FixSink,
    ) -> Result<(), ProviderError>;

    fn remove_location_updates(&self);
}

/// Provider fed by hand, for embedding and tests
#[derive(Default)]
pub struct ManualProvider {
    subscription: Mutex<Option<(LocationRequest, FixSink)>>,
}

impl ManualProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request of the current subscriber, if any
    pub fn active_request(&self) -> Option<LocationRequest> {
        self.subscription.lock().ok()?.as_ref().map(|(request, _)| *request)
    }

    /// Deliver a batch to the current subscriber. Returns false if nobody is subscribed
    /// or the subscriber dropped the batch.
    pub async fn push(&self, result: impl Into<LocationResult>) -> bool {
        let sink = match self.subscription.lock() {
            Ok(guard) => guard.as_ref().map(|(_, sink)| sink.clone()),
            Err(_) => None,
        };
        match sink {
            Some(sink) => sink.on_location_result(result.into()).await,
            None => {
                debug!("No subscriber for pushed fix");
                false
            }
        }
    }
}

impl LocationProvider for ManualProvider {
    fn request_location_updates(
        &self,
        request: LocationRequest,
        sink: FixSink,
    ) -> Result<(), ProviderError> {
        let mut subscription = self.subscription.lock().map_err(|_| ProviderError::Poisoned)?;
        if subscription.is_some() {
            return Err(ProviderError::AlreadySubscribed);
        }
        *subscription = Some((request, sink));
        Ok(())
    }

    fn remove_location_updates(&self) {
        if let Ok(mut subscription) = self.subscription.lock() {
            subscription.take();
        }
    }
}
