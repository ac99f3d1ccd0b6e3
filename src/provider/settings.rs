// Location settings readiness check
// One-shot probe run before tracking starts; no retries.

use std::future::Future;
use thiserror::Error;
use tracing::{error, info, warn};

/// Why location settings are not satisfied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// The user can fix this; `resolution` names the action to prompt for.
    #[error("location settings not satisfied: {resolution}")]
    Resolvable { resolution: String },
    /// Nothing the user can do from here.
    #[error("location settings unavailable: {0}")]
    Unavailable(String),
}

/// Run `probe` once. On success call `on_ready`; on a resolvable failure prompt
/// the user (via the log) with the resolution action.
pub async fn check_and_prompt_enable_gps<P, F>(probe: P, on_ready: F) -> Result<(), SettingsError>
where
    P: Future<Output = Result<(), SettingsError>>,
    F: FnOnce(),
{
    match probe.await {
        Ok(()) => {
            info!("Location settings satisfied");
            on_ready();
            Ok(())
        }
        Err(SettingsError::Resolvable { resolution }) => {
            warn!("Location is not enabled: {}", resolution);
            Err(SettingsError::Resolvable { resolution })
        }
        Err(e) => {
            error!("Location settings check failed: {}", e);
            Err(e)
        }
    }
}
