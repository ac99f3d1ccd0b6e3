
pub mod constants;
pub mod geodesy;
pub mod fix;
pub mod state;
pub mod predict;
pub mod provider;
pub mod tracker;
pub mod net;
pub mod output;
pub mod config;

pub use fix::{Fix, LocationRequest, LocationResult, Priority};
pub use state::{LocationState, Status};
pub use tracker::{FixSink, Tracker, TrackerConfig, TrackerContext, TrackerError};
pub use provider::{LocationProvider, ManualProvider, ProviderError, SettingsError};
