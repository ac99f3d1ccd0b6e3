// Published location state
// Immutable snapshot handed to rendering surfaces; replaced wholesale on every update.

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::constants::PREDICTED_CAVEAT;
use crate::fix::Fix;

/// Caveat attached to a state that is not backed by a fresh real fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Position extrapolated from the last fix
    Predicted,
}

impl Status {
    /// Text shown to the viewer alongside the position
    pub fn caveat(&self) -> &'static str {
        match self {
            Status::Predicted => PREDICTED_CAVEAT,
        }
    }
}

/// Snapshot of the displayed position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocationState {
    pub latitude: f64,
    pub longitude: f64,
    pub bearing: f64,
    pub speed: f64,
    pub status: Option<Status>,
}

impl LocationState {
    /// Derive the state for `fix`; `predicted` marks it with [`Status::Predicted`].
    pub fn from_fix(fix: &Fix, predicted: bool) -> Self {
        LocationState {
            latitude: fix.latitude,
            longitude: fix.longitude,
            bearing: fix.bearing,
            speed: fix.speed,
            status: predicted.then_some(Status::Predicted),
        }
    }

    pub fn is_predicted(&self) -> bool {
        self.status == Some(Status::Predicted)
    }
}

impl fmt::Display for LocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Latitude: {}", self.latitude)?;
        writeln!(f, "Longitude: {}", self.longitude)?;
        write!(f, "Speed: {:.2} m/s", self.speed)?;
        if let Some(status) = self.status {
            write!(f, "\n{}", status.caveat())?;
        }
        Ok(())
    }
}
