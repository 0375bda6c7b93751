//! Power state for light control.

use serde::{Deserialize, Serialize};

/// Power state for a light.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Turn the light on
    On,
    /// Turn the light off
    Off,
}

impl PowerState {
    pub fn is_on(&self) -> bool {
        matches!(self, PowerState::On)
    }

    pub fn from_bool(on: bool) -> Self {
        if on { PowerState::On } else { PowerState::Off }
    }
}
