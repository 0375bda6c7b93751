//! Color temperature control.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Color temperature in Kelvin, with valid values from 1000K to 9000K.
///
/// Lower values produce warmer (more yellow/orange) light, while higher
/// values produce cooler (more blue) light. Typical values:
/// - 2700K: Warm white (incandescent-like)
/// - 4000K: Neutral white
/// - 6500K: Daylight
///
/// This is the protocol-wide sanity range; the narrower range a specific
/// device advertises is enforced when a command is translated for it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Kelvin {
    pub(crate) kelvin: u16,
}

impl Kelvin {
    pub(crate) const MIN: u16 = 1000;
    pub(crate) const MAX: u16 = 9000;

    pub fn kelvin(&self) -> u16 {
        self.kelvin
    }

    /// Create a new Kelvin with the given value.
    ///
    /// Returns [`Error::Validation`] if value is outside the valid range
    /// (1000-9000).
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::Kelvin;
    ///
    /// assert!(Kelvin::create(999).is_err());
    /// assert!(Kelvin::create(1000).is_ok());
    /// assert!(Kelvin::create(9000).is_ok());
    /// assert!(Kelvin::create(9001).is_err());
    /// ```
    pub fn create(kelvin: u16) -> Result<Self, Error> {
        if (Self::MIN..=Self::MAX).contains(&kelvin) {
            Ok(Kelvin { kelvin })
        } else {
            Err(Error::validation(
                "colorTemInKelvin",
                kelvin as i64,
                Self::MIN as i64,
                Self::MAX as i64,
            ))
        }
    }
}
