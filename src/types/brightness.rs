//! Brightness control for Govee lights.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Brightness level from 0 to 100 percent.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Brightness {
    pub(crate) value: u8,
}

impl Brightness {
    const MIN: u8 = 0;
    const MAX: u8 = 100;

    /// Create a new full brightness (100%).
    pub fn new() -> Self {
        Brightness { value: Self::MAX }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Create a brightness with the given value.
    ///
    /// Returns [`Error::Validation`] if value is outside the valid
    /// range (0-100).
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::Brightness;
    ///
    /// assert!(Brightness::create(0).is_ok());
    /// assert!(Brightness::create(100).is_ok());
    /// assert!(Brightness::create(101).is_err());
    /// ```
    pub fn create(value: u8) -> Result<Self, Error> {
        if value <= Self::MAX {
            Ok(Brightness { value })
        } else {
            Err(Error::validation(
                "brightness",
                value as i64,
                Self::MIN as i64,
                Self::MAX as i64,
            ))
        }
    }
}

impl Default for Brightness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_bounds() {
        assert_eq!(Brightness::create(0).unwrap().value(), 0);
        assert_eq!(Brightness::create(100).unwrap().value(), 100);
        assert!(Brightness::create(101).is_err());
    }
}
