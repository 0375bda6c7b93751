//! Device capability profiles.
//!
//! Govee devices do not enumerate their own features over the LAN protocol;
//! capabilities are looked up from the model (sku) reported in the scan
//! response. Unknown models fall back to a standard RGB profile.

use std::collections::BTreeMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::types::SceneCode;

/// A controllable facet of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum Capability {
    Power,
    Brightness,
    RgbColor,
    ColorTemperature,
    Scene,
}

impl Capability {
    fn bit(self) -> u8 {
        match self {
            Capability::Power => 1,
            Capability::Brightness => 2,
            Capability::RgbColor => 4,
            Capability::ColorTemperature => 8,
            Capability::Scene => 16,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Power => "power",
            Capability::Brightness => "brightness",
            Capability::RgbColor => "rgb-color",
            Capability::ColorTemperature => "color-temperature",
            Capability::Scene => "scene",
        };
        write!(f, "{name}")
    }
}

/// Color temperature range (Kelvin) advertised for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KelvinRange {
    pub min: u16,
    pub max: u16,
}

impl KelvinRange {
    pub fn contains(&self, kelvin: u16) -> bool {
        (self.min..=self.max).contains(&kelvin)
    }
}

impl Default for KelvinRange {
    fn default() -> Self {
        KelvinRange {
            min: 2000,
            max: 9000,
        }
    }
}

/// The capability profile of one device.
///
/// The set of capabilities is fixed for the lifetime of a device record;
/// a device re-announcing with a different [`signature`](Self::signature)
/// is treated as a new logical device by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    bits: u8,
    kelvin_range: KelvinRange,
    scenes: BTreeMap<String, SceneCode>,
}

impl CapabilitySet {
    pub fn empty() -> Self {
        CapabilitySet {
            bits: 0,
            kelvin_range: KelvinRange::default(),
            scenes: BTreeMap::new(),
        }
    }

    pub fn with(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let mut set = Self::empty();
        for capability in capabilities {
            set.insert(capability);
        }
        set
    }

    pub fn insert(&mut self, capability: Capability) {
        self.bits |= capability.bit();
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.bits & capability.bit() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::iter().filter(|c| self.contains(*c))
    }

    /// Stable fingerprint of the capability bits.
    ///
    /// Used by the registry to detect a device re-announcing with a
    /// different feature set.
    pub fn signature(&self) -> u8 {
        self.bits
    }

    pub fn kelvin_range(&self) -> KelvinRange {
        self.kelvin_range
    }

    pub fn set_kelvin_range(&mut self, range: KelvinRange) {
        self.kelvin_range = range;
    }

    /// Register a scene activation code and mark the scene capability.
    pub fn add_scene(&mut self, name: &str, code: SceneCode) {
        self.scenes.insert(name.to_lowercase(), code);
        self.insert(Capability::Scene);
    }

    pub fn scene_code(&self, name: &str) -> Option<&SceneCode> {
        self.scenes.get(&name.to_lowercase())
    }

    pub fn scene_names(&self) -> impl Iterator<Item = &str> {
        self.scenes.keys().map(String::as_str)
    }

    /// Look up the capability profile for a model number.
    ///
    /// Unknown models get the standard RGB + temperature profile and a
    /// logged warning so missing entries can be reported.
    pub fn for_model(model: &str) -> CapabilitySet {
        match model {
            // RGB LED strips without temperature control
            "H6160" | "H6199" => rgb_only(),
            // RGB strips, bulbs and lamps with kelvin control
            "H6163" | "H6104" | "H7022" | "H6198" => standard(),
            _ => {
                warn!(
                    "unknown Govee model {model:?}, using standard capabilities; \
                     please report this to improve device support"
                );
                standard()
            }
        }
    }
}

fn rgb_only() -> CapabilitySet {
    CapabilitySet::with([Capability::Power, Capability::Brightness, Capability::RgbColor])
}

fn standard() -> CapabilitySet {
    CapabilitySet::with([
        Capability::Power,
        Capability::Brightness,
        Capability::RgbColor,
        Capability::ColorTemperature,
    ])
}
