//! Device records and confirmed device state.

use std::net::SocketAddr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::capabilities::CapabilitySet;
use crate::types::{Brightness, Color, Kelvin};

/// Current color mode of a device. The two modes are mutually exclusive:
/// a device is either showing an RGB color or a white at some temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorState {
    Rgb(Color),
    Temperature(Kelvin),
}

/// A device state as reported by the device itself.
///
/// Values in here always come from a decoded status frame, never from the
/// value a command asked for. This is what makes a `Confirmed` outcome
/// trustworthy on a lossy network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub power: bool,
    pub brightness: Brightness,
    pub color: Option<ColorState>,
    pub scene: Option<String>,
}

/// Hardware and firmware versions reported in a scan response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceVersions {
    pub ble_hardware: String,
    pub ble_software: String,
    pub wifi_hardware: String,
    pub wifi_software: String,
}

/// One known device on the local network.
///
/// The id and capability set are fixed for the lifetime of the record;
/// address and state refresh with every response the device sends.
#[derive(Debug, Clone)]
pub struct Device {
    id: String,
    address: SocketAddr,
    model: String,
    capabilities: CapabilitySet,
    versions: DeviceVersions,
    last_state: Option<DeviceState>,
    last_seen: Instant,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        address: SocketAddr,
        model: impl Into<String>,
        capabilities: CapabilitySet,
        versions: DeviceVersions,
        now: Instant,
    ) -> Self {
        Device {
            id: id.into(),
            address,
            model: model.into(),
            capabilities,
            versions,
            last_state: None,
            last_seen: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn versions(&self) -> &DeviceVersions {
        &self.versions
    }

    /// Last confirmed state, if any status response has been seen.
    pub fn last_state(&self) -> Option<&DeviceState> {
        self.last_state.as_ref()
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn is_stale(&self, max_age: std::time::Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) >= max_age
    }

    pub(crate) fn set_address(&mut self, address: SocketAddr) {
        self.address = address;
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    pub(crate) fn set_state(&mut self, state: DeviceState, now: Instant) {
        self.last_state = Some(state);
        self.last_seen = now;
    }

    /// Host-facing snapshot of the public fields.
    pub fn summary(&self) -> DeviceSummary {
        let state = self.last_state.as_ref();
        let (rgb, kelvin) = match state.and_then(|s| s.color) {
            Some(ColorState::Rgb(c)) => (Some([c.red(), c.green(), c.blue()]), None),
            Some(ColorState::Temperature(k)) => (None, Some(k.kelvin())),
            None => (None, None),
        };
        DeviceSummary {
            id: self.id.clone(),
            address: self.address.to_string(),
            model: self.model.clone(),
            capabilities: self.capabilities.iter().map(|c| c.to_string()).collect(),
            power: state.map(|s| s.power),
            brightness: state.map(|s| s.brightness.value()),
            rgb,
            kelvin,
            scene: state.and_then(|s| s.scene.clone()),
            wifi_software: some_nonempty(&self.versions.wifi_software),
            ble_software: some_nonempty(&self.versions.ble_software),
        }
    }
}

fn some_nonempty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Serializable device view returned by the controller's listing API and
/// carried on host-facing events.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSummary {
    pub id: String,
    pub address: String,
    pub model: String,
    pub capabilities: Vec<String>,
    pub power: Option<bool>,
    pub brightness: Option<u8>,
    pub rgb: Option<[u8; 3]>,
    pub kelvin: Option<u16>,
    pub scene: Option<String>,
    pub wifi_software: Option<String>,
    pub ble_software: Option<String>,
}
