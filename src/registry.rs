//! In-memory device registry.
//!
//! The registry is a plain synchronous map; the controller wraps it in the
//! runtime's `RwLock` and is the only writer. All timestamps are passed in
//! by the caller so behavior is deterministic under test.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::capabilities::CapabilitySet;
use crate::device::{Device, DeviceState, DeviceVersions};

/// What an [`DeviceRegistry::upsert`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting of this device id.
    Created,
    /// Known device re-announced; address and last-seen refreshed.
    Refreshed,
    /// Known id announced a different capability signature; the old record
    /// was atomically replaced and its state dropped.
    Replaced,
}

/// In-memory map of known devices keyed by device id.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a discovery announcement.
    ///
    /// Idempotent: re-announcing the same id with the same capability
    /// signature only refreshes `address` and `last_seen`, leaving every
    /// other field untouched. A changed signature replaces the record,
    /// since a different feature set implies a different logical device.
    pub fn upsert(
        &mut self,
        id: &str,
        address: SocketAddr,
        model: &str,
        capabilities: CapabilitySet,
        versions: DeviceVersions,
        now: Instant,
    ) -> UpsertOutcome {
        match self.devices.get_mut(id) {
            Some(device) if device.capabilities().signature() == capabilities.signature() => {
                if device.address() != address {
                    info!("device {id} moved from {} to {address}", device.address());
                    device.set_address(address);
                }
                device.touch(now);
                UpsertOutcome::Refreshed
            }
            Some(device) => {
                warn!(
                    "device {id} re-announced with different capabilities \
                     ({:#04x} -> {:#04x}), replacing record",
                    device.capabilities().signature(),
                    capabilities.signature()
                );
                self.devices.insert(
                    id.to_string(),
                    Device::new(id, address, model, capabilities, versions, now),
                );
                UpsertOutcome::Replaced
            }
            None => {
                info!("discovered device {id} ({model}) at {address}");
                self.devices.insert(
                    id.to_string(),
                    Device::new(id, address, model, capabilities, versions, now),
                );
                UpsertOutcome::Created
            }
        }
    }

    /// Apply a status reported by the device.
    ///
    /// Returns `Some(changed)` on success. Unknown ids are a logged no-op:
    /// a status without a preceding announcement carries no capability
    /// information to build a record from.
    pub fn record_status(&mut self, id: &str, state: DeviceState, now: Instant) -> Option<bool> {
        let Some(device) = self.devices.get_mut(id) else {
            warn!("dropping status for unknown device {id}");
            return None;
        };
        let changed = device.last_state() != Some(&state);
        device.set_state(state, now);
        Some(changed)
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    /// Status frames carry no device id; the source address is the only
    /// correlation handle.
    pub fn id_by_ip(&self, ip: IpAddr) -> Option<String> {
        self.devices
            .values()
            .find(|d| d.address().ip() == ip)
            .map(|d| d.id().to_string())
    }

    /// Devices seen within `max_age`, the ones safe to command.
    pub fn list_reachable(&self, max_age: Duration, now: Instant) -> Vec<Device> {
        self.devices
            .values()
            .filter(|d| !d.is_stale(max_age, now))
            .cloned()
            .collect()
    }

    /// Every known device, stale ones included.
    pub fn all(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }

    /// Remove devices not seen within `max_age`, returning the removed
    /// records so the caller can emit device-lost events. In-flight retry
    /// sessions for an expired device run to their own terminal state.
    pub fn expire(&mut self, max_age: Duration, now: Instant) -> Vec<Device> {
        let expired: Vec<String> = self
            .devices
            .values()
            .filter(|d| d.is_stale(max_age, now))
            .map(|d| d.id().to_string())
            .collect();
        expired
            .iter()
            .filter_map(|id| {
                debug!("expiring device {id}, silent past staleness threshold");
                self.devices.remove(id)
            })
            .collect()
    }

    pub fn remove(&mut self, id: &str) -> Option<Device> {
        self.devices.remove(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Capability;
    use crate::types::Brightness;

    fn addr(last: u8) -> SocketAddr {
        format!("192.168.1.{last}:4003").parse().unwrap()
    }

    fn state(power: bool, brightness: u8) -> DeviceState {
        DeviceState {
            power,
            brightness: Brightness::create(brightness).unwrap(),
            color: None,
            scene: None,
        }
    }

    #[test]
    fn test_upsert_idempotent() {
        let mut registry = DeviceRegistry::new();
        let caps = CapabilitySet::for_model("H6163");
        let t0 = Instant::now();

        let outcome = registry.upsert("A", addr(5), "H6163", caps.clone(), Default::default(), t0);
        assert_eq!(outcome, UpsertOutcome::Created);

        registry
            .record_status("A", state(true, 50), t0)
            .expect("known device");

        // Same id, same capability signature: only address/last_seen move.
        let t1 = t0 + Duration::from_secs(30);
        let outcome = registry.upsert("A", addr(9), "H6163", caps, Default::default(), t1);
        assert_eq!(outcome, UpsertOutcome::Refreshed);

        let device = registry.get("A").unwrap();
        assert_eq!(device.address(), addr(9));
        assert_eq!(device.last_seen(), t1);
        assert_eq!(device.last_state(), Some(&state(true, 50)));
        assert_eq!(device.model(), "H6163");
    }

    #[test]
    fn test_capability_change_replaces_record() {
        let mut registry = DeviceRegistry::new();
        let t0 = Instant::now();
        registry.upsert(
            "A",
            addr(5),
            "H6163",
            CapabilitySet::for_model("H6163"),
            Default::default(),
            t0,
        );
        registry.record_status("A", state(true, 50), t0);

        let outcome = registry.upsert(
            "A",
            addr(5),
            "H6160",
            CapabilitySet::for_model("H6160"),
            Default::default(),
            t0,
        );
        assert_eq!(outcome, UpsertOutcome::Replaced);

        let device = registry.get("A").unwrap();
        assert!(!device.capabilities().contains(Capability::ColorTemperature));
        // The replacement is a new logical device; old state is gone.
        assert_eq!(device.last_state(), None);
    }

    #[test]
    fn test_record_status_unknown_is_noop() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(registry.record_status("ghost", state(true, 1), Instant::now()), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_record_status_change_detection() {
        let mut registry = DeviceRegistry::new();
        let t0 = Instant::now();
        registry.upsert(
            "A",
            addr(5),
            "H6163",
            CapabilitySet::for_model("H6163"),
            Default::default(),
            t0,
        );
        assert_eq!(registry.record_status("A", state(true, 50), t0), Some(true));
        assert_eq!(registry.record_status("A", state(true, 50), t0), Some(false));
        assert_eq!(registry.record_status("A", state(false, 50), t0), Some(true));
    }

    #[test]
    fn test_expire_and_list_reachable() {
        let mut registry = DeviceRegistry::new();
        let max_age = Duration::from_secs(180);
        let t0 = Instant::now();
        registry.upsert(
            "old",
            addr(5),
            "H6163",
            CapabilitySet::for_model("H6163"),
            Default::default(),
            t0,
        );
        let t1 = t0 + Duration::from_secs(120);
        registry.upsert(
            "fresh",
            addr(6),
            "H6163",
            CapabilitySet::for_model("H6163"),
            Default::default(),
            t1,
        );

        let t2 = t0 + Duration::from_secs(181);
        let reachable = registry.list_reachable(max_age, t2);
        assert_eq!(reachable.len(), 1);
        assert_eq!(reachable[0].id(), "fresh");

        let expired = registry.expire(max_age, t2);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id(), "old");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_id_by_ip() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(
            "A",
            addr(5),
            "H6163",
            CapabilitySet::for_model("H6163"),
            Default::default(),
            Instant::now(),
        );
        assert_eq!(registry.id_by_ip(addr(5).ip()), Some("A".to_string()));
        assert_eq!(registry.id_by_ip(addr(77).ip()), None);
    }
}
