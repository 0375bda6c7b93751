//! Host-facing state change notifications.

use crate::device::DeviceSummary;

/// A change the host application may want to react to.
///
/// Events carry the device's public snapshot at the time of the change.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A device was seen for the first time, or re-announced itself with a
    /// new capability signature.
    DeviceDiscovered(DeviceSummary),
    /// A known device exceeded the staleness threshold and was evicted.
    DeviceLost(DeviceSummary),
    /// A confirmed status response changed the device's known state.
    DeviceStateChanged(DeviceSummary),
}

/// Callback invoked for every emitted [`Event`].
///
/// Called from the controller's internal tasks; keep it fast and hand
/// heavy work to the host's own executor.
pub type EventCallback = Box<dyn Fn(Event) + Send + Sync + 'static>;
