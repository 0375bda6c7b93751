//! Translation of abstract capability requests into wire frames.
//!
//! Translation is pure: no I/O, and the same device + request + mode always
//! yields the same frame. Everything that can be rejected synchronously is
//! rejected here, before a single packet leaves the host.

use crate::capabilities::Capability;
use crate::device::Device;
use crate::errors::{CapabilityError, Error};
use crate::payload::CommandFrame;
use crate::session::StatePredicate;
use crate::types::{Brightness, Color, Kelvin, PowerState};

/// An abstract command against one device capability.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandRequest {
    Power(PowerState),
    Brightness(Brightness),
    Rgb(Color),
    Temperature(Kelvin),
    Scene(String),
}

impl CommandRequest {
    /// The capability this request targets.
    pub fn capability(&self) -> Capability {
        match self {
            CommandRequest::Power(_) => Capability::Power,
            CommandRequest::Brightness(_) => Capability::Brightness,
            CommandRequest::Rgb(_) => Capability::RgbColor,
            CommandRequest::Temperature(_) => Capability::ColorTemperature,
            CommandRequest::Scene(_) => Capability::Scene,
        }
    }

    /// The expected-state predicate a confirming status must satisfy.
    pub fn predicate(&self) -> StatePredicate {
        match self {
            CommandRequest::Power(state) => StatePredicate::PowerIs(state.is_on()),
            CommandRequest::Brightness(b) => StatePredicate::BrightnessIs(b.value()),
            CommandRequest::Rgb(color) => StatePredicate::ColorIs(*color),
            CommandRequest::Temperature(k) => StatePredicate::TemperatureIs(k.kelvin()),
            CommandRequest::Scene(name) => StatePredicate::SceneIs(name.clone()),
        }
    }
}

/// Translate a request into the frame to put on the wire for `device`.
///
/// Gate order is load-bearing: the temperature-only policy is checked
/// before device capabilities so that an RGB request under the policy
/// fails with the same [`CapabilityError::ModeRestricted`] for every
/// device, capable or not. The per-device capability gate and value
/// checks follow.
pub fn translate(
    device: &Device,
    request: &CommandRequest,
    temperature_only: bool,
) -> Result<CommandFrame, Error> {
    if temperature_only && matches!(request, CommandRequest::Rgb(_)) {
        return Err(CapabilityError::ModeRestricted.into());
    }

    let capability = request.capability();
    if !device.capabilities().contains(capability) {
        return Err(CapabilityError::NotSupported(capability).into());
    }

    match request {
        CommandRequest::Power(state) => Ok(CommandFrame::power(*state)),
        CommandRequest::Brightness(b) => Ok(CommandFrame::brightness(*b)),
        CommandRequest::Rgb(color) => Ok(CommandFrame::rgb(*color)),
        CommandRequest::Temperature(kelvin) => {
            let range = device.capabilities().kelvin_range();
            if !range.contains(kelvin.kelvin()) {
                return Err(Error::validation(
                    "colorTemInKelvin",
                    kelvin.kelvin() as i64,
                    range.min as i64,
                    range.max as i64,
                ));
            }
            Ok(CommandFrame::temperature(*kelvin))
        }
        CommandRequest::Scene(name) => device
            .capabilities()
            .scene_code(name)
            .map(CommandFrame::scene)
            .ok_or_else(|| CapabilityError::UnknownScene(name.clone()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{Capability, CapabilitySet, KelvinRange};
    use crate::device::DeviceVersions;
    use crate::types::SceneCode;
    use std::time::Instant;

    fn device_with(capabilities: CapabilitySet) -> Device {
        Device::new(
            "A",
            "192.168.1.5:4003".parse().unwrap(),
            "H6163",
            capabilities,
            DeviceVersions::default(),
            Instant::now(),
        )
    }

    #[test]
    fn test_capability_gate() {
        let device = device_with(CapabilitySet::for_model("H6160"));
        let request = CommandRequest::Temperature(Kelvin::create(4000).unwrap());
        assert_eq!(
            translate(&device, &request, false).unwrap_err(),
            CapabilityError::NotSupported(Capability::ColorTemperature).into()
        );
    }

    #[test]
    fn test_policy_gate_precedes_capability_gate() {
        // A device with no RGB capability still reports ModeRestricted when
        // the policy is active, so callers see one consistent error.
        let no_rgb = device_with(CapabilitySet::with([Capability::Power]));
        let request = CommandRequest::Rgb(Color::rgb(255, 0, 0));
        assert_eq!(
            translate(&no_rgb, &request, true).unwrap_err(),
            CapabilityError::ModeRestricted.into()
        );

        // Policy off: the same device now fails the capability gate instead.
        assert_eq!(
            translate(&no_rgb, &request, false).unwrap_err(),
            CapabilityError::NotSupported(Capability::RgbColor).into()
        );
    }

    #[test]
    fn test_policy_gate_does_not_block_temperature() {
        let device = device_with(CapabilitySet::for_model("H6163"));
        let request = CommandRequest::Temperature(Kelvin::create(4000).unwrap());
        assert!(translate(&device, &request, true).is_ok());
    }

    #[test]
    fn test_device_kelvin_range_validation() {
        let mut caps = CapabilitySet::for_model("H6163");
        caps.set_kelvin_range(KelvinRange {
            min: 2700,
            max: 6500,
        });
        let device = device_with(caps);

        let request = CommandRequest::Temperature(Kelvin::create(2000).unwrap());
        assert!(matches!(
            translate(&device, &request, false),
            Err(Error::Validation { field: "colorTemInKelvin", .. })
        ));
        let request = CommandRequest::Temperature(Kelvin::create(2700).unwrap());
        assert!(translate(&device, &request, false).is_ok());
    }

    #[test]
    fn test_scene_translation() {
        let mut caps = CapabilitySet::for_model("H6163");
        caps.add_scene("sunrise", SceneCode::new(vec![0x33, 0x05]));
        let device = device_with(caps);

        let frame = translate(&device, &CommandRequest::Scene("Sunrise".into()), false).unwrap();
        assert_eq!(frame.cmd(), "ptReal");

        assert_eq!(
            translate(&device, &CommandRequest::Scene("ocean".into()), false).unwrap_err(),
            CapabilityError::UnknownScene("ocean".into()).into()
        );
    }

    #[test]
    fn test_translation_is_deterministic() {
        let device = device_with(CapabilitySet::for_model("H6163"));
        let request = CommandRequest::Brightness(Brightness::create(40).unwrap());
        assert_eq!(
            translate(&device, &request, false).unwrap(),
            translate(&device, &request, false).unwrap()
        );
    }
}
