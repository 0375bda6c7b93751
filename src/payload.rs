//! Outbound command frames.
//!
//! Every request shares the `{"msg": {"cmd": ..., "data": {...}}}` envelope.
//! Frames are built from already-validated value types, so encoding cannot
//! produce out-of-range wire values.

use serde_json::{Value, json};

use crate::errors::Error;
use crate::types::{Brightness, Color, Kelvin, PowerState, SceneCode};

pub(crate) const CMD_SCAN: &str = "scan";
pub(crate) const CMD_STATUS: &str = "devStatus";
pub(crate) const CMD_TURN: &str = "turn";
pub(crate) const CMD_BRIGHTNESS: &str = "brightness";
pub(crate) const CMD_COLOR: &str = "colorwc";
pub(crate) const CMD_PT_REAL: &str = "ptReal";

/// One encodable request frame.
///
/// Construction is pure; the same inputs always produce the same frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFrame {
    cmd: &'static str,
    data: Value,
}

impl CommandFrame {
    /// Discovery request, sent to the broadcast address.
    pub fn scan() -> Self {
        CommandFrame {
            cmd: CMD_SCAN,
            data: json!({"account_topic": "reserve"}),
        }
    }

    /// Unicast status query.
    pub fn status_query() -> Self {
        CommandFrame {
            cmd: CMD_STATUS,
            data: json!({}),
        }
    }

    pub fn power(state: PowerState) -> Self {
        CommandFrame {
            cmd: CMD_TURN,
            data: json!({"value": if state.is_on() { 1 } else { 0 }}),
        }
    }

    pub fn brightness(brightness: Brightness) -> Self {
        CommandFrame {
            cmd: CMD_BRIGHTNESS,
            data: json!({"value": brightness.value()}),
        }
    }

    /// RGB color command. The kelvin field is zeroed; the two color modes
    /// are mutually exclusive on the wire.
    pub fn rgb(color: Color) -> Self {
        CommandFrame {
            cmd: CMD_COLOR,
            data: json!({
                "color": {"r": color.red(), "g": color.green(), "b": color.blue()},
                "colorTemInKelvin": 0,
            }),
        }
    }

    /// Color temperature command, zeroing the RGB channels.
    pub fn temperature(kelvin: Kelvin) -> Self {
        CommandFrame {
            cmd: CMD_COLOR,
            data: json!({
                "color": {"r": 0, "g": 0, "b": 0},
                "colorTemInKelvin": kelvin.kelvin(),
            }),
        }
    }

    /// Scene activation from a vendor scene code.
    pub fn scene(code: &SceneCode) -> Self {
        CommandFrame {
            cmd: CMD_PT_REAL,
            data: json!({"command": [code.to_hex()]}),
        }
    }

    pub fn cmd(&self) -> &str {
        self.cmd
    }

    /// Serialize the frame with its envelope to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let envelope = json!({"msg": {"cmd": self.cmd, "data": self.data.clone()}});
        serde_json::to_vec(&envelope).map_err(Error::JsonDump)
    }
}
