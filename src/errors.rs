use crate::capabilities::Capability;

/// Failure to decode an inbound datagram.
///
/// Devices and other LAN software share the listening port, so undecodable
/// packets are routine. Callers log these and drop the packet; a decode
/// failure is never fatal to the controller.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The datagram contained invalid UTF-8.
    #[error("invalid utf-8 in datagram: {0:?}")]
    Utf8(std::str::Utf8Error),

    /// The datagram was not valid JSON or did not match the envelope shape.
    #[error("malformed json: {0:?}")]
    Json(serde_json::Error),

    /// The envelope was missing a required field.
    #[error("missing required field {0:?}")]
    MissingField(&'static str),

    /// The envelope carried a command this library does not know.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// A numeric field was outside its documented range.
    #[error("field {field:?} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
}

/// A command was rejected before any network I/O.
///
/// The two causes are deliberately distinct: `ModeRestricted` is a
/// controller-wide policy decision, `NotSupported` is a property of the
/// individual device. The policy gate is evaluated first, so an RGB request
/// under temperature-only mode fails identically for every device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// The device does not advertise the requested capability.
    #[error("device does not support {0}")]
    NotSupported(Capability),

    /// RGB color commands are disabled while temperature-only mode is active.
    #[error("rgb color commands are blocked by temperature-only mode")]
    ModeRestricted,

    /// The requested scene is not in the device's scene table.
    #[error("scene {0:?} is not available on this device")]
    UnknownScene(String),
}

/// All error types that can occur when talking to Govee lights.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to serialize an outbound frame to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// An inbound datagram could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The command was rejected by a capability or policy gate.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// A caller-supplied value was outside its valid range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    Validation {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// Failed to parse a [`crate::Color`] from a string.
    #[error("invalid color string: {0}")]
    InvalidColorString(String),

    /// No device with the given id is known to the registry.
    #[error("no device known with id {0:?}")]
    NotFound(String),

    /// A network socket operation failed.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// The controller has been shut down.
    #[error("controller is shut down")]
    Shutdown,
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    pub(crate) fn validation(field: &'static str, value: i64, min: i64, max: i64) -> Self {
        Error::Validation {
            field,
            value,
            min,
            max,
        }
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
