//! Vendor scene activation codes.

use serde::{Deserialize, Serialize};

/// The opaque activation code a device expects for one of its scenes.
///
/// Scene codes are vendor-defined byte sequences carried in `ptReal`
/// command frames as hex strings. They are learned per model (see
/// [`crate::CapabilitySet`]) rather than computed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SceneCode(Vec<u8>);

impl SceneCode {
    pub fn new(code: impl Into<Vec<u8>>) -> Self {
        SceneCode(code.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex encoding of the code, as sent on the wire.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_encoding() {
        let code = SceneCode::new(vec![0x33, 0x05, 0x04, 0x00]);
        assert_eq!(code.to_hex(), "33050400");
    }
}
