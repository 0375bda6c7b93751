//! Inbound frame decoding.
//!
//! Everything arriving on the listening socket funnels through [`decode`].
//! A [`DecodeError`] means the packet is dropped and logged; it is never a
//! fatal condition, since the port is shared with unrelated LAN chatter.

use std::net::Ipv4Addr;

use serde::Deserialize;
use serde_json::Value;

use crate::device::{ColorState, DeviceState};
use crate::errors::DecodeError;
use crate::payload::{CMD_SCAN, CMD_STATUS};
use crate::types::{Brightness, Color, Kelvin};

/// A device's reply to a scan request, or its unsolicited announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Address the device claims, when present in the frame. The packet
    /// source address is the fallback.
    pub ip: Option<Ipv4Addr>,
    pub device_id: String,
    pub model: String,
    pub ble_hardware: String,
    pub ble_software: String,
    pub wifi_hardware: String,
    pub wifi_software: String,
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFrame {
    Announcement(Announcement),
    Status(DeviceState),
}

#[derive(Deserialize)]
struct Envelope {
    msg: Msg,
}

#[derive(Deserialize)]
struct Msg {
    cmd: String,
    #[serde(default)]
    data: Value,
}

/// The `device` field appears both as a bare id string and as an object
/// in the wild, depending on firmware.
#[derive(Deserialize)]
#[serde(untagged)]
enum DeviceField {
    Id(String),
    Object {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
}

impl DeviceField {
    fn into_id(self) -> String {
        match self {
            DeviceField::Id(id) => id,
            DeviceField::Object { device_id } => device_id,
        }
    }
}

#[derive(Deserialize)]
struct AnnouncementData {
    #[serde(default)]
    ip: Option<String>,
    device: Option<DeviceField>,
    #[serde(default)]
    sku: Option<String>,
    #[serde(rename = "bleVersionHard", default)]
    ble_version_hard: String,
    #[serde(rename = "bleVersionSoft", default)]
    ble_version_soft: String,
    #[serde(rename = "wifiVersionHard", default)]
    wifi_version_hard: String,
    #[serde(rename = "wifiVersionSoft", default)]
    wifi_version_soft: String,
}

#[derive(Deserialize, Default)]
struct ColorData {
    #[serde(default)]
    r: u8,
    #[serde(default)]
    g: u8,
    #[serde(default)]
    b: u8,
}

#[derive(Deserialize)]
struct StatusData {
    #[serde(rename = "onOff", default)]
    on_off: u8,
    #[serde(default)]
    brightness: u8,
    #[serde(default)]
    color: ColorData,
    #[serde(rename = "colorTemInKelvin", default)]
    color_tem_in_kelvin: u32,
    #[serde(default)]
    scene: Option<String>,
}

/// Decode one datagram into a frame this library understands.
pub fn decode(data: &[u8]) -> Result<ResponseFrame, DecodeError> {
    let text = std::str::from_utf8(data).map_err(DecodeError::Utf8)?;
    let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Json)?;

    match envelope.msg.cmd.as_str() {
        CMD_SCAN => decode_announcement(envelope.msg.data).map(ResponseFrame::Announcement),
        CMD_STATUS => decode_status(envelope.msg.data).map(ResponseFrame::Status),
        other => Err(DecodeError::UnknownCommand(other.to_string())),
    }
}

fn decode_announcement(data: Value) -> Result<Announcement, DecodeError> {
    let data: AnnouncementData = serde_json::from_value(data).map_err(DecodeError::Json)?;
    let device_id = data
        .device
        .ok_or(DecodeError::MissingField("device"))?
        .into_id();
    if device_id.is_empty() {
        return Err(DecodeError::MissingField("device"));
    }

    Ok(Announcement {
        ip: data.ip.and_then(|ip| ip.parse().ok()),
        device_id,
        model: data.sku.unwrap_or_default(),
        ble_hardware: data.ble_version_hard,
        ble_software: data.ble_version_soft,
        wifi_hardware: data.wifi_version_hard,
        wifi_software: data.wifi_version_soft,
    })
}

fn decode_status(data: Value) -> Result<DeviceState, DecodeError> {
    let data: StatusData = serde_json::from_value(data).map_err(DecodeError::Json)?;

    let brightness = Brightness::create(data.brightness).map_err(|_| DecodeError::OutOfRange {
        field: "brightness",
        value: data.brightness as i64,
    })?;

    // colorTemInKelvin > 0 means temperature mode; the RGB fields are then
    // meaningless zeroes. Anything else is an RGB report.
    let color = if data.color_tem_in_kelvin > 0 {
        let kelvin = u16::try_from(data.color_tem_in_kelvin)
            .ok()
            .and_then(|k| Kelvin::create(k).ok())
            .ok_or(DecodeError::OutOfRange {
                field: "colorTemInKelvin",
                value: data.color_tem_in_kelvin as i64,
            })?;
        Some(ColorState::Temperature(kelvin))
    } else {
        Some(ColorState::Rgb(Color::rgb(
            data.color.r,
            data.color.g,
            data.color.b,
        )))
    };

    Ok(DeviceState {
        power: data.on_off == 1,
        brightness,
        color,
        scene: data.scene,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_announcement_with_string_device() {
        let data = br#"{"msg":{"cmd":"scan","data":{
            "ip":"192.168.1.42","device":"1F:80:C5:32:32:36:72:4E","sku":"H6163",
            "bleVersionSoft":"1.04.04","wifiVersionSoft":"1.02.11"}}}"#;
        let ResponseFrame::Announcement(a) = decode(data).unwrap() else {
            panic!("expected announcement");
        };
        assert_eq!(a.device_id, "1F:80:C5:32:32:36:72:4E");
        assert_eq!(a.ip, Some("192.168.1.42".parse().unwrap()));
        assert_eq!(a.model, "H6163");
        assert_eq!(a.wifi_software, "1.02.11");
    }

    #[test]
    fn test_decode_announcement_with_object_device() {
        let data = br#"{"msg":{"cmd":"scan","data":{
            "ip":"192.168.1.42","device":{"deviceId":"AA:BB"},"sku":"H6160"}}}"#;
        let ResponseFrame::Announcement(a) = decode(data).unwrap() else {
            panic!("expected announcement");
        };
        assert_eq!(a.device_id, "AA:BB");
    }

    #[test]
    fn test_decode_status_rgb_mode() {
        let data = br#"{"msg":{"cmd":"devStatus","data":{
            "onOff":1,"brightness":80,"color":{"r":255,"g":0,"b":10},"colorTemInKelvin":0}}}"#;
        let ResponseFrame::Status(state) = decode(data).unwrap() else {
            panic!("expected status");
        };
        assert!(state.power);
        assert_eq!(state.brightness.value(), 80);
        assert_eq!(state.color, Some(ColorState::Rgb(Color::rgb(255, 0, 10))));
        assert_eq!(state.scene, None);
    }

    #[test]
    fn test_decode_status_temperature_mode() {
        let data = br#"{"msg":{"cmd":"devStatus","data":{
            "onOff":0,"brightness":100,"color":{"r":0,"g":0,"b":0},"colorTemInKelvin":4000}}}"#;
        let ResponseFrame::Status(state) = decode(data).unwrap() else {
            panic!("expected status");
        };
        assert!(!state.power);
        assert_eq!(
            state.color,
            Some(ColorState::Temperature(Kelvin::create(4000).unwrap()))
        );
    }

    #[test]
    fn test_decode_errors_are_not_fatal_classifications() {
        assert!(matches!(
            decode(&[0xff, 0xfe]),
            Err(DecodeError::Utf8(_)) | Err(DecodeError::Json(_))
        ));
        assert!(matches!(decode(b"not json"), Err(DecodeError::Json(_))));
        assert!(matches!(
            decode(br#"{"msg":{"cmd":"reboot","data":{}}}"#),
            Err(DecodeError::UnknownCommand(_))
        ));
        assert!(matches!(
            decode(br#"{"msg":{"cmd":"scan","data":{"ip":"1.2.3.4"}}}"#),
            Err(DecodeError::MissingField("device"))
        ));
        // Out-of-range brightness is rejected at the decode boundary.
        assert!(matches!(
            decode(br#"{"msg":{"cmd":"devStatus","data":{"onOff":1,"brightness":150}}}"#),
            Err(DecodeError::OutOfRange { field: "brightness", .. })
        ));
    }
}
