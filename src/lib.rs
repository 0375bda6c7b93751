//! # govee_lan_rs
//!
//! An async Rust library for controlling Govee smart lights over the local
//! network, with no cloud dependency.
//!
//! This crate provides a **runtime-agnostic** local control engine for
//! devices speaking Govee's JSON-over-UDP LAN protocol: multicast
//! discovery, per-device command dispatch, and a retry/verification state
//! machine that only reports success once a device has *reported* the
//! commanded state — not merely accepted the packet.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use govee_lan_rs::{CommandRequest, Controller, ControllerConfig, PowerState};
//!
//! // Works with any async runtime!
//! async fn turn_everything_on() -> Result<(), govee_lan_rs::Error> {
//!     let controller = Controller::start(ControllerConfig::default()).await?;
//!     controller.discover_once().await;
//!     tokio::time::sleep(Duration::from_secs(2)).await;
//!
//!     for device in controller.list_devices().await {
//!         let outcome = controller
//!             .send_command(&device.id, CommandRequest::Power(PowerState::On))
//!             .await?;
//!         println!("{}: {:?}", device.id, outcome);
//!     }
//!     controller.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Discovery**: find devices via multicast scan with [`Controller::discover_once`]
//!   or the periodic discovery loop
//! - **Verified commands**: [`Controller::send_command`] resolves to
//!   [`Outcome::Confirmed`] only after the device reports the expected state
//! - **Power, brightness, RGB, color temperature, scenes**: abstract
//!   [`CommandRequest`]s translated per device capability profile
//! - **Per-device ordering**: commands for one device run strictly FIFO;
//!   different devices proceed concurrently
//! - **Temperature-only mode**: a runtime policy switch that blocks RGB
//!   commands across all devices
//! - **Events**: device discovered / lost / state changed notifications via
//!   [`Controller::set_event_callback`]
//!
//! ## Communication
//!
//! Discovery scans go to the multicast group `239.255.255.250:4001`;
//! devices answer and announce to UDP port `4002`, and accept unicast
//! commands and status queries on port `4003`. Devices must be on the same
//! link; discovery does not cross subnets or NAT.
//!
//! ## Runtime Selection
//!
//! This library is runtime-agnostic. Select your preferred runtime using
//! feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! govee-lan-rs = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! govee-lan-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! govee-lan-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```

mod capabilities;
mod config;
mod controller;
mod device;
mod errors;
mod event;
mod payload;
mod registry;
mod response;
pub mod runtime;
mod session;
mod translate;
mod types;

// Re-export public API
pub use capabilities::{Capability, CapabilitySet, KelvinRange};
pub use config::ControllerConfig;
pub use controller::Controller;
pub use device::{ColorState, Device, DeviceState, DeviceSummary, DeviceVersions};
pub use errors::{CapabilityError, DecodeError, Error};
pub use event::{Event, EventCallback};
pub use payload::CommandFrame;
pub use registry::{DeviceRegistry, UpsertOutcome};
pub use response::{Announcement, ResponseFrame, decode};
pub use session::{Outcome, RetrySession, SessionState, SessionVerdict, StatePredicate};
pub use translate::{CommandRequest, translate};
pub use types::{Brightness, Color, Kelvin, PowerState, SceneCode};
