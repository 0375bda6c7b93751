//! Controller configuration.

use std::net::Ipv4Addr;
use std::time::Duration;

/// Tunable settings for a [`crate::Controller`].
///
/// The network addresses and ports are the vendor's LAN contract; the
/// timers and retry bounds are operational defaults, not protocol
/// constants, and can be tightened for tests or relaxed for congested
/// networks.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Local address the shared socket binds to.
    pub listen_address: Ipv4Addr,
    /// Port devices send responses and announcements to.
    pub listen_port: u16,
    /// Multicast (or broadcast) group scan requests go to.
    pub broadcast_address: Ipv4Addr,
    /// Port the scan group listens on.
    pub discovery_port: u16,
    /// Unicast port devices accept commands and status queries on.
    pub command_port: u16,

    /// Whether the periodic discovery broadcast runs.
    pub discovery_enabled: bool,
    /// Time between discovery broadcasts.
    pub discovery_interval: Duration,
    /// Whether known devices are periodically polled for status.
    pub refresh_enabled: bool,
    /// Time between status polls.
    pub refresh_interval: Duration,
    /// Silence after which a device is unreachable and then evicted.
    pub device_timeout: Duration,

    /// How long one command attempt waits for a confirming status.
    pub response_deadline: Duration,
    /// Maximum frames transmitted per command intent.
    pub max_attempts: u32,
    /// Delay before each re-send; the last entry repeats when attempts
    /// outnumber entries.
    pub retry_backoff: Vec<Duration>,
    /// Hard ceiling on draining in-flight commands at shutdown.
    pub shutdown_ceiling: Duration,

    /// Start with the temperature-only policy active.
    pub temperature_only: bool,
}

impl ControllerConfig {
    pub const DEFAULT_BROADCAST_ADDRESS: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
    pub const DEFAULT_DISCOVERY_PORT: u16 = 4001;
    pub const DEFAULT_LISTEN_PORT: u16 = 4002;
    pub const DEFAULT_COMMAND_PORT: u16 = 4003;
    pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(60);
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
    pub const DEFAULT_RESPONSE_DEADLINE: Duration = Duration::from_secs(2);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Device timeout defaults to three missed discovery cycles.
    pub fn default_device_timeout(discovery_interval: Duration) -> Duration {
        discovery_interval * 3
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            listen_address: Ipv4Addr::UNSPECIFIED,
            listen_port: Self::DEFAULT_LISTEN_PORT,
            broadcast_address: Self::DEFAULT_BROADCAST_ADDRESS,
            discovery_port: Self::DEFAULT_DISCOVERY_PORT,
            command_port: Self::DEFAULT_COMMAND_PORT,
            discovery_enabled: true,
            discovery_interval: Self::DEFAULT_DISCOVERY_INTERVAL,
            refresh_enabled: true,
            refresh_interval: Self::DEFAULT_REFRESH_INTERVAL,
            device_timeout: Self::default_device_timeout(Self::DEFAULT_DISCOVERY_INTERVAL),
            response_deadline: Self::DEFAULT_RESPONSE_DEADLINE,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            retry_backoff: vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_secs(1),
            ],
            shutdown_ceiling: Duration::from_secs(5),
            temperature_only: false,
        }
    }
}
