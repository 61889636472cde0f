//! config.rs — Driver and hub configuration from environment variables
//!
//! | Variable                   | Default          |
//! |----------------------------|------------------|
//! | `VRPOSE_UDP_PORT`          | 5555             |
//! | `VRPOSE_BIND_ADDR`         | 0.0.0.0          |
//! | `VRPOSE_TIMEOUT_MS`        | 1000             |
//! | `VRPOSE_PACKET_LAYOUT`     | 49               |
//! | `VRPOSE_HUB_LISTEN_PORT`   | 5554             |
//! | `VRPOSE_HUB_FORWARD_ADDR`  | 127.0.0.1:5555   |
//! | `VRPOSE_HUB_RATE_HZ`       | 90               |
//! | `VRPOSE_CALIBRATION_FILE`  | calibration.json |
//!
//! Unset or unparsable values fall back to the default. Command-line flags in
//! main.rs override whatever the environment produced.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use pose_types::PacketLayout;

/// Staleness watchdog timeout shared by every driver variant.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Idle sleep of the network thread when the socket has nothing queued.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Hub only forwards devices heard from within this window.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_millis(500);

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

// ── Driver ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// UDP port to receive pose packets on (default 5555)
    pub udp_port: u16,
    pub bind_addr: IpAddr,
    /// Device goes disconnected after this long without a packet
    pub timeout: Duration,
    pub layout: PacketLayout,
    pub poll_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            udp_port: env_or("VRPOSE_UDP_PORT", 5555),
            bind_addr: env_or("VRPOSE_BIND_ADDR", IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            timeout: Duration::from_millis(env_or("VRPOSE_TIMEOUT_MS", 1000)),
            layout: env_or("VRPOSE_PACKET_LAYOUT", PacketLayout::WithTrigger),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl DriverConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.udp_port)
    }

    /// Loopback on an OS-assigned port with the default timing. Used by tests.
    pub fn loopback() -> Self {
        Self {
            udp_port: 0,
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            timeout: DEFAULT_TIMEOUT,
            layout: PacketLayout::WithTrigger,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// ── Calibration hub ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Tracker feed (default 5554)
    pub listen_port: u16,
    pub bind_addr: IpAddr,
    /// Where calibrated packets go (the driver, default 127.0.0.1:5555)
    pub forward_addr: SocketAddr,
    pub rate_hz: f64,
    pub layout: PacketLayout,
    pub freshness: Duration,
    /// JSON calibration store
    pub calibration_file: PathBuf,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_port: env_or("VRPOSE_HUB_LISTEN_PORT", 5554),
            bind_addr: env_or("VRPOSE_BIND_ADDR", IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            forward_addr: env_or(
                "VRPOSE_HUB_FORWARD_ADDR",
                SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5555),
            ),
            rate_hz: env_or("VRPOSE_HUB_RATE_HZ", 90.0),
            layout: env_or("VRPOSE_PACKET_LAYOUT", PacketLayout::WithTrigger),
            freshness: DEFAULT_FRESHNESS,
            calibration_file: env_or("VRPOSE_CALIBRATION_FILE", PathBuf::from("calibration.json")),
        }
    }
}

impl HubConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.listen_port)
    }

    pub fn send_interval(&self) -> Duration {
        let hz = if self.rate_hz.is_finite() && self.rate_hz > 0.0 { self.rate_hz } else { 90.0 };
        Duration::from_secs_f64(1.0 / hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_uses_ephemeral_port() {
        let cfg = DriverConfig::loopback();
        assert_eq!(cfg.listen_addr().port(), 0);
        assert_eq!(cfg.timeout, Duration::from_secs(1));
    }

    #[test]
    fn bad_rate_falls_back_to_90hz() {
        let cfg = HubConfig { rate_hz: 0.0, ..HubConfig::default() };
        assert_eq!(cfg.send_interval(), Duration::from_secs_f64(1.0 / 90.0));
    }

    #[test]
    fn env_or_ignores_garbage() {
        assert_eq!(env_or::<u16>("VRPOSE_TEST_SURELY_UNSET_VARIABLE", 7), 7);
    }
}
