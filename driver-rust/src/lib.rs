//! vrpose_driver — receiving side of the VR pose bridge
//!
//! - [`PoseDriver`]: UDP receiver thread + three tracked devices + watchdog
//! - [`hub`]: optional calibration relay between the tracker and the driver

pub mod calibration;
pub mod config;
pub mod device;
pub mod host;
pub mod hub;
pub mod network;
pub mod persistence;
pub mod provider;
pub mod transport;

pub use calibration::{CalibrationSet, DeviceCalibration};
pub use config::{DriverConfig, HubConfig};
pub use device::{LinkState, PoseSnapshot, TrackedDevice};
pub use host::{HostBinding, TracingHost};
pub use hub::{Hub, HubCommand, HubState};
pub use network::StatsSnapshot;
pub use provider::{DriverError, PoseDriver};
pub use transport::TransportError;
