//! provider.rs — Driver root object
//!
//! One explicitly constructed [`PoseDriver`] owns the three tracked devices,
//! the receive socket and the network thread. The host drives its lifecycle:
//!
//! - `init(config)`: activate devices, bind UDP (fatal on failure), spawn thread
//! - `run_frame(host)`: per host frame, watchdog + publish every device
//! - `cleanup()`: stop and join the thread, deactivate devices (also on drop)

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use pose_types::{PoseCodec, TrackedDeviceId};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DriverConfig;
use crate::device::TrackedDevice;
use crate::host::HostBinding;
use crate::network::{NetworkLoop, NetworkStats, StatsSnapshot};
use crate::transport::{PoseReceiver, TransportError};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("driver is already initialized")]
    AlreadyRunning,
    #[error("failed to spawn network thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Default)]
pub struct PoseDriver {
    config: Option<DriverConfig>,
    devices: Vec<Arc<TrackedDevice>>,
    stats: Arc<NetworkStats>,
    shutdown: Arc<AtomicBool>,
    network: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl PoseDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, config: DriverConfig) -> Result<(), DriverError> {
        if self.network.is_some() {
            return Err(DriverError::AlreadyRunning);
        }

        let receiver = PoseReceiver::bind(config.listen_addr())?;
        let local_addr = receiver.local_addr();

        let devices: Vec<Arc<TrackedDevice>> = TrackedDeviceId::ALL
            .iter()
            .map(|id| Arc::new(TrackedDevice::new(*id, config.timeout)))
            .collect();
        for d in &devices {
            d.activate();
            info!(
                "Registered {} ({}, {}) inputs: [{}]",
                d.id(),
                d.serial_number(),
                d.model_number(),
                d.input_paths().join(", ")
            );
        }

        let stats = Arc::new(NetworkStats::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let net = NetworkLoop::new(
            receiver,
            PoseCodec::new(config.layout),
            devices.clone(),
            stats.clone(),
            shutdown.clone(),
            config.poll_interval,
        );
        let handle = match net.spawn() {
            Ok(h) => h,
            Err(e) => {
                for d in &devices {
                    d.deactivate();
                }
                return Err(DriverError::Spawn(e));
            }
        };

        info!(
            "🚀 Pose driver initialized on {local_addr} ({}-byte packets, timeout {:?})",
            config.layout.len(),
            config.timeout
        );
        self.devices = devices;
        self.stats = stats;
        self.shutdown = shutdown;
        self.network = Some(handle);
        self.local_addr = Some(local_addr);
        self.config = Some(config);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.network.is_some()
    }

    /// Bound receive address, once initialized.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn config(&self) -> Option<&DriverConfig> {
        self.config.as_ref()
    }

    /// An active device by role.
    pub fn device(&self, id: TrackedDeviceId) -> Option<Arc<TrackedDevice>> {
        self.devices.iter().find(|d| d.id() == id && d.is_active()).cloned()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// One host frame: watchdog then publish, for every active device.
    pub fn run_frame(&self, host: &mut impl HostBinding) {
        self.run_frame_at(Instant::now(), host);
    }

    pub fn run_frame_at(&self, now: Instant, host: &mut impl HostBinding) {
        for device in self.devices.iter().filter(|d| d.is_active()) {
            device.check_connection(now);
            let snapshot = device.publish();
            host.on_pose_updated(&snapshot);
        }
    }

    /// Stop the network thread and deactivate devices. Idempotent.
    pub fn cleanup(&mut self) {
        let Some(handle) = self.network.take() else {
            return;
        };
        self.shutdown.store(true, Ordering::Release);
        // Join before the socket closes: the thread owns it and never blocks on recv.
        if handle.join().is_err() {
            warn!("Network thread panicked");
        }
        for d in &self.devices {
            d.deactivate();
        }
        self.local_addr = None;
        info!("Pose driver shut down");
    }
}

impl Drop for PoseDriver {
    fn drop(&mut self) {
        self.cleanup();
    }
}
