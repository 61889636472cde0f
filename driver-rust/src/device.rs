//! device.rs — Per-device pose state and the staleness watchdog
//!
//! ```text
//! Uninitialized ──packet──▶ Connected ──(now − last > timeout)──▶ Disconnected
//!                               ▲                                      │
//!                               └───────────────packet─────────────────┘
//! ```
//!
//! Writers: the network thread (validated packets) and the host frame tick
//! (watchdog). Reader: the host frame tick (`publish`). Each [`TrackedDevice`]
//! holds its state behind its own mutex; locks cover field access only.
//!
//! All three roles share one type, parameterized by [`TrackedDeviceId`]:
//! they differ only in default pose and exposed input components.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pose_types::{buttons, Pose, PosePacket, TrackedDeviceId};
use serde::Serialize;

// ── Link state ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkState {
    /// No packet seen since activation
    Uninitialized,
    Connected,
    /// Was connected, then went quiet for longer than the timeout
    Disconnected,
}

// ── Inputs ────────────────────────────────────────────────────────────────────

/// Input components a device exposes to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputComponent {
    TriggerClick,
    GripClick,
    ApplicationMenuClick,
    SystemClick,
    TriggerValue,
}

impl InputComponent {
    /// Host input path
    pub fn path(self) -> &'static str {
        match self {
            Self::TriggerClick => "/input/trigger/click",
            Self::GripClick => "/input/grip/click",
            Self::ApplicationMenuClick => "/input/application_menu/click",
            Self::SystemClick => "/input/system/click",
            Self::TriggerValue => "/input/trigger/value",
        }
    }
}

const CONTROLLER_INPUTS: [InputComponent; 5] = [
    InputComponent::TriggerClick,
    InputComponent::GripClick,
    InputComponent::ApplicationMenuClick,
    InputComponent::SystemClick,
    InputComponent::TriggerValue,
];

/// Controllers expose buttons and the analog trigger; the HMD exposes nothing.
pub fn input_components(device: TrackedDeviceId) -> &'static [InputComponent] {
    if device.is_controller() { &CONTROLLER_INPUTS } else { &[] }
}

/// Latest button/trigger state of a controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerInput {
    pub buttons: u16,
    pub trigger: u8,
}

impl ControllerInput {
    pub fn trigger_click(&self) -> bool { self.buttons & buttons::TRIGGER_CLICK != 0 }
    pub fn grip(&self) -> bool { self.buttons & buttons::GRIP != 0 }
    pub fn application_menu(&self) -> bool { self.buttons & buttons::APPLICATION_MENU != 0 }
    pub fn system(&self) -> bool { self.buttons & buttons::SYSTEM != 0 }

    /// 0.0–1.0
    pub fn trigger_value(&self) -> f32 {
        self.trigger as f32 / 255.0
    }

    /// Boolean state of a click component; None for analog components.
    pub fn is_pressed(&self, component: InputComponent) -> Option<bool> {
        match component {
            InputComponent::TriggerClick => Some(self.trigger_click()),
            InputComponent::GripClick => Some(self.grip()),
            InputComponent::ApplicationMenuClick => Some(self.application_menu()),
            InputComponent::SystemClick => Some(self.system()),
            InputComponent::TriggerValue => None,
        }
    }
}

// ── Published snapshot ────────────────────────────────────────────────────────

/// What the host sees for one device on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoseSnapshot {
    pub device: TrackedDeviceId,
    pub pose: Pose,
    pub state: LinkState,
    pub connected: bool,
    pub pose_valid: bool,
    /// None for the HMD
    pub input: Option<ControllerInput>,
    /// Sequence of the packet that produced `pose`
    pub sequence: Option<u32>,
}

// ── DevicePoseState ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DevicePoseState {
    device: TrackedDeviceId,
    pose: Pose,
    state: LinkState,
    pose_valid: bool,
    last_update: Option<Instant>,
    input: ControllerInput,
    last_sequence: Option<u32>,
    timeout: Duration,
}

impl DevicePoseState {
    pub fn new(device: TrackedDeviceId, timeout: Duration) -> Self {
        Self {
            device,
            pose: device.default_pose(),
            state: LinkState::Uninitialized,
            pose_valid: false,
            last_update: None,
            input: ControllerInput::default(),
            last_sequence: None,
            timeout,
        }
    }

    pub fn device(&self) -> TrackedDeviceId {
        self.device
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Overwrite with a validated packet. False (and no change) if the packet
    /// is addressed to another device.
    pub fn apply_packet(&mut self, packet: &PosePacket, now: Instant) -> bool {
        if packet.device_id != self.device.as_u8() {
            return false;
        }
        self.pose = packet.pose;
        self.pose_valid = true;
        self.state = LinkState::Connected;
        self.last_update = Some(now);
        self.last_sequence = Some(packet.sequence);
        if self.device.is_controller() {
            self.input = ControllerInput { buttons: packet.buttons, trigger: packet.trigger };
        }
        true
    }

    /// Watchdog: disconnect once `now − last_update` exceeds the timeout.
    /// A device that never received a packet stays `Uninitialized`.
    pub fn check_connection(&mut self, now: Instant) -> LinkState {
        if let Some(last) = self.last_update {
            if self.state == LinkState::Connected && now.saturating_duration_since(last) > self.timeout {
                self.state = LinkState::Disconnected;
                self.pose_valid = false;
            }
        }
        self.state
    }

    /// Current pose and flags. Valid in every state; the pose is the last one
    /// received (or the role's default pose before any packet).
    pub fn publish(&self) -> PoseSnapshot {
        PoseSnapshot {
            device: self.device,
            pose: self.pose,
            state: self.state,
            connected: self.is_connected(),
            pose_valid: self.pose_valid,
            input: self.device.is_controller().then_some(self.input),
            sequence: self.last_sequence,
        }
    }
}

// ── TrackedDevice ─────────────────────────────────────────────────────────────

/// One host-visible device: lifecycle flag + mutex-guarded pose state.
#[derive(Debug)]
pub struct TrackedDevice {
    id: TrackedDeviceId,
    timeout: Duration,
    active: AtomicBool,
    state: Mutex<DevicePoseState>,
}

impl TrackedDevice {
    pub fn new(id: TrackedDeviceId, timeout: Duration) -> Self {
        Self {
            id,
            timeout,
            active: AtomicBool::new(false),
            state: Mutex::new(DevicePoseState::new(id, timeout)),
        }
    }

    pub fn id(&self) -> TrackedDeviceId {
        self.id
    }

    pub fn serial_number(&self) -> &'static str {
        self.id.serial_number()
    }

    pub fn model_number(&self) -> &'static str {
        self.id.model_number()
    }

    pub fn input_components(&self) -> &'static [InputComponent] {
        input_components(self.id)
    }

    /// Host input paths, in registration order.
    pub fn input_paths(&self) -> Vec<&'static str> {
        self.input_components().iter().map(|c| c.path()).collect()
    }

    /// Fresh pose state, accepting packets from now on.
    pub fn activate(&self) {
        let mut state = self.state.lock();
        *state = DevicePoseState::new(self.id, self.timeout);
        self.active.store(true, Ordering::Release);
    }

    pub fn deactivate(&self) {
        let mut state = self.state.lock();
        self.active.store(false, Ordering::Release);
        *state = DevicePoseState::new(self.id, self.timeout);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Network-thread entry point. Ignored while inactive.
    /// The flag only flips under the state lock, so it is read under it too.
    pub fn update_from_packet(&self, packet: &PosePacket, now: Instant) -> bool {
        let mut state = self.state.lock();
        if !self.is_active() {
            return false;
        }
        state.apply_packet(packet, now)
    }

    pub fn check_connection(&self, now: Instant) -> LinkState {
        self.state.lock().check_connection(now)
    }

    pub fn publish(&self) -> PoseSnapshot {
        self.state.lock().publish()
    }

    /// Thread-safe pose read for the host.
    pub fn get_pose(&self) -> Pose {
        self.state.lock().publish().pose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pose_types::{Quat, Vec3};

    fn packet(device: TrackedDeviceId, seq: u32) -> PosePacket {
        let pose = Pose {
            orientation: Quat::IDENTITY,
            position: Vec3::new(0.1, 0.2, -0.3),
            angular_velocity: Vec3::ZERO,
        };
        PosePacket { buttons: 0x05, trigger: 255, ..PosePacket::new(device, seq, pose) }
    }

    #[test]
    fn watchdog_boundary() {
        let t0 = Instant::now();
        let mut s = DevicePoseState::new(TrackedDeviceId::Left, Duration::from_secs(1));
        assert!(s.apply_packet(&packet(TrackedDeviceId::Left, 1), t0));

        assert_eq!(s.check_connection(t0 + Duration::from_millis(990)), LinkState::Connected);
        assert!(s.publish().connected);
        assert_eq!(s.check_connection(t0 + Duration::from_millis(1010)), LinkState::Disconnected);
        let snap = s.publish();
        assert!(!snap.connected && !snap.pose_valid);
        // Last pose is still published while disconnected
        assert_eq!(snap.pose.position, Vec3::new(0.1, 0.2, -0.3));
    }

    #[test]
    fn exactly_timeout_is_still_connected() {
        let t0 = Instant::now();
        let mut s = DevicePoseState::new(TrackedDeviceId::Hmd, Duration::from_secs(1));
        s.apply_packet(&packet(TrackedDeviceId::Hmd, 1), t0);
        assert_eq!(s.check_connection(t0 + Duration::from_secs(1)), LinkState::Connected);
    }

    #[test]
    fn reconnects_on_next_packet() {
        let t0 = Instant::now();
        let mut s = DevicePoseState::new(TrackedDeviceId::Right, Duration::from_secs(1));
        s.apply_packet(&packet(TrackedDeviceId::Right, 1), t0);
        s.check_connection(t0 + Duration::from_secs(2));
        assert_eq!(s.state(), LinkState::Disconnected);
        s.apply_packet(&packet(TrackedDeviceId::Right, 2), t0 + Duration::from_secs(3));
        assert_eq!(s.state(), LinkState::Connected);
        assert_eq!(s.publish().sequence, Some(2));
    }

    #[test]
    fn never_fed_device_is_never_connected() {
        let t0 = Instant::now();
        let mut s = DevicePoseState::new(TrackedDeviceId::Left, Duration::from_secs(1));
        for ms in [0u64, 10, 999, 1000, 1001, 5000, 60_000] {
            assert_eq!(s.check_connection(t0 + Duration::from_millis(ms)), LinkState::Uninitialized);
            assert!(!s.publish().connected);
        }
        assert_eq!(s.publish().pose, TrackedDeviceId::Left.default_pose());
    }

    #[test]
    fn packet_for_other_device_is_ignored() {
        let mut s = DevicePoseState::new(TrackedDeviceId::Left, Duration::from_secs(1));
        assert!(!s.apply_packet(&packet(TrackedDeviceId::Right, 1), Instant::now()));
        assert_eq!(s.state(), LinkState::Uninitialized);
    }

    #[test]
    fn controller_inputs_follow_packet() {
        let mut s = DevicePoseState::new(TrackedDeviceId::Left, Duration::from_secs(1));
        s.apply_packet(&packet(TrackedDeviceId::Left, 1), Instant::now());
        let input = s.publish().input.unwrap();
        assert!(input.trigger_click());
        assert!(!input.grip());
        assert!(input.application_menu());
        assert_eq!(input.trigger_value(), 1.0);
        assert_eq!(input.is_pressed(InputComponent::TriggerValue), None);
    }

    #[test]
    fn hmd_exposes_no_inputs() {
        let mut s = DevicePoseState::new(TrackedDeviceId::Hmd, Duration::from_secs(1));
        s.apply_packet(&packet(TrackedDeviceId::Hmd, 1), Instant::now());
        assert_eq!(s.publish().input, None);
        assert!(input_components(TrackedDeviceId::Hmd).is_empty());
        assert_eq!(input_components(TrackedDeviceId::Right).len(), 5);
    }

    #[test]
    fn inactive_device_drops_packets() {
        let dev = TrackedDevice::new(TrackedDeviceId::Left, Duration::from_secs(1));
        assert!(!dev.update_from_packet(&packet(TrackedDeviceId::Left, 1), Instant::now()));
        dev.activate();
        assert!(dev.update_from_packet(&packet(TrackedDeviceId::Left, 1), Instant::now()));
        dev.deactivate();
        assert_eq!(dev.publish().state, LinkState::Uninitialized);
    }

    #[test]
    fn no_packet_lands_after_deactivate() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let dev = Arc::new(TrackedDevice::new(TrackedDeviceId::Right, Duration::from_secs(1)));
        dev.activate();
        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let (dev, stop) = (dev.clone(), stop.clone());
            std::thread::spawn(move || {
                let mut seq = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    dev.update_from_packet(&packet(TrackedDeviceId::Right, seq), Instant::now());
                    seq = seq.wrapping_add(1);
                }
            })
        };
        std::thread::sleep(Duration::from_millis(5));
        dev.deactivate();
        for _ in 0..1000 {
            assert_eq!(dev.publish().state, LinkState::Uninitialized);
        }
        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
        assert_eq!(dev.publish().state, LinkState::Uninitialized);
        assert_eq!(dev.publish().sequence, None);
    }

    #[test]
    fn registration_metadata_per_role() {
        let left = TrackedDevice::new(TrackedDeviceId::Left, Duration::from_secs(1));
        let hmd = TrackedDevice::new(TrackedDeviceId::Hmd, Duration::from_secs(1));
        assert_ne!(left.serial_number(), hmd.serial_number());
        assert!(!left.model_number().is_empty());
        assert_eq!(left.input_paths()[0], "/input/trigger/click");
        assert!(left.input_paths().contains(&"/input/trigger/value"));
        assert!(hmd.input_paths().is_empty());
    }
}
