//! # pose-types
//!
//! Shared pose structures and the UDP wire codec for the VR pose bridge.
//!
//! These types are used by:
//! - `marker-tracker`: producing PosePackets from marker observations or gyro input
//! - `driver-rust`: receiving PosePackets and feeding per-device pose state
//! - the calibration hub inside `driver-rust`, which decodes, recalibrates and re-encodes
//!
//! ## Coordinate Conventions
//!
//! - **Camera frame**: X = right, Y = down, Z = forward into the scene
//! - **Output (host) frame**: X = right, Y = up, Z = backward (towards the user)
//! - Quaternions are stored and transmitted as (w, x, y, z)
//!
//! ## Invariants
//! - Every pose leaving [`PoseCodec::decode`] carries a unit quaternion
//! - Packets are fixed-size and little-endian; the last byte is an additive checksum

use serde::{Deserialize, Serialize};

mod codec;

pub use codec::{checksum, CodecError, PacketLayout, PoseCodec};

// ── Tracked Device Id ─────────────────────────────────────────────────────────

/// Role of a tracked device. The numeric value is the wire `device_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum TrackedDeviceId {
    /// Left hand controller
    Left = 0,
    /// Right hand controller
    Right = 1,
    /// Head-mounted display
    Hmd = 2,
}

impl TrackedDeviceId {
    pub const ALL: [TrackedDeviceId; 3] = [Self::Left, Self::Right, Self::Hmd];

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            2 => Some(Self::Hmd),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Visual marker id printed on the device.
    pub fn marker_id(self) -> u32 {
        self as u32
    }

    pub fn is_controller(self) -> bool {
        !matches!(self, Self::Hmd)
    }

    pub fn serial_number(self) -> &'static str {
        match self {
            Self::Left => "CV_Controller_Left",
            Self::Right => "CV_Controller_Right",
            Self::Hmd => "CV_HMD",
        }
    }

    pub fn model_number(self) -> &'static str {
        match self {
            Self::Left | Self::Right => "CV_Controller_MK1",
            Self::Hmd => "CV_HMD_MK1",
        }
    }

    /// Resting pose reported before the first packet arrives
    /// (controllers roughly at chest height, HMD at standing eye height).
    pub fn default_pose(self) -> Pose {
        let position = match self {
            Self::Left => Vec3::new(-0.2, 1.0, -0.3),
            Self::Right => Vec3::new(0.2, 1.0, -0.3),
            Self::Hmd => Vec3::new(0.0, 1.6, 0.0),
        };
        Pose { position, ..Pose::default() }
    }
}

impl std::fmt::Display for TrackedDeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Hmd => "HMD",
        };
        f.write_str(s)
    }
}

// ── 3D Vector & Quaternion ────────────────────────────────────────────────────

/// 3D vector (meters, or rad/s for angular velocity)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }

    pub fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }

    /// Per-axis product
    pub fn mul(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x * o.x, self.y * o.y, self.z * o.z)
    }

    pub fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Orientation quaternion (w, x, y, z)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };

    /// Squared norm tolerance inside which a quaternion is left untouched.
    pub const UNIT_TOLERANCE: f32 = 1e-4;

    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    pub fn norm_squared(&self) -> f32 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Unit-norm version of this quaternion.
    ///
    /// Already-unit inputs come back bit-identical; zero-length or non-finite
    /// inputs collapse to identity.
    pub fn normalized(&self) -> Quat {
        let n2 = self.norm_squared();
        if !n2.is_finite() || n2 < 1e-12 {
            return Quat::IDENTITY;
        }
        if (n2 - 1.0).abs() <= Self::UNIT_TOLERANCE {
            return *self;
        }
        let n = n2.sqrt();
        Quat::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    pub fn conjugate(&self) -> Quat {
        Quat::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Hamilton product `self * rhs`: apply `rhs` first, then `self`.
    pub fn mul(&self, rhs: &Quat) -> Quat {
        let (w1, x1, y1, z1) = (self.w, self.x, self.y, self.z);
        let (w2, x2, y2, z2) = (rhs.w, rhs.x, rhs.y, rhs.z);
        Quat::new(
            w1 * w2 - x1 * x2 - y1 * y2 - z1 * z2,
            w1 * x2 + x1 * w2 + y1 * z2 - z1 * y2,
            w1 * y2 - x1 * z2 + y1 * w2 + z1 * x2,
            w1 * z2 + x1 * y2 - y1 * x2 + z1 * w2,
        )
    }

    /// Rotation matrix (row-major) → unit quaternion, with w ≥ 0.
    pub fn from_rotation_matrix(m: &[[f32; 3]; 3]) -> Quat {
        let trace = m[0][0] + m[1][1] + m[2][2];
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Quat::new(0.25 * s, (m[2][1] - m[1][2]) / s, (m[0][2] - m[2][0]) / s, (m[1][0] - m[0][1]) / s)
        } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
            let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
            Quat::new((m[2][1] - m[1][2]) / s, 0.25 * s, (m[0][1] + m[1][0]) / s, (m[0][2] + m[2][0]) / s)
        } else if m[1][1] > m[2][2] {
            let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
            Quat::new((m[0][2] - m[2][0]) / s, (m[0][1] + m[1][0]) / s, 0.25 * s, (m[1][2] + m[2][1]) / s)
        } else {
            let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
            Quat::new((m[1][0] - m[0][1]) / s, (m[0][2] + m[2][0]) / s, (m[1][2] + m[2][1]) / s, 0.25 * s)
        };
        let q = if q.w < 0.0 { Quat::new(-q.w, -q.x, -q.y, -q.z) } else { q };
        q.normalized()
    }

    /// Convert quaternion to 3×3 rotation matrix (row-major)
    pub fn to_rotation_matrix(&self) -> [[f32; 3]; 3] {
        let (x, y, z, w) = (self.x, self.y, self.z, self.w);
        [
            [1.0 - 2.0*(y*y + z*z), 2.0*(x*y - w*z),       2.0*(x*z + w*y)],
            [2.0*(x*y + w*z),        1.0 - 2.0*(x*x + z*z), 2.0*(y*z - w*x)],
            [2.0*(x*z - w*y),        2.0*(y*z + w*x),       1.0 - 2.0*(x*x + y*y)],
        ]
    }

    /// Rotate a vector by this (unit) quaternion.
    pub fn rotate_vec3(&self, v: Vec3) -> Vec3 {
        let r = self.to_rotation_matrix();
        Vec3 {
            x: r[0][0]*v.x + r[0][1]*v.y + r[0][2]*v.z,
            y: r[1][0]*v.x + r[1][1]*v.y + r[1][2]*v.z,
            z: r[2][0]*v.x + r[2][1]*v.y + r[2][2]*v.z,
        }
    }
}

// ── Pose ──────────────────────────────────────────────────────────────────────

/// Orientation + position + angular velocity of one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub orientation: Quat,
    /// Meters, output frame
    pub position: Vec3,
    /// rad/s
    pub angular_velocity: Vec3,
}

// ── Controller buttons ────────────────────────────────────────────────────────

/// Button bit flags carried in the `buttons` field.
pub mod buttons {
    pub const TRIGGER_CLICK: u16 = 0x01;
    pub const GRIP: u16 = 0x02;
    pub const APPLICATION_MENU: u16 = 0x04;
    pub const SYSTEM: u16 = 0x08;
}

// ── Pose Packet ───────────────────────────────────────────────────────────────

/// One UDP datagram worth of pose data.
///
/// Wire format: 49 bytes ([`PacketLayout::WithTrigger`]) or 48 bytes
/// ([`PacketLayout::NoTrigger`]), little-endian, additive checksum last.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PosePacket {
    /// Raw wire id; see [`TrackedDeviceId::from_u8`]
    pub device_id: u8,
    /// Per-device sender counter, wraps at 2^32. Advisory only.
    pub sequence: u32,
    pub pose: Pose,
    /// Bit flags, see [`buttons`]
    pub buttons: u16,
    /// Analog trigger 0–255. Always 0 for the 48-byte layout.
    pub trigger: u8,
}

impl PosePacket {
    pub fn new(device: TrackedDeviceId, sequence: u32, pose: Pose) -> Self {
        Self {
            device_id: device.as_u8(),
            sequence,
            pose,
            buttons: 0,
            trigger: 0,
        }
    }

    pub fn device(&self) -> Option<TrackedDeviceId> {
        TrackedDeviceId::from_u8(self.device_id)
    }
}
