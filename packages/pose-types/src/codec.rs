//! Fixed-size little-endian codec for [`PosePacket`].
//!
//! ```text
//! offset  size  field
//!      0     1  device_id      u8
//!      1     4  sequence       u32
//!      5    16  quat w,x,y,z   4 × f32
//!     21    12  position       3 × f32
//!     33    12  angular vel    3 × f32
//!     45     2  buttons        u16
//!     47     1  trigger        u8      (49-byte layout only)
//!   N-1     1  checksum       u8      sum of bytes [0, N-1) mod 256
//! ```

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::{Pose, PosePacket, Quat, Vec3};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("packet size mismatch: expected {expected} bytes, got {actual}")]
    Size { expected: usize, actual: usize },
    #[error("checksum mismatch: computed {expected:#04x}, packet carries {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
    #[error("non-finite {field} in packet")]
    NonFinite { field: &'static str },
}

/// Which of the two deployed packet layouts is on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PacketLayout {
    /// 49 bytes, trailing analog trigger byte before the checksum
    #[default]
    WithTrigger,
    /// 48 bytes, no trigger byte (gyro-mouse feed)
    NoTrigger,
}

impl PacketLayout {
    pub const fn len(self) -> usize {
        match self {
            Self::WithTrigger => 49,
            Self::NoTrigger => 48,
        }
    }

    pub const fn has_trigger(self) -> bool {
        matches!(self, Self::WithTrigger)
    }
}

impl std::str::FromStr for PacketLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "49" | "with-trigger" | "trigger" => Ok(Self::WithTrigger),
            "48" | "no-trigger" | "notrigger" => Ok(Self::NoTrigger),
            other => Err(format!("unknown packet layout '{other}' (expected 48 or 49)")),
        }
    }
}

/// Additive 8-bit checksum over `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Encoder/decoder bound to one packet layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoseCodec {
    layout: PacketLayout,
}

impl PoseCodec {
    pub const fn new(layout: PacketLayout) -> Self {
        Self { layout }
    }

    pub const fn layout(&self) -> PacketLayout {
        self.layout
    }

    pub const fn expected_len(&self) -> usize {
        self.layout.len()
    }

    /// Encode into a fresh buffer of exactly [`Self::expected_len`] bytes.
    pub fn encode(&self, packet: &PosePacket) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.expected_len());
        self.encode_into(packet, &mut buf);
        buf.to_vec()
    }

    /// Append one encoded packet to `buf`.
    pub fn encode_into(&self, packet: &PosePacket, buf: &mut BytesMut) {
        let start = buf.len();
        let pose = &packet.pose;

        buf.put_u8(packet.device_id);
        buf.put_u32_le(packet.sequence);
        for v in [pose.orientation.w, pose.orientation.x, pose.orientation.y, pose.orientation.z] {
            buf.put_f32_le(v);
        }
        for v in pose.position.to_array() {
            buf.put_f32_le(v);
        }
        for v in pose.angular_velocity.to_array() {
            buf.put_f32_le(v);
        }
        buf.put_u16_le(packet.buttons);
        if self.layout.has_trigger() {
            buf.put_u8(packet.trigger);
        }

        let sum = checksum(&buf[start..]);
        buf.put_u8(sum);
    }

    /// Decode one datagram.
    ///
    /// Length is checked before anything else is read; the checksum is
    /// verified before any field is interpreted.
    pub fn decode(&self, data: &[u8]) -> Result<PosePacket, CodecError> {
        let expected = self.expected_len();
        if data.len() != expected {
            return Err(CodecError::Size { expected, actual: data.len() });
        }

        let (body, tail) = data.split_at(expected - 1);
        let computed = checksum(body);
        let carried = tail[0];
        if computed != carried {
            return Err(CodecError::Checksum { expected: computed, actual: carried });
        }

        let mut buf = body;
        let device_id = buf.get_u8();
        let sequence = buf.get_u32_le();
        let orientation = Quat::new(
            buf.get_f32_le(),
            buf.get_f32_le(),
            buf.get_f32_le(),
            buf.get_f32_le(),
        );
        let position = read_vec3(&mut buf);
        let angular_velocity = read_vec3(&mut buf);
        let buttons = buf.get_u16_le();
        let trigger = if self.layout.has_trigger() { buf.get_u8() } else { 0 };

        if !position.is_finite() {
            return Err(CodecError::NonFinite { field: "position" });
        }
        if !angular_velocity.is_finite() {
            return Err(CodecError::NonFinite { field: "angular velocity" });
        }

        Ok(PosePacket {
            device_id,
            sequence,
            pose: Pose {
                orientation: orientation.normalized(),
                position,
                angular_velocity,
            },
            buttons,
            trigger,
        })
    }
}

fn read_vec3(buf: &mut &[u8]) -> Vec3 {
    Vec3::new(buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackedDeviceId;

    fn sample() -> PosePacket {
        PosePacket {
            device_id: 0,
            sequence: 42,
            pose: Pose {
                orientation: Quat::IDENTITY,
                position: Vec3::new(0.1, 0.2, -0.3),
                angular_velocity: Vec3::ZERO,
            },
            buttons: 0,
            trigger: 0,
        }
    }

    #[test]
    fn encodes_expected_field_offsets() {
        let codec = PoseCodec::new(PacketLayout::WithTrigger);
        let mut p = sample();
        p.buttons = 0x0102;
        p.trigger = 200;
        let bytes = codec.encode(&p);

        assert_eq!(bytes.len(), 49);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..5], &42u32.to_le_bytes());
        assert_eq!(&bytes[5..9], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[21..25], &0.1f32.to_le_bytes());
        assert_eq!(&bytes[29..33], &(-0.3f32).to_le_bytes());
        assert_eq!(&bytes[45..47], &0x0102u16.to_le_bytes());
        assert_eq!(bytes[47], 200);
        assert_eq!(bytes[48], checksum(&bytes[..48]));
    }

    #[test]
    fn concrete_packet_decodes_exactly() {
        let codec = PoseCodec::new(PacketLayout::WithTrigger);
        let decoded = codec.decode(&codec.encode(&sample())).unwrap();
        assert_eq!(decoded, sample());
        assert_eq!(decoded.device(), Some(TrackedDeviceId::Left));
    }

    #[test]
    fn short_layout_has_no_trigger() {
        let codec = PoseCodec::new(PacketLayout::NoTrigger);
        let mut p = sample();
        p.trigger = 99;
        p.buttons = 0x03;
        let bytes = codec.encode(&p);
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[45..47], &3u16.to_le_bytes());

        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.trigger, 0);
        assert_eq!(decoded.buttons, 3);
    }

    #[test]
    fn layouts_reject_each_other() {
        let long = PoseCodec::new(PacketLayout::WithTrigger);
        let short = PoseCodec::new(PacketLayout::NoTrigger);
        assert_eq!(
            short.decode(&long.encode(&sample())),
            Err(CodecError::Size { expected: 48, actual: 49 })
        );
        assert_eq!(
            long.decode(&short.encode(&sample())),
            Err(CodecError::Size { expected: 49, actual: 48 })
        );
    }

    #[test]
    fn corrupted_checksum_byte_is_rejected() {
        let codec = PoseCodec::default();
        let mut bytes = codec.encode(&sample());
        let last = bytes.len() - 1;
        bytes[last] = bytes[last].wrapping_add(1);
        assert!(matches!(codec.decode(&bytes), Err(CodecError::Checksum { .. })));
    }

    #[test]
    fn non_unit_quaternion_is_normalized_on_decode() {
        let codec = PoseCodec::default();
        let mut p = sample();
        p.pose.orientation = Quat::new(0.0, 0.0, 2.0, 0.0);
        let decoded = codec.decode(&codec.encode(&p)).unwrap();
        assert_eq!(decoded.pose.orientation, Quat::new(0.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn non_finite_position_is_rejected() {
        let codec = PoseCodec::default();
        let mut p = sample();
        p.pose.position.y = f32::INFINITY;
        assert_eq!(
            codec.decode(&codec.encode(&p)),
            Err(CodecError::NonFinite { field: "position" })
        );
    }

    #[test]
    fn layout_parses_from_config_strings() {
        assert_eq!("49".parse::<PacketLayout>(), Ok(PacketLayout::WithTrigger));
        assert_eq!("no-trigger".parse::<PacketLayout>(), Ok(PacketLayout::NoTrigger));
        assert!("50".parse::<PacketLayout>().is_err());
    }
}
