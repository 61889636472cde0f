//! udp_tx.rs — UDP transmitter for PosePackets
//!
//! Sends encoded packets to the driver (127.0.0.1:5555) or to the calibration
//! hub (127.0.0.1:5554). Gyro feeds use the 48-byte layout on 5556.
//!
//! - One unconnected socket, `send_to` per packet
//! - Per-device u32 sequence counter, wrapping at 2^32
//! - Send errors are logged but never stop the tracker

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};

use bytes::BytesMut;
use pose_types::{PacketLayout, Pose, PoseCodec, PosePacket, TrackedDeviceId};
use tracing::{debug, warn};

pub struct PoseSender {
    socket: UdpSocket,
    target: SocketAddr,
    codec: PoseCodec,
    sequences: HashMap<TrackedDeviceId, u32>,
    buf: BytesMut,
    sent: u64,
}

impl PoseSender {
    /// Bind an ephemeral local socket for sending to `target`.
    pub fn new(target: SocketAddr, layout: PacketLayout) -> Result<Self, std::io::Error> {
        let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind)?;
        Ok(Self {
            socket,
            target,
            codec: PoseCodec::new(layout),
            sequences: HashMap::new(),
            buf: BytesMut::with_capacity(layout.len()),
            sent: 0,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn layout(&self) -> PacketLayout {
        self.codec.layout()
    }

    /// Datagrams handed to the OS so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Next sequence number for `device`, post-incrementing the counter.
    fn next_sequence(&mut self, device: TrackedDeviceId) -> u32 {
        let seq = self.sequences.entry(device).or_insert(0);
        let current = *seq;
        *seq = seq.wrapping_add(1);
        current
    }

    /// Send a bare pose (no buttons, trigger released).
    pub fn send_pose(&mut self, device: TrackedDeviceId, pose: Pose) {
        self.send_with_inputs(device, pose, 0, 0);
    }

    pub fn send_with_inputs(&mut self, device: TrackedDeviceId, pose: Pose, buttons: u16, trigger: u8) {
        let sequence = self.next_sequence(device);
        let packet = PosePacket { buttons, trigger, ..PosePacket::new(device, sequence, pose) };
        self.send_packet(&packet);
    }

    /// Encode and send as-is; the caller owns the sequence number.
    pub fn send_packet(&mut self, packet: &PosePacket) {
        self.buf.clear();
        self.codec.encode_into(packet, &mut self.buf);

        match self.socket.send_to(&self.buf, self.target) {
            Ok(_) => {
                self.sent += 1;
                debug!("UDP → {} device={} seq={}", self.target, packet.device_id, packet.sequence);
            }
            Err(e) => warn!("UDP: send to {} failed: {e}", self.target),
        }
    }

    #[cfg(test)]
    fn set_sequence(&mut self, device: TrackedDeviceId, seq: u32) {
        self.sequences.insert(device, seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn loopback() -> (UdpSocket, SocketAddr) {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        rx.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = rx.local_addr().unwrap();
        (rx, addr)
    }

    #[test]
    fn sequences_are_per_device_and_wrap() {
        let (rx, addr) = loopback();
        let codec = PoseCodec::default();
        let mut tx = PoseSender::new(addr, PacketLayout::WithTrigger).unwrap();
        tx.set_sequence(TrackedDeviceId::Right, u32::MAX);

        tx.send_pose(TrackedDeviceId::Left, Pose::default());
        tx.send_pose(TrackedDeviceId::Right, Pose::default());
        tx.send_pose(TrackedDeviceId::Right, Pose::default());
        tx.send_pose(TrackedDeviceId::Left, Pose::default());

        let mut buf = [0u8; 64];
        let mut seen = Vec::new();
        for _ in 0..4 {
            let n = rx.recv(&mut buf).unwrap();
            let p = codec.decode(&buf[..n]).unwrap();
            seen.push((p.device_id, p.sequence));
        }
        assert_eq!(seen, vec![(0, 0), (1, u32::MAX), (1, 0), (0, 1)]);
        assert_eq!(tx.sent(), 4);
    }

    #[test]
    fn short_layout_sends_48_bytes() {
        let (rx, addr) = loopback();
        let mut tx = PoseSender::new(addr, PacketLayout::NoTrigger).unwrap();
        tx.send_with_inputs(TrackedDeviceId::Left, Pose::default(), 0x03, 200);

        let mut buf = [0u8; 64];
        let n = rx.recv(&mut buf).unwrap();
        assert_eq!(n, 48);
        let p = PoseCodec::new(PacketLayout::NoTrigger).decode(&buf[..n]).unwrap();
        assert_eq!(p.buttons, 0x03);
        assert_eq!(p.trigger, 0);
    }
}
