//! transport.rs — UDP datagram plumbing
//!
//! - [`PoseReceiver`]: one non-blocking socket, polled from the network thread.
//!   Bind failure is a startup error; any receive error just means "no data".
//! - [`DatagramSender`]: unconnected `send_to`, one datagram per packet.
//!
//! No reliability, ordering or reassembly. Each pose packet fits one datagram.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use thiserror::Error;
use tracing::debug;

/// Larger than any pose packet; oversized datagrams are truncated by the OS
/// and then fail the exact-size check.
pub const RECV_BUFFER_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind UDP {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("UDP socket error: {0}")]
    Socket(#[from] io::Error),
}

// ── Receiver ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PoseReceiver {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl PoseReceiver {
    /// Bind and switch to non-blocking mode.
    pub fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;
        Ok(Self { socket, local_addr })
    }

    /// Listen on every interface.
    pub fn start(port: u16) -> Result<Self, TransportError> {
        Self::bind(SocketAddr::from(([0, 0, 0, 0], port)))
    }

    /// Actual bound address (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// One pending datagram copied into `buf`, or None if nothing is queued.
    pub fn try_receive<'a>(&self, buf: &'a mut [u8]) -> Option<&'a [u8]> {
        match self.socket.recv_from(buf) {
            Ok((len, _src)) => Some(&buf[..len]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                // e.g. ICMP port-unreachable surfacing as ConnectionReset on Windows
                debug!("UDP recv error (ignored): {e}");
                None
            }
        }
    }
}

// ── Sender ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct DatagramSender {
    socket: UdpSocket,
}

impl DatagramSender {
    /// Ephemeral local port on all IPv4 interfaces.
    pub fn new() -> Result<Self, TransportError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], 0));
        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self { socket })
    }

    pub fn send(&self, bytes: &[u8], destination: SocketAddr) -> Result<usize, TransportError> {
        Ok(self.socket.send_to(bytes, destination)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn recv_within(rx: &PoseReceiver, buf: &mut [u8], limit: Duration) -> Option<Vec<u8>> {
        let start = Instant::now();
        while start.elapsed() < limit {
            if let Some(data) = rx.try_receive(buf) {
                return Some(data.to_vec());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn empty_socket_is_not_an_error() {
        let rx = PoseReceiver::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut buf = [0u8; RECV_BUFFER_LEN];
        assert!(rx.try_receive(&mut buf).is_none());
    }

    #[test]
    fn loopback_datagram_arrives_intact() {
        let rx = PoseReceiver::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let tx = DatagramSender::new().unwrap();
        tx.send(&[1, 2, 3, 4], rx.local_addr()).unwrap();

        let mut buf = [0u8; RECV_BUFFER_LEN];
        let got = recv_within(&rx, &mut buf, Duration::from_secs(2)).unwrap();
        assert_eq!(got, vec![1, 2, 3, 4]);
    }

    #[test]
    fn bind_conflict_is_reported_with_address() {
        let first = PoseReceiver::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let err = PoseReceiver::bind(first.local_addr()).unwrap_err();
        match err {
            TransportError::Bind { addr, .. } => assert_eq!(addr, first.local_addr()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
