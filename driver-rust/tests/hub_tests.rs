//! Calibration hub relay over loopback UDP.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

use pose_types::{Pose, PoseCodec, PosePacket, TrackedDeviceId, Vec3};
use tokio::sync::mpsc;
use vrpose_driver::persistence::load_calibration;
use vrpose_driver::{Hub, HubCommand, HubConfig};

fn hub_config(forward: std::net::SocketAddr, dir: &tempfile::TempDir) -> HubConfig {
    HubConfig {
        listen_port: 0,
        bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        forward_addr: forward,
        rate_hz: 200.0,
        calibration_file: dir.path().join("calibration.json"),
        ..HubConfig::default()
    }
}

fn raw_packet(seq: u32, position: Vec3) -> Vec<u8> {
    let pose = Pose { position, ..Pose::default() };
    PoseCodec::default().encode(&PosePacket::new(TrackedDeviceId::Left, seq, pose))
}

/// Next forwarded packet, off the async runtime's worker.
async fn next_forwarded(sink: &UdpSocket) -> PosePacket {
    let sink = sink.try_clone().unwrap();
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 256];
        let (len, _) = sink.recv_from(&mut buf).expect("forwarded packet");
        PoseCodec::default().decode(&buf[..len]).unwrap()
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_hub_relays_and_recenters() {
    let dir = tempfile::tempdir().unwrap();
    let sink = UdpSocket::bind("127.0.0.1:0").unwrap();
    sink.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let cfg = hub_config(sink.local_addr().unwrap(), &dir);
    let store = cfg.calibration_file.clone();

    let hub = Hub::bind(cfg).await.unwrap();
    let hub_addr = hub.local_addr().unwrap();
    let (tx, rx) = mpsc::channel(4);
    let task = tokio::spawn(hub.run(rx));

    let tracker = UdpSocket::bind("127.0.0.1:0").unwrap();
    let raw = Vec3::new(0.3, -0.1, -0.9);
    tracker.send_to(&raw_packet(500, raw), hub_addr).unwrap();

    let first = next_forwarded(&sink).await;
    assert_eq!(first.device(), Some(TrackedDeviceId::Left));
    assert_eq!(first.pose.position, raw, "identity calibration passes through");

    tx.send(HubCommand::Recenter(TrackedDeviceId::Left)).await.unwrap();

    let mut recentered = None;
    for seq in 501..700 {
        tracker.send_to(&raw_packet(seq, raw), hub_addr).unwrap();
        let p = next_forwarded(&sink).await;
        if p.pose.position.length() < 1e-6 {
            recentered = Some(p);
            break;
        }
    }
    let recentered = recentered.expect("recentered pose forwarded");
    assert!(recentered.sequence > first.sequence);

    // Persisted after the command.
    let mut saved = None;
    for _ in 0..100 {
        let set = load_calibration(&store).await;
        if !set.left.is_identity() {
            saved = Some(set);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(saved.expect("calibration saved").left.reference_position, raw);

    task.abort();
}

#[tokio::test]
async fn test_hub_picks_up_stored_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let sink = UdpSocket::bind("127.0.0.1:0").unwrap();
    sink.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let cfg = hub_config(sink.local_addr().unwrap(), &dir);

    let mut set = vrpose_driver::CalibrationSet::default();
    set.left.offset = Vec3::new(0.0, 1.0, 0.0);
    vrpose_driver::persistence::save_calibration(&cfg.calibration_file, &set).await.unwrap();

    let hub = Hub::bind(cfg).await.unwrap();
    let hub_addr = hub.local_addr().unwrap();
    let (_tx, rx) = mpsc::channel(1);
    let task = tokio::spawn(hub.run(rx));

    let tracker = UdpSocket::bind("127.0.0.1:0").unwrap();
    tracker.send_to(&raw_packet(1, Vec3::new(0.2, 0.0, -1.0)), hub_addr).unwrap();
    let out = next_forwarded(&sink).await;
    assert!(out.pose.position.sub(Vec3::new(0.2, 1.0, -1.0)).length() < 1e-6);

    task.abort();
}

#[tokio::test]
async fn test_hub_bind_conflict_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let occupied = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut cfg = hub_config(occupied.local_addr().unwrap(), &dir);
    cfg.listen_port = occupied.local_addr().unwrap().port();
    assert!(Hub::bind(cfg).await.is_err());
}
