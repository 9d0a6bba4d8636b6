//! End-to-end behaviour of the gateway against in-memory devices.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use gateconf::GatewayConfig;
use portalproto::{Cue, Faction, LocationState};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use pigateway::serve::{run_with, Collaborators};
use pigateway::{
    CueSender, DeviceHandle, DeviceRegistry, Dispatcher, ErrorReporter, FixedDevices, Gateway,
    StatusSource,
};

use common::{eventually, fast_handshake, opener_with, tecthulhu, ScriptedSource};

async fn gateway_for(paths: &[&str]) -> (Gateway, Vec<Arc<pigateway::device::mock::MockPort>>) {
    let (opener, ports) = opener_with(paths);
    let registry = DeviceRegistry::new_shared();
    for path in paths {
        let handle = DeviceHandle::connect(opener.clone(), "Alpha", path, &fast_handshake())
            .await
            .unwrap();
        assert!(registry.register_if_absent(handle));
    }
    let (errors, _rx) = ErrorReporter::channel(8, Duration::from_millis(10));
    (Gateway::new("Alpha", Dispatcher::new(registry, errors)), ports)
}

#[tokio::test]
async fn capture_sequence_drives_frames_and_cues() {
    let (gateway, ports) = gateway_for(&["/dev/ttyUSB0"]).await;
    let (audio, mut queues) = CueSender::channel(4, Duration::from_millis(100));
    let mut gateway = gateway.with_audio(audio);

    let first = LocationState::new("Alpha", Faction::Enlightened, 80.0)
        .with_resonator("N", 6.0, 90.0);
    let t = gateway.handle(first).await;

    assert!(t.first_observation);
    assert!(!t.faction_changed);
    assert!(t.effects.is_empty());
    assert_eq!(t.ambient, Some(Cue::named("e-ambient")));

    let frame = t.frame.unwrap();
    assert_eq!(frame.faction_byte(), b'e');
    // Compass order E, NE, N, ...: north is slot 2
    assert_eq!(frame.level_byte(2), b'6');
    for slot in [0, 1, 3, 4, 5, 6, 7] {
        assert_eq!(frame.level_byte(slot), b'0');
    }
    assert_eq!(frame.health_byte(), b' ' + 40);
    assert_eq!(frame.resonator_health_byte(2), b' ' + 45);
    assert_eq!(queues.ambient.recv().await, Some(Cue::named("e-ambient")));

    let second = LocationState::new("Alpha", Faction::Resistance, 80.0)
        .with_resonator("N", 6.0, 90.0);
    let t = gateway.handle(second).await;

    assert!(t.faction_changed);
    assert_eq!(t.effects, vec![Cue::named("e-loss"), Cue::named("r-capture")]);
    assert_eq!(t.ambient, Some(Cue::named("r-ambient")));
    assert_eq!(t.frame.unwrap().faction_byte(), b'R');
    assert_eq!(queues.ambient.recv().await, Some(Cue::named("r-ambient")));
    assert_eq!(
        queues.effects.recv().await,
        Some(vec![Cue::named("e-loss"), Cue::named("r-capture")])
    );

    let sent: Vec<u8> = ports[0].frames().iter().map(|f| f[0]).collect();
    assert_eq!(sent, vec![b'e', b'R']);
}

#[tokio::test]
async fn one_failing_device_does_not_stop_the_others() {
    let (mut gateway, ports) = gateway_for(&["/dev/ttyUSB0", "/dev/ttyUSB1"]).await;
    ports[0].fail_writes.store(true, Ordering::SeqCst);

    gateway
        .handle(LocationState::new("Alpha", Faction::Neutral, 50.0))
        .await;
    gateway
        .handle(LocationState::new("Alpha", Faction::Neutral, 60.0))
        .await;

    assert!(ports[0].is_closed());
    assert_eq!(ports[1].frames().len(), 2);
}

fn test_config(audio_dir: &std::path::Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.gateway.home = "Alpha".to_string();
    config.gateway.refresh_ms = 100;
    config.sources.poll_ms = 150;
    config.devices.fixed = vec!["/dev/ttyMOCK0".to_string()];
    config.devices.scan_ms = 20;
    config.devices.settle_ms = 0;
    config.devices.handshake_timeout_ms = 1000;
    config.devices.write_timeout_ms = 1000;
    config.audio.dir = audio_dir.to_path_buf();
    config
}

#[tokio::test]
async fn full_service_runs_and_closes_devices() {
    let sounds = tempfile::tempdir().unwrap();
    let config = test_config(sounds.path());

    let (opener, ports) = opener_with(&["/dev/ttyMOCK0"]);
    let source = ScriptedSource::new(
        "scripted",
        vec![
            tecthulhu(
                "Alpha",
                "Enlightened",
                80,
                json!([{"position": "N", "level": 6, "health": 90}]),
            ),
            tecthulhu("Beta", "Resistance", 20, json!([])),
            tecthulhu(
                "Alpha",
                "Resistance",
                100,
                json!([{"position": "N", "level": 8, "health": 100}]),
            ),
        ],
    );
    let collaborators = Collaborators {
        opener,
        discovery: Arc::new(FixedDevices::new(config.devices.fixed.clone())),
        sources: vec![Arc::new(source) as Arc<dyn StatusSource>],
    };

    let cancel = CancellationToken::new();
    let service = tokio::spawn(run_with(config, collaborators, cancel.clone()));

    let port = Arc::clone(&ports[0]);
    let captured = eventually(Duration::from_secs(5), || {
        port.frames().iter().any(|f| f[0] == b'R')
    })
    .await;
    assert!(captured, "resistance capture frame never arrived");

    cancel.cancel();
    let closed = service.await.unwrap().unwrap();

    assert_eq!(closed, vec!["/dev/ttyMOCK0"]);
    assert!(ports[0].is_closed());
    // Every frame is a full fixed-width line
    assert!(ports[0].frames().iter().all(|f| f.len() == 23 && f[22] == b'\n'));
}
