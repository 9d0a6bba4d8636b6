//! Shared helpers for pigateway integration tests
//!
//! Devices are in-memory (`MockOpener`); feeds are `ScriptedSource`s that
//! replay JSON bodies through the real document parser.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use portalproto::{parse_status, LocationState};
use serde_json::{json, Value};

use pigateway::device::mock::{MockOpener, MockPort};
use pigateway::{HandshakeSettings, SourceError, StatusSource};

/// Replays status documents in order, repeating the last one forever.
pub struct ScriptedSource {
    name: String,
    bodies: Mutex<VecDeque<Vec<u8>>>,
    last: Mutex<Option<Vec<u8>>>,
}

impl ScriptedSource {
    pub fn new(name: &str, docs: Vec<Value>) -> Self {
        Self {
            name: name.to_string(),
            bodies: Mutex::new(docs.iter().map(|d| d.to_string().into_bytes()).collect()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<LocationState, SourceError> {
        let next = self.bodies.lock().unwrap().pop_front();
        let body = match next {
            Some(body) => {
                *self.last.lock().unwrap() = Some(body.clone());
                body
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| b"{}".to_vec()),
        };
        Ok(parse_status(&body)?)
    }
}

/// A tecthulhu status document.
pub fn tecthulhu(title: &str, faction: &str, health: u32, resonators: Value) -> Value {
    json!({
        "status": {
            "title": title,
            "owner": "agent",
            "level": 5,
            "health": health,
            "controllingFaction": faction,
            "mods": ["HS-VR", "FA"],
            "resonators": resonators,
        }
    })
}

pub fn fast_handshake() -> HandshakeSettings {
    HandshakeSettings {
        settle: Duration::ZERO,
        timeout: Duration::from_secs(1),
        write_timeout: Duration::from_secs(1),
    }
}

/// Opener with one core controller per path.
pub fn opener_with(paths: &[&str]) -> (Arc<MockOpener>, Vec<Arc<MockPort>>) {
    let opener = Arc::new(MockOpener::new());
    let ports = paths.iter().map(|p| opener.add(p, "core\n")).collect();
    (opener, ports)
}

/// Poll `check` until it holds or `limit` passes.
pub async fn eventually<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
