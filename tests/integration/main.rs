//! Locator integration test harness.
//!
//! Every test runs two or more locators in-process on loopback. Multicast
//! discovery is disabled; announcements are fed through
//! `LocatorHandle::observe` so tests control exactly when a node is seen.
//!
//!   cargo test --test integration

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::runtime::Handle;

use locator_core::config::{BootstrapService, LocatorConfig};
use locator_core::PeerKey;
use locator_services::{AdhocGateway, Gateway, PeerPhase};
use locatord::actor::ListenerActor;
use locatord::LocatorHandle;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const LONG_HEARTBEAT_MS: u64 = 60_000;

pub fn node_config(uuid: &str, heartbeat_timeout_ms: u64) -> LocatorConfig {
    let mut config = LocatorConfig::default();
    config.network.uuid = uuid.into();
    config.network.hostname = "127.0.0.1".into();
    config.network.endpoint = "127.0.0.1".into();
    config.network.locator_port = 0;
    config.discovery.enabled = false;
    config.discovery.heartbeat_timeout_ms = heartbeat_timeout_ms;
    config.discovery.connect_timeout_ms = 1_000;
    config
}

/// Start a locator that tracks peers through an AdhocGateway.
pub async fn spawn_node(uuid: &str, heartbeat_timeout_ms: u64) -> Result<LocatorHandle> {
    let gateway: Arc<dyn Gateway> = Arc::new(AdhocGateway::new());
    locatord::start(&node_config(uuid, heartbeat_timeout_ms), Some(gateway)).await
}

/// Announcement `node` would send.
pub fn key_of(node: &LocatorHandle) -> PeerKey {
    node.local_key().clone()
}

/// Attach a listener service on `node`.
pub fn attach(node: &LocatorHandle, name: &str) -> Result<()> {
    let service = BootstrapService {
        name: name.into(),
        version: 1,
        methods: vec!["get".into()],
    };
    node.registry()
        .attach(name, Box::new(ListenerActor::new(&service, Handle::current())))?;
    Ok(())
}

/// Poll `check` until it holds or five seconds pass.
pub async fn wait_until<F: FnMut() -> bool>(what: &str, mut check: F) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("timed out waiting for {what}")
}

pub fn resolves(node: &LocatorHandle, name: &str) -> bool {
    node.registry().resolve(name).is_ok()
}

pub fn peer_phase(node: &LocatorHandle, uuid: &str) -> Option<PeerPhase> {
    node.snapshot()
        .peers
        .into_iter()
        .find(|p| p.uuid == uuid)
        .map(|p| p.phase)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

mod eviction;
mod sync;
