//! Heartbeat expiry and peer shutdown.

use std::time::Duration;

use anyhow::Result;
use locator_services::PeerPhase;

use crate::*;

const SHORT_HEARTBEAT_MS: u64 = 300;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_peer_is_evicted_and_pruned() -> Result<()> {
    let a = spawn_node("node-a", SHORT_HEARTBEAT_MS).await?;
    let b = spawn_node("node-b", LONG_HEARTBEAT_MS).await?;
    attach(&b, "storage")?;

    a.observe(key_of(&b));
    wait_until("a resolves b's storage", || resolves(&a, "storage")).await?;

    // b pushes nothing and is never announced again
    wait_until("b is evicted", || a.snapshot().peers.is_empty()).await?;
    assert!(!resolves(&a, "storage"));

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn announcements_keep_peer_alive() -> Result<()> {
    let a = spawn_node("node-a", SHORT_HEARTBEAT_MS).await?;
    let b = spawn_node("node-b", LONG_HEARTBEAT_MS).await?;
    attach(&b, "storage")?;

    a.observe(key_of(&b));
    wait_until("a resolves b's storage", || resolves(&a, "storage")).await?;

    for _ in 0..10 {
        a.observe(key_of(&b));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(peer_phase(&a, "node-b"), Some(PeerPhase::Live));
    }
    assert!(resolves(&a, "storage"));

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn evicted_peer_is_rediscovered() -> Result<()> {
    let a = spawn_node("node-a", SHORT_HEARTBEAT_MS).await?;
    let b = spawn_node("node-b", LONG_HEARTBEAT_MS).await?;
    attach(&b, "storage")?;

    a.observe(key_of(&b));
    wait_until("a resolves b's storage", || resolves(&a, "storage")).await?;
    wait_until("b is evicted", || a.snapshot().peers.is_empty()).await?;

    a.observe(key_of(&b));
    wait_until("a resolves b's storage again", || resolves(&a, "storage")).await?;

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peer_shutdown_prunes_immediately() -> Result<()> {
    let a = spawn_node("node-a", LONG_HEARTBEAT_MS).await?;
    let b = spawn_node("node-b", LONG_HEARTBEAT_MS).await?;
    attach(&b, "storage")?;

    a.observe(key_of(&b));
    wait_until("a resolves b's storage", || resolves(&a, "storage")).await?;

    b.shutdown().await;
    wait_until("b's services are pruned", || !resolves(&a, "storage")).await?;
    wait_until("b is removed", || a.snapshot().peers.is_empty()).await?;

    a.shutdown().await;
    Ok(())
}
