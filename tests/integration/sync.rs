//! Table exchange between live peers.

use std::time::Duration;

use anyhow::Result;
use locator_core::LocatorError;
use locator_services::PeerPhase;

use crate::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn discovered_peer_table_is_resolvable() -> Result<()> {
    let a = spawn_node("node-a", LONG_HEARTBEAT_MS).await?;
    let b = spawn_node("node-b", LONG_HEARTBEAT_MS).await?;
    attach(&b, "storage")?;

    a.observe(key_of(&b));
    wait_until("a resolves b's storage", || resolves(&a, "storage")).await?;

    let info = a.registry().resolve("storage")?;
    assert_eq!(info.endpoint.host, "127.0.0.1");
    assert_eq!(info.methods.get(&0).map(String::as_str), Some("get"));
    assert_eq!(peer_phase(&a, "node-b"), Some(PeerPhase::Live));

    // b never heard of a, so it resolves nothing remote
    assert!(matches!(
        b.registry().resolve("queue"),
        Err(LocatorError::ServiceUnavailable(_))
    ));

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn attach_and_detach_are_pushed() -> Result<()> {
    let a = spawn_node("node-a", LONG_HEARTBEAT_MS).await?;
    let b = spawn_node("node-b", LONG_HEARTBEAT_MS).await?;

    a.observe(key_of(&b));
    wait_until("b is live on a", || peer_phase(&a, "node-b") == Some(PeerPhase::Live)).await?;
    assert!(!resolves(&a, "storage"));

    attach(&b, "storage")?;
    wait_until("attach reaches a", || resolves(&a, "storage")).await?;

    b.registry().detach("storage")?;
    wait_until("detach reaches a", || !resolves(&a, "storage")).await?;
    assert_eq!(peer_phase(&a, "node-b"), Some(PeerPhase::Live));

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_announcements_do_not_resubscribe() -> Result<()> {
    let a = spawn_node("node-a", LONG_HEARTBEAT_MS).await?;
    let b = spawn_node("node-b", LONG_HEARTBEAT_MS).await?;
    attach(&b, "storage")?;

    for _ in 0..5 {
        a.observe(key_of(&b));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    wait_until("a resolves b's storage", || resolves(&a, "storage")).await?;

    assert_eq!(a.snapshot().peers.len(), 1);
    wait_until("b has one subscriber", || b.snapshot().subscribers == 1).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(b.snapshot().subscribers, 1);

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn local_service_wins_over_remote() -> Result<()> {
    let a = spawn_node("node-a", LONG_HEARTBEAT_MS).await?;
    let b = spawn_node("node-b", LONG_HEARTBEAT_MS).await?;
    attach(&a, "storage")?;
    attach(&b, "storage")?;

    a.observe(key_of(&b));
    wait_until("b is live on a", || peer_phase(&a, "node-b") == Some(PeerPhase::Live)).await?;

    let local_port = a.registry().dump()["storage"].endpoint.port;
    for _ in 0..8 {
        assert_eq!(a.registry().resolve("storage")?.endpoint.port, local_port);
    }

    a.shutdown().await;
    b.shutdown().await;
    Ok(())
}
