//! Node status and peer list.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct StatusResponse {
    uuid: String,
    hostname: String,
    locator_port: u16,
    services: usize,
    ports_available: Option<usize>,
    peers: usize,
    live_peers: usize,
    subscribers: usize,
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    uuid: String,
    hostname: String,
    port: u16,
    phase: String,
    remote: Option<String>,
    tracked_secs: u64,
    expires_in_ms: u64,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Locator Status");
    println!("═══════════════════════════════════════");
    println!("  Node            : {}", resp.uuid);
    println!("  Endpoint        : {}:{}", resp.hostname, resp.locator_port);
    println!("  Local services  : {}", resp.services);
    match resp.ports_available {
        Some(n) => println!("  Ports available : {}", n),
        None => println!("  Ports available : any (no range configured)"),
    }
    println!("  Peers           : {} ({} live)", resp.peers, resp.live_peers);
    println!("  Subscribers     : {}", resp.subscribers);

    Ok(())
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers tracked.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        println!("  ┌─ {}", p.uuid);
        println!("  │  endpoint : {}:{}", p.hostname, p.port);
        println!("  │  remote   : {}", p.remote.as_deref().unwrap_or("-"));
        println!("  │  phase    : {}", p.phase);
        println!("  │  tracked  : {}s", p.tracked_secs);
        println!("  └─ expires  : {}ms", p.expires_in_ms);
    }

    Ok(())
}
