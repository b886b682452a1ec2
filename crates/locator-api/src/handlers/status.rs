//! Node status and peer list.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use locator_services::PeerSummary;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub uuid:            String,
    pub hostname:        String,
    pub locator_port:    u16,
    pub services:        usize,
    /// None when no port range is configured.
    pub ports_available: Option<usize>,
    pub peers:           usize,
    pub live_peers:      usize,
    pub subscribers:     usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let snapshot = state.status.borrow().clone();

    Json(StatusResponse {
        uuid:            state.local.uuid.clone(),
        hostname:        state.local.hostname.clone(),
        locator_port:    state.local.port,
        services:        state.registry.len(),
        ports_available: state.registry.ports_available(),
        peers:           snapshot.peers.len(),
        live_peers:      snapshot.live_peers(),
        subscribers:     snapshot.subscribers,
    })
}

// ── /peers ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerSummary>,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let peers = state.status.borrow().peers.clone();
    Json(PeersResponse { peers })
}
