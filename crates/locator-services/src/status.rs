//! Status snapshot types shared by the daemon and the diagnostics API.

use serde::Serialize;

use crate::peer::PeerPhase;

#[derive(Debug, Clone, Serialize)]
pub struct PeerSummary {
    pub uuid:          String,
    pub hostname:      String,
    pub port:          u16,
    pub phase:         PeerPhase,
    pub remote:        Option<String>,
    pub tracked_secs:  u64,
    pub expires_in_ms: u64,
}

/// Point-in-time view of the coordination loop, republished after every
/// loop iteration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocatorSnapshot {
    pub peers:       Vec<PeerSummary>,
    pub subscribers: usize,
}

impl LocatorSnapshot {
    pub fn live_peers(&self) -> usize {
        self.peers.iter().filter(|p| p.phase == PeerPhase::Live).count()
    }
}
