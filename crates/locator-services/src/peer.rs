//! Peer table: per-peer channel state and the heartbeat state machine.
//!
//! ```text
//! Connecting → Synchronizing → Live ─┬→ Stale  (deadline passed)
//!      │             │                └→ Failed (choke, error, transport)
//!      └─────────────┴──────────────────→ Failed
//! ```
//!
//! Eviction tells the gateway to prune the node first and only then queues
//! the entry for removal. Entries are erased in `flush_removals`, which the
//! event loop calls once per iteration and never from inside a handler.
//! Every event carries the generation of the PeerState it was issued for, so
//! late events from a previous connection to the same key are ignored.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::Instant;

use locator_core::{Frame, LocatorError, PeerKey};

use crate::gateway::Gateway;
use crate::status::PeerSummary;

pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerPhase {
    Connecting,
    Synchronizing,
    Live,
    Stale,
    Failed,
}

impl PeerPhase {
    /// Still tracked, not yet evicted.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PeerPhase::Connecting | PeerPhase::Synchronizing | PeerPhase::Live
        )
    }
}

/// What `observe` did with an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// Unseen key. The caller must dial the peer under this generation.
    New(Generation),
    /// Known key, heartbeat deadline pushed back.
    Refreshed,
    /// Key is evicted and waiting to be erased. The next announcement after
    /// the flush starts over.
    Evicting,
}

struct PeerState {
    generation: Generation,
    phase: PeerPhase,
    deadline: Instant,
    discovered_at: Instant,
    remote: Option<SocketAddr>,
    connection: Option<AbortHandle>,
}

impl Drop for PeerState {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
    }
}

pub struct PeerTable {
    peers: HashMap<PeerKey, PeerState>,
    pending_removal: Vec<(PeerKey, Generation)>,
    gateway: Arc<dyn Gateway>,
    timeout: Duration,
    next_generation: Generation,
}

impl PeerTable {
    pub fn new(gateway: Arc<dyn Gateway>, timeout: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            pending_removal: Vec::new(),
            gateway,
            timeout,
            next_generation: 1,
        }
    }

    /// Handle an announcement for `key`.
    pub fn observe(&mut self, key: &PeerKey, now: Instant) -> Observed {
        if let Some(state) = self.peers.get_mut(key) {
            if !state.phase.is_active() {
                return Observed::Evicting;
            }
            tracing::trace!(uuid = %key.uuid, "resetting the heartbeat timeout");
            state.deadline = now + self.timeout;
            return Observed::Refreshed;
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        tracing::info!(uuid = %key.uuid, hostname = %key.hostname, port = key.port, "discovered node");

        self.peers.insert(
            key.clone(),
            PeerState {
                generation,
                phase: PeerPhase::Connecting,
                deadline: now + self.timeout,
                discovered_at: now,
                remote: None,
                connection: None,
            },
        );
        Observed::New(generation)
    }

    /// Hand the peer's channel task to its state so removal can stop it.
    /// If the state is already gone the task is stopped right away.
    pub fn bind_connection(&mut self, key: &PeerKey, generation: Generation, task: AbortHandle) {
        match self.active_mut(key, generation) {
            Some(state) => state.connection = Some(task),
            None => task.abort(),
        }
    }

    /// The channel is up and the synchronize request has been sent.
    pub fn connected(
        &mut self,
        key: &PeerKey,
        generation: Generation,
        remote: SocketAddr,
        now: Instant,
    ) -> bool {
        let timeout = self.timeout;
        let Some(state) = self.active_mut(key, generation) else {
            return false;
        };
        if state.phase == PeerPhase::Connecting {
            state.phase = PeerPhase::Synchronizing;
        }
        state.remote = Some(remote);
        state.deadline = now + timeout;
        tracing::debug!(uuid = %key.uuid, %remote, "synchronization channel established");
        true
    }

    /// Inbound message from the peer's channel.
    pub fn message(&mut self, key: &PeerKey, generation: Generation, frame: Frame, now: Instant) {
        let timeout = self.timeout;
        let Some(state) = self.active_mut(key, generation) else {
            tracing::trace!(uuid = %key.uuid, kind = frame.kind(), "message for evicted node ignored");
            return;
        };

        state.deadline = now + timeout;

        match frame {
            Frame::Chunk { table } => {
                if state.phase != PeerPhase::Live {
                    tracing::info!(uuid = %key.uuid, services = table.len(), "node synchronized");
                }
                state.phase = PeerPhase::Live;
                self.gateway.consume(&key.uuid, table);
            }
            Frame::Choke | Frame::Error { .. } => {
                tracing::info!(uuid = %key.uuid, "node has been shut down");
                self.evict(key, generation, PeerPhase::Failed);
            }
            other => {
                tracing::warn!(
                    uuid = %key.uuid,
                    kind = other.kind(),
                    "dropped unknown synchronization message"
                );
            }
        }
    }

    /// The peer's channel failed: unreachable, decode error or broken
    /// transport.
    pub fn failed(&mut self, key: &PeerKey, generation: Generation, error: &LocatorError) {
        if self.active_mut(key, generation).is_none() {
            return;
        }
        match error {
            LocatorError::PeerUnreachable(_) => {
                tracing::error!(uuid = %key.uuid, hostname = %key.hostname, error = %error, "unable to connect to node")
            }
            _ => {
                tracing::warn!(uuid = %key.uuid, error = %error, "node has unexpectedly disconnected")
            }
        }
        self.evict(key, generation, PeerPhase::Failed);
    }

    /// Evict every peer whose heartbeat deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<(PeerKey, Generation)> = self
            .peers
            .iter()
            .filter(|(_, s)| s.phase.is_active() && s.deadline <= now)
            .map(|(k, s)| (k.clone(), s.generation))
            .collect();

        for (key, generation) in &expired {
            tracing::warn!(uuid = %key.uuid, "node has timed out");
            self.evict(key, *generation, PeerPhase::Stale);
        }
        expired.len()
    }

    /// Earliest heartbeat deadline among active peers.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.peers
            .values()
            .filter(|s| s.phase.is_active())
            .map(|s| s.deadline)
            .min()
    }

    /// Erase evicted peers. Dropping a state stops its channel task.
    pub fn flush_removals(&mut self) -> usize {
        let mut removed = 0;
        for (key, generation) in std::mem::take(&mut self.pending_removal) {
            let matches = self
                .peers
                .get(&key)
                .is_some_and(|s| s.generation == generation && !s.phase.is_active());
            if matches {
                self.peers.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    /// Prune and drop every peer. Used at teardown.
    pub fn clear(&mut self) {
        for (key, state) in self.peers.drain() {
            if state.phase.is_active() {
                self.gateway.prune(&key.uuid);
            }
        }
        self.pending_removal.clear();
    }

    pub fn phase(&self, key: &PeerKey) -> Option<PeerPhase> {
        self.peers.get(key).map(|s| s.phase)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn snapshot(&self, now: Instant) -> Vec<PeerSummary> {
        let mut peers: Vec<PeerSummary> = self
            .peers
            .iter()
            .map(|(key, s)| PeerSummary {
                uuid: key.uuid.clone(),
                hostname: key.hostname.clone(),
                port: key.port,
                phase: s.phase,
                remote: s.remote.map(|r| r.to_string()),
                tracked_secs: now.saturating_duration_since(s.discovered_at).as_secs(),
                expires_in_ms: s.deadline.saturating_duration_since(now).as_millis() as u64,
            })
            .collect();
        peers.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        peers
    }

    fn active_mut(&mut self, key: &PeerKey, generation: Generation) -> Option<&mut PeerState> {
        self.peers
            .get_mut(key)
            .filter(|s| s.generation == generation && s.phase.is_active())
    }

    /// Prune, then queue for erase. No-op for an already evicted state.
    fn evict(&mut self, key: &PeerKey, generation: Generation, phase: PeerPhase) {
        let Some(state) = self.active_mut(key, generation) else {
            return;
        };
        state.phase = phase;
        self.gateway.prune(&key.uuid);
        self.pending_removal.push((key.clone(), generation));
    }
}
