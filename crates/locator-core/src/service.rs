//! Service table types: what a node publishes about the services it hosts,
//! and how a remote node is identified.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Method id → method name, as reported by a service's dispatch table.
pub type MethodTable = BTreeMap<u32, String>;

/// Service name → service info. This is the full table exchanged by
/// `synchronize` and returned by `dump()`.
pub type ServiceTable = BTreeMap<String, ServiceInfo>;

/// A reachable `(hostname, port)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Everything a client needs to talk to a service: where it lives, which
/// dispatch protocol version it speaks, and its method table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub endpoint: Endpoint,
    pub version: u32,
    pub methods: MethodTable,
}

/// Identity of a remote node, taken verbatim from its announcement.
///
/// Used as the key for all per-peer state. Two announcements with the same
/// uuid but a different hostname or port are different peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerKey {
    pub uuid: String,
    pub hostname: String,
    pub port: u16,
}

impl PeerKey {
    pub fn new(uuid: impl Into<String>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            uuid: uuid.into(),
            hostname: hostname.into(),
            port,
        }
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.uuid, self.hostname, self.port)
    }
}
