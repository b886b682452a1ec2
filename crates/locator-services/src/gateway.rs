//! Gateway: the cross-node table store.
//!
//! The locator hands the gateway every table a peer pushes and tells it when
//! a peer is gone. Resolution of services the local node does not host goes
//! through here.

use dashmap::DashMap;
use rand::seq::SliceRandom;

use locator_core::{ServiceInfo, ServiceTable};

pub trait Gateway: Send + Sync {
    /// Absorb the full table of node `uuid`, replacing what was known before.
    fn consume(&self, uuid: &str, table: ServiceTable);

    /// Drop all knowledge of node `uuid`. Unknown nodes are ignored.
    fn prune(&self, uuid: &str);

    /// Find a remote provider of `name`.
    fn resolve(&self, name: &str) -> Option<ServiceInfo>;
}

/// In-memory gateway that picks a random provider when several nodes host
/// the same service.
#[derive(Default)]
pub struct AdhocGateway {
    // uuid -> that node's last pushed table
    remotes: DashMap<String, ServiceTable>,
}

impl AdhocGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes with a known table.
    pub fn nodes(&self) -> usize {
        self.remotes.len()
    }
}

impl Gateway for AdhocGateway {
    fn consume(&self, uuid: &str, table: ServiceTable) {
        tracing::debug!(uuid, services = table.len(), "consumed remote service table");
        self.remotes.insert(uuid.to_string(), table);
    }

    fn prune(&self, uuid: &str) {
        if let Some((_, table)) = self.remotes.remove(uuid) {
            tracing::debug!(uuid, services = table.len(), "pruned remote node");
        }
    }

    fn resolve(&self, name: &str) -> Option<ServiceInfo> {
        let candidates: Vec<ServiceInfo> = self
            .remotes
            .iter()
            .filter_map(|entry| entry.value().get(name).cloned())
            .collect();

        let chosen = candidates.choose(&mut rand::thread_rng()).cloned();
        if chosen.is_some() {
            tracing::debug!(
                service = name,
                providers = candidates.len(),
                "providing service using remote node"
            );
        }
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locator_core::{Endpoint, MethodTable};

    fn table(host: &str, names: &[&str]) -> ServiceTable {
        names
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    ServiceInfo {
                        endpoint: Endpoint::new(host, 10100),
                        version: 1,
                        methods: MethodTable::new(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn resolves_consumed_services() {
        let gw = AdhocGateway::new();
        gw.consume("a", table("node-a", &["storage"]));
        let info = gw.resolve("storage").unwrap();
        assert_eq!(info.endpoint.host, "node-a");
        assert!(gw.resolve("missing").is_none());
    }

    #[test]
    fn consume_replaces_previous_table() {
        let gw = AdhocGateway::new();
        gw.consume("a", table("node-a", &["storage", "queue"]));
        gw.consume("a", table("node-a", &["queue"]));
        assert!(gw.resolve("storage").is_none());
        assert!(gw.resolve("queue").is_some());
    }

    #[test]
    fn prune_forgets_node() {
        let gw = AdhocGateway::new();
        gw.consume("a", table("node-a", &["storage"]));
        gw.consume("b", table("node-b", &["storage"]));
        gw.prune("a");
        assert_eq!(gw.nodes(), 1);
        assert_eq!(gw.resolve("storage").unwrap().endpoint.host, "node-b");

        gw.prune("a");
        gw.prune("b");
        assert!(gw.resolve("storage").is_none());
    }

    #[test]
    fn picks_among_all_providers() {
        let gw = AdhocGateway::new();
        gw.consume("a", table("node-a", &["storage"]));
        gw.consume("b", table("node-b", &["storage"]));
        for _ in 0..16 {
            let host = gw.resolve("storage").unwrap().endpoint.host;
            assert!(host == "node-a" || host == "node-b");
        }
    }
}
