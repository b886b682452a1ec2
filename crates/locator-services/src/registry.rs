//! Service registry: the local node's authoritative table of services.
//!
//! attach/detach may be called from any thread. All state sits behind one
//! mutex; change notifications are queued to the event loop while that lock
//! is held, so the loop observes them in mutation order.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use locator_core::config::PortRange;
use locator_core::{Endpoint, LocatorError, ServiceInfo, ServiceTable};

use crate::actor::Actor;
use crate::gateway::Gateway;
use crate::port_pool::PortPool;

/// Posted to the event loop after every successful attach or detach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    Attached(String),
    Detached(String),
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Hostname published in service endpoints.
    pub hostname: String,
    /// Address actors bind to.
    pub bind_address: String,
    pub ports: Option<PortRange>,
}

struct Inner {
    services: BTreeMap<String, Box<dyn Actor>>,
    ports: Option<PortPool>,
}

pub struct Registry {
    hostname: String,
    bind_address: String,
    inner: Mutex<Inner>,
    gateway: Option<Arc<dyn Gateway>>,
    changes: mpsc::UnboundedSender<RegistryChange>,
}

impl Registry {
    /// Create a registry and the receiving end of its change notifications.
    pub fn new(
        config: RegistryConfig,
        gateway: Option<Arc<dyn Gateway>>,
    ) -> (Self, mpsc::UnboundedReceiver<RegistryChange>) {
        let (changes, rx) = mpsc::unbounded_channel();

        if let Some(range) = config.ports {
            tracing::info!(
                available = range.max - range.min,
                min = range.min,
                max = range.max,
                "locator ports available"
            );
        }

        let registry = Self {
            hostname: config.hostname,
            bind_address: config.bind_address,
            inner: Mutex::new(Inner {
                services: BTreeMap::new(),
                ports: config.ports.map(PortPool::new),
            }),
            gateway,
            changes,
        };
        (registry, rx)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start `actor` and publish it under `name`. Returns the endpoint peers
    /// will see.
    pub fn attach(&self, name: &str, mut actor: Box<dyn Actor>) -> Result<Endpoint, LocatorError> {
        let mut inner = self.lock();

        if inner.services.contains_key(name) {
            return Err(LocatorError::DuplicateService(name.to_string()));
        }

        let port = match inner.ports.as_mut() {
            Some(pool) => pool.take()?,
            None => 0,
        };

        // A port that fails to bind stays out of the pool: something else
        // probably holds it.
        actor
            .run(&Endpoint::new(self.bind_address.clone(), port))
            .map_err(|source| LocatorError::StartFailed {
                name: name.to_string(),
                source,
            })?;

        let endpoint = Endpoint::new(self.hostname.clone(), bound_port(actor.as_ref()));
        tracing::info!(service = name, port = endpoint.port, "service published");

        inner.services.insert(name.to_string(), actor);
        self.notify(RegistryChange::Attached(name.to_string()));

        Ok(endpoint)
    }

    /// Stop the service published under `name` and hand it back.
    pub fn detach(&self, name: &str) -> Result<Box<dyn Actor>, LocatorError> {
        let mut inner = self.lock();

        let mut actor = inner
            .services
            .remove(name)
            .ok_or_else(|| LocatorError::UnknownService(name.to_string()))?;

        let port = bound_port(actor.as_ref());
        actor.terminate();

        if let Some(pool) = inner.ports.as_mut() {
            pool.give(port);
        }

        tracing::info!(service = name, port, "service withdrawn");
        self.notify(RegistryChange::Detached(name.to_string()));

        Ok(actor)
    }

    /// Look `name` up locally, then through the gateway.
    pub fn resolve(&self, name: &str) -> Result<ServiceInfo, LocatorError> {
        {
            let inner = self.lock();
            if let Some(actor) = inner.services.get(name) {
                tracing::debug!(service = name, "providing service using local node");
                return Ok(self.query(actor.as_ref()));
            }
        }

        self.gateway
            .as_ref()
            .and_then(|gateway| gateway.resolve(name))
            .ok_or_else(|| LocatorError::ServiceUnavailable(name.to_string()))
    }

    /// Snapshot of every local service.
    pub fn dump(&self) -> ServiceTable {
        let inner = self.lock();
        inner
            .services
            .iter()
            .map(|(name, actor)| (name.clone(), self.query(actor.as_ref())))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().services.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free ports left, or `None` when no range is configured.
    pub fn ports_available(&self) -> Option<usize> {
        self.lock().ports.as_ref().map(PortPool::available)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    fn query(&self, actor: &dyn Actor) -> ServiceInfo {
        ServiceInfo {
            endpoint: Endpoint::new(self.hostname.clone(), bound_port(actor)),
            version: actor.dispatch_version(),
            methods: actor.dispatch_map(),
        }
    }

    fn notify(&self, change: RegistryChange) {
        if self.changes.send(change).is_err() {
            tracing::trace!("registry change dropped, event loop is gone");
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.services.is_empty() {
            return;
        }

        tracing::warn!(count = inner.services.len(), "disposing of orphan services");
        for (_, actor) in inner.services.iter_mut() {
            actor.terminate();
        }
        inner.services.clear();
    }
}

fn bound_port(actor: &dyn Actor) -> u16 {
    actor.endpoints().first().map(|e| e.port).unwrap_or(0)
}
