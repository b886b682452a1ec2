//! Synchronize publisher: pushes the local service table to subscribed
//! upstreams.
//!
//! The publisher never owns a connection. Each subscriber is a weak handle
//! to the frame queue of an RPC connection's writer; when the connection
//! goes away the handle stops upgrading and the subscriber is dropped on the
//! next push.

use std::sync::Arc;

use tokio::sync::mpsc;

use locator_core::{Frame, LocatorError, ServiceInfo};

use crate::registry::Registry;

/// Identifies one RPC connection.
pub type SubscriberId = u64;

/// Non-owning handle to an upstream's outbound frame queue.
#[derive(Debug, Clone)]
pub struct Upstream {
    id: SubscriberId,
    tx: mpsc::WeakUnboundedSender<Frame>,
}

impl Upstream {
    pub fn new(id: SubscriberId, tx: &mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            id,
            tx: tx.downgrade(),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Returns false once the connection behind this handle is gone.
    fn send(&self, frame: Frame) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }
}

pub struct SynchronizePublisher {
    registry: Arc<Registry>,
    subscribers: Vec<Upstream>,
}

impl SynchronizePublisher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            subscribers: Vec::new(),
        }
    }

    /// One-shot lookup. No subscription is created.
    pub fn resolve(&self, name: &str) -> Result<ServiceInfo, LocatorError> {
        self.registry.resolve(name)
    }

    /// Send the current table to `upstream` and keep it for future pushes.
    /// A second subscription from the same connection only re-sends the dump.
    pub fn subscribe(&mut self, upstream: Upstream) {
        let frame = Frame::Chunk {
            table: self.registry.dump(),
        };

        if !upstream.send(frame) {
            tracing::debug!(subscriber = upstream.id(), "subscriber gone before first dump");
            return;
        }

        if self.subscribers.iter().all(|s| s.id() != upstream.id()) {
            tracing::debug!(subscriber = upstream.id(), "synchronize subscriber added");
            self.subscribers.push(upstream);
        }
    }

    /// Push the table as it is right now to every subscriber. Returns the
    /// number of subscribers that received it.
    pub fn update(&mut self) -> usize {
        let table = self.registry.dump();
        let before = self.subscribers.len();

        self.subscribers.retain(|upstream| {
            upstream.send(Frame::Chunk {
                table: table.clone(),
            })
        });

        let pruned = before - self.subscribers.len();
        if pruned > 0 {
            tracing::debug!(pruned, "dropped disconnected synchronize subscribers");
        }
        tracing::debug!(
            subscribers = self.subscribers.len(),
            services = table.len(),
            "service table pushed"
        );
        self.subscribers.len()
    }

    /// Tell every subscriber the channel is closing and forget them all.
    pub fn shutdown(&mut self) {
        for upstream in self.subscribers.drain(..) {
            upstream.send(Frame::Choke);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
