//! HTTP API handlers: read-only views of the locator as JSON.

pub mod services;
pub mod status;

use std::sync::Arc;

use tokio::sync::watch;

use locator_core::PeerKey;
use locator_services::{LocatorSnapshot, Registry};

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<Registry>,
    /// Latest coordination loop snapshot.
    pub status: watch::Receiver<LocatorSnapshot>,
    /// This node as it announces itself.
    pub local: PeerKey,
}
