//! Actor trait for services hosted by the locator.
//!
//! The registry does not know what a service does; it only needs to start it
//! on an endpoint, ask it where it ended up and what it speaks, and stop it.

use locator_core::{Endpoint, MethodTable};

/// A hostable service.
pub trait Actor: Send {
    /// Start serving on `endpoint`. Port 0 means "any free port"; the
    /// actually bound port is reported by `endpoints()` afterwards.
    fn run(&mut self, endpoint: &Endpoint) -> std::io::Result<()>;

    /// Endpoints the actor is bound to. Empty before `run`.
    fn endpoints(&self) -> Vec<Endpoint>;

    /// Method id → method name.
    fn dispatch_map(&self) -> MethodTable;

    /// Dispatch protocol version.
    fn dispatch_version(&self) -> u32;

    /// Stop serving and release the endpoints.
    fn terminate(&mut self);
}
