//! Pool of ports reserved for attached services.

use std::collections::BTreeSet;

use locator_core::config::PortRange;
use locator_core::LocatorError;

/// Free ports from a fixed `[min, max)` range.
///
/// The lowest free port is always handed out first. A port is either in the
/// pool or bound to an attached service, never both.
#[derive(Debug, Clone)]
pub struct PortPool {
    range: PortRange,
    free: BTreeSet<u16>,
}

impl PortPool {
    pub fn new(range: PortRange) -> Self {
        Self {
            range,
            free: (range.min..range.max).collect(),
        }
    }

    /// Remove and return the lowest free port.
    pub fn take(&mut self) -> Result<u16, LocatorError> {
        self.free.pop_first().ok_or(LocatorError::PortsExhausted)
    }

    /// Return a port to the pool.
    ///
    /// Ports outside the configured range or already free are refused and
    /// `false` is returned; the pool is left untouched.
    pub fn give(&mut self, port: u16) -> bool {
        if !(self.range.min..self.range.max).contains(&port) {
            tracing::warn!(port, "refusing to pool a port outside the configured range");
            return false;
        }
        if !self.free.insert(port) {
            tracing::warn!(port, "port returned twice, ignoring");
            return false;
        }
        true
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.free.contains(&port)
    }

    pub fn range(&self) -> PortRange {
        self.range
    }
}
