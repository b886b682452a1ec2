//! locator-core: shared types, wire formats, errors and configuration.
//! All other locator crates depend on this one.

pub mod config;
pub mod error;
pub mod frame;
pub mod service;
pub mod wire;

pub use error::{ErrorCode, LocatorError};
pub use frame::Frame;
pub use service::{Endpoint, MethodTable, PeerKey, ServiceInfo, ServiceTable};
