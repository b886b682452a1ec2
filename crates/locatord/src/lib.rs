//! locatord: per-node service locator.

pub mod actor;
pub mod discovery;
pub mod locator;

mod channel;
mod rpc;

pub use locator::{start, LocatorHandle};
