//! Multicast peer discovery.
//!
//! `broadcast` announces this node's locator endpoint to the group on a fixed
//! interval; `listener` receives everyone else's announcements and hands the
//! decoded keys to the coordination loop.

pub mod broadcast;
pub mod listener;
