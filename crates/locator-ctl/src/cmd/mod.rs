//! CLI command modules.

pub mod http;
pub mod services;
pub mod status;
