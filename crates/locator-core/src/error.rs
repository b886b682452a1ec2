//! Locator error taxonomy.
//!
//! Registry failures are returned synchronously to the caller. Protocol
//! failures (decode, unreachable peers, broken channels) never reach RPC
//! callers; they are logged and drive peer eviction.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    #[error("service '{0}' is already attached")]
    DuplicateService(String),

    #[error("service '{0}' is not attached")]
    UnknownService(String),

    #[error("no ports left for allocation")]
    PortsExhausted,

    #[error("the specified service '{0}' is not available")]
    ServiceUnavailable(String),

    #[error("unable to connect to node '{0}'")]
    PeerUnreachable(String),

    #[error("unable to decode payload: {0}")]
    Decode(String),

    #[error("peer transport failed: {0}")]
    TransportFailure(String),

    #[error("service '{name}' failed to start: {source}")]
    StartFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl LocatorError {
    /// Wire-level code for this error, carried in `error` frames.
    pub fn code(&self) -> ErrorCode {
        match self {
            LocatorError::DuplicateService(_) => ErrorCode::DuplicateService,
            LocatorError::UnknownService(_) => ErrorCode::UnknownService,
            LocatorError::PortsExhausted => ErrorCode::PortsExhausted,
            LocatorError::ServiceUnavailable(_) => ErrorCode::ServiceUnavailable,
            LocatorError::PeerUnreachable(_) => ErrorCode::PeerUnreachable,
            LocatorError::Decode(_) => ErrorCode::Decode,
            LocatorError::TransportFailure(_) => ErrorCode::TransportFailure,
            LocatorError::StartFailed { .. } => ErrorCode::StartFailed,
        }
    }
}

/// Serializable error code for `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DuplicateService,
    UnknownService,
    PortsExhausted,
    ServiceUnavailable,
    PeerUnreachable,
    Decode,
    TransportFailure,
    StartFailed,
    UnknownMethod,
}

pub type Result<T, E = LocatorError> = std::result::Result<T, E>;
