//! Announce datagram wire format.
//!
//! Every node multicasts one of these per announce interval. The datagram is
//! a fixed 10-byte header followed by the uuid and hostname bytes:
//!
//! ```text
//! | magic "LCTR" | version | uuid_len | hostname_len | flags | port (BE) | uuid | hostname |
//! ```
//!
//! The header is `#[repr(C, packed)]` and uses zerocopy derives, so there is
//! no unsafe code here.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::service::PeerKey;

// ── Header ───────────────────────────────────────────────────────────────────

/// Fixed prefix of an announce datagram.
///
/// Wire size: 10 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct AnnounceHeader {
    /// Always `ANNOUNCE_MAGIC`. Datagrams from other software on the same
    /// group are rejected on this field.
    pub magic: [u8; 4],

    /// Announce format version. Currently 0x01.
    pub version: u8,

    /// Length of the uuid string that follows the header.
    pub uuid_len: u8,

    /// Length of the hostname string that follows the uuid.
    pub hostname_len: u8,

    /// Reserved, must be zero.
    pub flags: u8,

    /// Locator RPC port of the announcing node, big-endian.
    pub port: [u8; 2],
}

assert_eq_size!(AnnounceHeader, [u8; 10]);

pub const ANNOUNCE_MAGIC: [u8; 4] = *b"LCTR";

/// Current announce format version.
pub const ANNOUNCE_VERSION: u8 = 0x01;

pub const ANNOUNCE_HEADER_LEN: usize = std::mem::size_of::<AnnounceHeader>();

/// Largest datagram the listener needs to accept.
pub const MAX_ANNOUNCE_LEN: usize = ANNOUNCE_HEADER_LEN + 2 * u8::MAX as usize;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default IPv4 multicast group for announcements.
pub const DEFAULT_MULTICAST_GROUP: &str = "239.255.10.54";

/// Default UDP port announcements are sent to.
pub const DEFAULT_ANNOUNCE_PORT: u16 = 10054;

/// Default locator RPC port.
pub const DEFAULT_LOCATOR_PORT: u16 = 10053;

/// Default announce interval in milliseconds.
pub const ANNOUNCE_INTERVAL_MS: u64 = 5_000;

/// Default heartbeat timeout in milliseconds.
/// Peers silent for this long are evicted.
pub const HEARTBEAT_TIMEOUT_MS: u64 = 60_000;

// ── Encode / decode ──────────────────────────────────────────────────────────

/// Serialize a node identity into an announce datagram.
pub fn encode_announce(key: &PeerKey) -> Result<Vec<u8>, WireError> {
    let uuid_len = u8::try_from(key.uuid.len()).map_err(|_| WireError::FieldTooLong("uuid"))?;
    let hostname_len =
        u8::try_from(key.hostname.len()).map_err(|_| WireError::FieldTooLong("hostname"))?;

    let header = AnnounceHeader {
        magic: ANNOUNCE_MAGIC,
        version: ANNOUNCE_VERSION,
        uuid_len,
        hostname_len,
        flags: 0,
        port: key.port.to_be_bytes(),
    };

    let mut out = Vec::with_capacity(ANNOUNCE_HEADER_LEN + key.uuid.len() + key.hostname.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(key.uuid.as_bytes());
    out.extend_from_slice(key.hostname.as_bytes());
    Ok(out)
}

/// Parse an announce datagram into the sender's identity.
pub fn decode_announce(data: &[u8]) -> Result<PeerKey, WireError> {
    let header = AnnounceHeader::read_from_prefix(data).ok_or(WireError::Truncated(data.len()))?;

    if header.magic != ANNOUNCE_MAGIC {
        return Err(WireError::BadMagic);
    }
    if header.version != ANNOUNCE_VERSION {
        return Err(WireError::UnknownVersion(header.version));
    }
    if header.flags != 0 {
        return Err(WireError::ReservedFlagsSet(header.flags));
    }

    let uuid_len = header.uuid_len as usize;
    let hostname_len = header.hostname_len as usize;
    let body = &data[ANNOUNCE_HEADER_LEN..];
    if body.len() != uuid_len + hostname_len {
        return Err(WireError::LengthMismatch {
            expected: uuid_len + hostname_len,
            actual: body.len(),
        });
    }
    if uuid_len == 0 {
        return Err(WireError::EmptyField("uuid"));
    }
    if hostname_len == 0 {
        return Err(WireError::EmptyField("hostname"));
    }

    let uuid = std::str::from_utf8(&body[..uuid_len]).map_err(|_| WireError::InvalidUtf8("uuid"))?;
    let hostname =
        std::str::from_utf8(&body[uuid_len..]).map_err(|_| WireError::InvalidUtf8("hostname"))?;

    Ok(PeerKey::new(uuid, hostname, u16::from_be_bytes(header.port)))
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting an announce datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("datagram of {0} bytes is shorter than the announce header")]
    Truncated(usize),

    #[error("bad announce magic")]
    BadMagic,

    #[error("unknown announce version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("reserved flags are non-zero: 0x{0:02x}")]
    ReservedFlagsSet(u8),

    #[error("announce body is {actual} bytes, header declares {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("{0} field is empty")]
    EmptyField(&'static str),

    #[error("{0} field is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("{0} field exceeds 255 bytes")]
    FieldTooLong(&'static str),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
