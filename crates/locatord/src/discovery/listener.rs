//! Announce listener.
//!
//! Joins the multicast group and forwards every valid announcement from
//! another node to the coordination loop. Malformed datagrams are dropped.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use locator_core::config::DiscoveryConfig;
use locator_core::wire::{decode_announce, MAX_ANNOUNCE_LEN};
use locator_core::PeerKey;

use crate::locator::Command;

/// Listen for announcements forever. Returns when the loop is gone.
pub(crate) async fn listener_loop(
    config: DiscoveryConfig,
    local_uuid: String,
    commands: mpsc::UnboundedSender<Command>,
) -> Result<()> {
    let group: Ipv4Addr = config
        .group
        .parse()
        .with_context(|| format!("invalid multicast group '{}'", config.group))?;

    let socket = make_listener_socket(group, config.announce_port)
        .context("failed to create multicast listener socket")?;
    let socket = UdpSocket::from_std(socket).context("failed to convert to tokio UdpSocket")?;

    // one spare byte so oversized datagrams fail length validation
    let mut buf = vec![0u8; MAX_ANNOUNCE_LEN + 1];

    tracing::info!(group = %group, port = config.announce_port, "listening for announces");

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "recv_from failed");
                continue;
            }
        };

        let Some(key) = accept_announce(&buf[..len], from, &local_uuid) else {
            continue;
        };

        if commands.send(Command::Announced(key)).is_err() {
            return Ok(());
        }
    }
}

/// Decode one datagram. Malformed datagrams and our own announcements
/// yield `None`.
fn accept_announce(data: &[u8], from: SocketAddr, local_uuid: &str) -> Option<PeerKey> {
    let key = match decode_announce(data) {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!(%from, error = %e, "dropped malformed announce");
            return None;
        }
    };

    if key.uuid == local_uuid {
        tracing::trace!("ignoring own announcement");
        return None;
    }

    tracing::trace!(%from, peer = %key, "announce received");
    Some(key)
}

/// UDP socket bound to the announce port and joined to `group`.
fn make_listener_socket(group: Ipv4Addr, port: u16) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&bind_addr.into()).context("bind()")?;

    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .context("IP_ADD_MEMBERSHIP")?;

    Ok(socket.into())
}
