//! Announce broadcast.
//!
//! Sends this node's announce datagram to the multicast group every
//! `announce_interval`, starting immediately.

use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time;

use locator_core::config::DiscoveryConfig;
use locator_core::wire::encode_announce;
use locator_core::PeerKey;

/// Announce `key` forever. Cancel by aborting the task.
pub async fn announce_loop(key: PeerKey, config: DiscoveryConfig) -> Result<()> {
    let payload = encode_announce(&key).context("failed to encode announcement")?;

    let group: Ipv4Addr = config
        .group
        .parse()
        .with_context(|| format!("invalid multicast group '{}'", config.group))?;
    let dest = SocketAddrV4::new(group, config.announce_port);

    let socket = make_multicast_socket(config.multicast_ttl)
        .context("failed to create multicast announce socket")?;
    let socket = UdpSocket::from_std(socket.into())
        .context("failed to convert to tokio UdpSocket")?;

    let mut interval = time::interval(config.announce_interval());

    tracing::info!(
        group = %dest,
        uuid = %key.uuid,
        port = key.port,
        interval_ms = config.announce_interval_ms,
        "announcing on multicast group"
    );

    loop {
        interval.tick().await;

        match socket.send_to(&payload, dest).await {
            Ok(n) => tracing::trace!(bytes = n, "announce sent"),
            Err(e) => tracing::warn!(error = %e, "unable to announce the node"),
        }
    }
}

/// UDP socket for sending IPv4 multicast. Loopback is disabled so a node
/// does not hear its own announcements.
fn make_multicast_socket(ttl: u32) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    socket.set_multicast_ttl_v4(ttl).context("IP_MULTICAST_TTL")?;
    socket.set_multicast_loop_v4(false).context("IP_MULTICAST_LOOP")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket.bind(&bind_addr.into()).context("bind()")?;

    Ok(socket)
}
