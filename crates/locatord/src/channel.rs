//! Peer synchronization channel.
//!
//! One task per discovered peer. It dials the peer's locator, asks for its
//! service table once, then forwards every frame the peer pushes to the
//! coordination loop. The task never touches peer state itself; the loop
//! decides what each event means.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};
use tokio::sync::mpsc;
use tokio::time;

use locator_core::frame::{read_frame, write_frame};
use locator_core::{Frame, LocatorError, PeerKey};
use locator_services::Generation;

use crate::locator::{Command, PeerEvent};

pub(crate) async fn peer_channel(
    key: PeerKey,
    generation: Generation,
    connect_timeout: Duration,
    commands: mpsc::UnboundedSender<Command>,
) {
    let report = |event: PeerEvent| {
        commands
            .send(Command::Peer {
                key: key.clone(),
                generation,
                event,
            })
            .is_ok()
    };

    let (stream, remote) = match connect(&key, connect_timeout).await {
        Ok(connected) => connected,
        Err(e) => {
            report(PeerEvent::Failed(e));
            return;
        }
    };

    // The write half stays alive for the life of the task; dropping it
    // would half-close the socket and the peer would hang up.
    let (mut reader, mut writer) = stream.into_split();

    if let Err(e) = write_frame(&mut writer, &Frame::Synchronize).await {
        report(PeerEvent::Failed(e.into()));
        return;
    }

    if !report(PeerEvent::Connected(remote)) {
        return;
    }

    loop {
        let event = match read_frame(&mut reader).await {
            Ok(Some(frame)) => PeerEvent::Frame(frame),
            Ok(None) => PeerEvent::Failed(LocatorError::TransportFailure(
                "connection closed by peer".into(),
            )),
            Err(e) => PeerEvent::Failed(e.into()),
        };

        let done = matches!(event, PeerEvent::Failed(_));
        if !report(event) || done {
            return;
        }
    }
}

/// Resolve the peer's hostname and try each address in order.
async fn connect(key: &PeerKey, timeout: Duration) -> Result<(TcpStream, SocketAddr), LocatorError> {
    let candidates: Vec<SocketAddr> = lookup_host((key.hostname.as_str(), key.port))
        .await
        .map_err(|e| LocatorError::PeerUnreachable(format!("{}: {e}", key.hostname)))?
        .collect();

    for addr in candidates {
        match time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok((stream, addr)),
            Ok(Err(e)) => tracing::debug!(uuid = %key.uuid, %addr, error = %e, "connect failed"),
            Err(_) => tracing::debug!(uuid = %key.uuid, %addr, "connect timed out"),
        }
    }

    Err(LocatorError::PeerUnreachable(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use locator_core::ServiceTable;
    use tokio::net::TcpListener;

    fn next_peer_event(cmd: Command) -> PeerEvent {
        match cmd {
            Command::Peer { event, .. } => event,
            _ => panic!("expected peer event"),
        }
    }

    #[tokio::test]
    async fn sends_synchronize_and_forwards_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let first = read_frame(&mut stream).await.unwrap();
            assert_eq!(first, Some(Frame::Synchronize));
            write_frame(&mut stream, &Frame::Chunk { table: ServiceTable::new() })
                .await
                .unwrap();
            write_frame(&mut stream, &Frame::Choke).await.unwrap();
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let key = PeerKey::new("b", "127.0.0.1", port);
        tokio::spawn(peer_channel(key, 4, Duration::from_secs(1), tx));

        assert!(matches!(next_peer_event(rx.recv().await.unwrap()), PeerEvent::Connected(_)));
        assert!(matches!(
            next_peer_event(rx.recv().await.unwrap()),
            PeerEvent::Frame(Frame::Chunk { .. })
        ));
        assert!(matches!(
            next_peer_event(rx.recv().await.unwrap()),
            PeerEvent::Frame(Frame::Choke)
        ));
        assert!(matches!(next_peer_event(rx.recv().await.unwrap()), PeerEvent::Failed(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn events_carry_generation() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(peer_channel(
            PeerKey::new("b", "127.0.0.1", port),
            9,
            Duration::from_secs(1),
            tx,
        ));

        match rx.recv().await.unwrap() {
            Command::Peer { generation, key, .. } => {
                assert_eq!(generation, 9);
                assert_eq!(key.uuid, "b");
            }
            _ => panic!("expected peer event"),
        }
    }

    #[tokio::test]
    async fn unreachable_peer_reported() {
        // bind then drop to get a port nobody listens on
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(peer_channel(
            PeerKey::new("b", "127.0.0.1", port),
            1,
            Duration::from_millis(500),
            tx,
        ));

        match next_peer_event(rx.recv().await.unwrap()) {
            PeerEvent::Failed(LocatorError::PeerUnreachable(_)) => {}
            other => panic!("expected unreachable, got {other:?}"),
        }
    }
}
