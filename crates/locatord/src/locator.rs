//! Coordination loop.
//!
//! A single task owns the peer table and the synchronize publisher. Every
//! other task (announcer, listener, RPC connections, peer channels) talks to
//! it through one unbounded command queue; the registry reports mutations on
//! its own queue. Each loop iteration handles one event, erases peers that
//! were evicted during it, and republishes the status snapshot.

use std::future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use locator_core::config::LocatorConfig;
use locator_core::{Frame, LocatorError, PeerKey, ServiceInfo};
use locator_services::{
    Gateway, Generation, LocatorSnapshot, Observed, PeerTable, Registry, RegistryChange,
    RegistryConfig, SynchronizePublisher, Upstream,
};

use crate::discovery::{broadcast, listener};
use crate::{channel, rpc};

/// Events delivered to the coordination loop.
pub(crate) enum Command {
    /// A peer announced itself.
    Announced(PeerKey),
    /// Something happened on a peer's synchronization channel.
    Peer {
        key: PeerKey,
        generation: Generation,
        event: PeerEvent,
    },
    /// An RPC connection asked for the service table.
    Subscribe(Upstream),
    /// An RPC connection asked for one service.
    Resolve {
        name: String,
        reply: oneshot::Sender<Result<ServiceInfo, LocatorError>>,
    },
}

#[derive(Debug)]
pub(crate) enum PeerEvent {
    Connected(SocketAddr),
    Frame(Frame),
    Failed(LocatorError),
}

/// Handle to a running locator.
pub struct LocatorHandle {
    registry: Arc<Registry>,
    local: PeerKey,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<LocatorSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LocatorHandle {
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// This node's identity as it is announced.
    pub fn local_key(&self) -> &PeerKey {
        &self.local
    }

    /// Port the RPC server actually bound.
    pub fn locator_port(&self) -> u16 {
        self.local.port
    }

    /// Feed an announcement received out of band, as if the listener had
    /// heard it.
    pub fn observe(&self, key: PeerKey) {
        if self.commands.send(Command::Announced(key)).is_err() {
            tracing::debug!("announcement dropped, locator is stopped");
        }
    }

    pub fn snapshot(&self) -> LocatorSnapshot {
        self.status.borrow().clone()
    }

    /// Receiver for status updates, one per loop iteration.
    pub fn status(&self) -> watch::Receiver<LocatorSnapshot> {
        self.status.clone()
    }

    /// Stop the loop and wait for teardown to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "locator task failed");
            }
        }
    }
}

/// Bind the RPC server, start discovery and spawn the coordination loop.
///
/// Peers are only tracked when a gateway is given; without one the node
/// still announces itself and serves its own table.
pub async fn start(config: &LocatorConfig, gateway: Option<Arc<dyn Gateway>>) -> Result<LocatorHandle> {
    let network = &config.network;

    let (registry, changes) = Registry::new(
        RegistryConfig {
            hostname: network.hostname.clone(),
            bind_address: network.endpoint.clone(),
            ports: network.ports,
        },
        gateway.clone(),
    );
    let registry = Arc::new(registry);

    let rpc_listener = TcpListener::bind((network.endpoint.as_str(), network.locator_port))
        .await
        .with_context(|| format!("failed to bind locator port {}:{}", network.endpoint, network.locator_port))?;
    let locator_port = rpc_listener.local_addr().context("locator local_addr")?.port();

    let local = PeerKey::new(network.uuid.clone(), network.hostname.clone(), locator_port);
    tracing::info!(uuid = %local.uuid, hostname = %local.hostname, port = locator_port, "locator starting");

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let mut tasks = Vec::new();

    {
        let commands = commands_tx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = rpc::accept_loop(rpc_listener, commands).await {
                tracing::error!(error = %e, "locator rpc server failed");
            }
        }));
    }

    if config.discovery.enabled {
        let key = local.clone();
        let discovery = config.discovery.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = broadcast::announce_loop(key, discovery).await {
                tracing::error!(error = %e, "announce broadcast failed");
            }
        }));

        if gateway.is_some() {
            let discovery = config.discovery.clone();
            let uuid = local.uuid.clone();
            let commands = commands_tx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = listener::listener_loop(discovery, uuid, commands).await {
                    tracing::error!(error = %e, "announce listener failed");
                }
            }));
        }
    }

    let peers = gateway.map(|gw| PeerTable::new(gw, config.discovery.heartbeat_timeout()));
    let (status_tx, status_rx) = watch::channel(LocatorSnapshot::default());
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let coordinator = Coordinator {
        publisher: SynchronizePublisher::new(registry.clone()),
        peers,
        commands: commands_rx,
        commands_tx: commands_tx.clone(),
        changes,
        status: status_tx,
        connect_timeout: config.discovery.connect_timeout(),
        tasks,
    };
    let task = tokio::spawn(coordinator.run(shutdown_rx));

    Ok(LocatorHandle {
        registry,
        local,
        commands: commands_tx,
        status: status_rx,
        shutdown: Some(shutdown_tx),
        task: Some(task),
    })
}

struct Coordinator {
    publisher: SynchronizePublisher,
    peers: Option<PeerTable>,
    commands: mpsc::UnboundedReceiver<Command>,
    // handed to every peer channel task
    commands_tx: mpsc::UnboundedSender<Command>,
    changes: mpsc::UnboundedReceiver<RegistryChange>,
    status: watch::Sender<LocatorSnapshot>,
    connect_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl Coordinator {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        while self.step(&mut shutdown).await {}
        self.teardown();
    }

    /// Handle one event. Returns false once the loop should stop.
    async fn step(&mut self, shutdown: &mut oneshot::Receiver<()>) -> bool {
        let deadline = self.peers.as_ref().and_then(PeerTable::next_deadline);

        // Queued events go before the timer so a message received ahead of
        // a deadline always resets it.
        tokio::select! {
            biased;

            _ = shutdown => return false,

            Some(command) = self.commands.recv() => self.handle(command),

            Some(change) = self.changes.recv() => {
                match &change {
                    RegistryChange::Attached(name) => tracing::debug!(service = %name, "pushing table after attach"),
                    RegistryChange::Detached(name) => tracing::debug!(service = %name, "pushing table after detach"),
                }
                self.publisher.update();
            }

            _ = sleep_until(deadline) => {
                if let Some(peers) = self.peers.as_mut() {
                    peers.expire(Instant::now());
                }
            }

            else => return false,
        }

        if let Some(peers) = self.peers.as_mut() {
            peers.flush_removals();
        }
        self.publish_status();
        true
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Announced(key) => self.announced(key),

            Command::Peer { key, generation, event } => {
                let Some(peers) = self.peers.as_mut() else { return };
                let now = Instant::now();
                match event {
                    PeerEvent::Connected(remote) => {
                        peers.connected(&key, generation, remote, now);
                    }
                    PeerEvent::Frame(frame) => peers.message(&key, generation, frame, now),
                    PeerEvent::Failed(e) => peers.failed(&key, generation, &e),
                }
            }

            Command::Subscribe(upstream) => self.publisher.subscribe(upstream),

            Command::Resolve { name, reply } => {
                let _ = reply.send(self.publisher.resolve(&name));
            }
        }
    }

    fn announced(&mut self, key: PeerKey) {
        let Some(peers) = self.peers.as_mut() else {
            tracing::trace!(peer = %key, "no gateway configured, announcement ignored");
            return;
        };

        if let Observed::New(generation) = peers.observe(&key, Instant::now()) {
            let task = tokio::spawn(channel::peer_channel(
                key.clone(),
                generation,
                self.connect_timeout,
                self.commands_tx.clone(),
            ));
            peers.bind_connection(&key, generation, task.abort_handle());
        }
    }

    fn publish_status(&self) {
        let peers = self
            .peers
            .as_ref()
            .map(|p| p.snapshot(Instant::now()))
            .unwrap_or_default();
        self.status.send_replace(LocatorSnapshot {
            peers,
            subscribers: self.publisher.len(),
        });
    }

    fn teardown(&mut self) {
        tracing::info!("locator shutting down");

        self.publisher.shutdown();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(peers) = self.peers.as_mut() {
            peers.clear();
        }
        self.publish_status();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locator_core::frame::{read_frame, write_frame};
    use locator_core::{ErrorCode, ServiceTable};
    use locator_services::{AdhocGateway, PeerPhase};
    use tokio::net::TcpStream;

    /// Coordinator with no background tasks, driven one step at a time.
    fn coordinator(heartbeat: Duration) -> (Coordinator, mpsc::UnboundedSender<Command>) {
        let gateway: Arc<dyn Gateway> = Arc::new(AdhocGateway::new());
        let (registry, changes) = Registry::new(
            RegistryConfig {
                hostname: "node-a".into(),
                bind_address: "127.0.0.1".into(),
                ports: None,
            },
            Some(gateway.clone()),
        );
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(LocatorSnapshot::default());

        let coordinator = Coordinator {
            publisher: SynchronizePublisher::new(Arc::new(registry)),
            peers: Some(PeerTable::new(gateway, heartbeat)),
            commands,
            commands_tx: commands_tx.clone(),
            changes,
            status,
            connect_timeout: Duration::from_secs(1),
            tasks: Vec::new(),
        };
        (coordinator, commands_tx)
    }

    fn config(uuid: &str) -> LocatorConfig {
        let mut config = LocatorConfig::default();
        config.network.uuid = uuid.into();
        config.network.hostname = "127.0.0.1".into();
        config.network.endpoint = "127.0.0.1".into();
        config.network.locator_port = 0;
        config.discovery.enabled = false;
        config
    }

    #[tokio::test]
    async fn binds_ephemeral_locator_port() {
        let handle = start(&config("a"), None).await.unwrap();
        assert_ne!(handle.locator_port(), 0);
        assert_eq!(handle.local_key().uuid, "a");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn resolve_over_rpc() {
        let handle = start(&config("a"), None).await.unwrap();
        let mut stream = TcpStream::connect(("127.0.0.1", handle.locator_port()))
            .await
            .unwrap();

        write_frame(&mut stream, &Frame::Resolve { name: "nope".into() })
            .await
            .unwrap();
        match read_frame(&mut stream).await.unwrap() {
            Some(Frame::Error { code, .. }) => assert_eq!(code, ErrorCode::ServiceUnavailable),
            other => panic!("unexpected {other:?}"),
        }
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn synchronize_subscriber_counted_and_choked() {
        let handle = start(&config("a"), None).await.unwrap();
        let mut status = handle.status();
        let mut stream = TcpStream::connect(("127.0.0.1", handle.locator_port()))
            .await
            .unwrap();

        write_frame(&mut stream, &Frame::Synchronize).await.unwrap();
        assert!(matches!(read_frame(&mut stream).await.unwrap(), Some(Frame::Chunk { .. })));

        status.wait_for(|s| s.subscribers == 1).await.unwrap();

        handle.shutdown().await;
        assert_eq!(read_frame(&mut stream).await.unwrap(), Some(Frame::Choke));
        assert_eq!(read_frame(&mut stream).await.unwrap(), None);
    }

    #[tokio::test]
    async fn announcement_ignored_without_gateway() {
        let handle = start(&config("a"), None).await.unwrap();
        let mut status = handle.status();
        handle.observe(PeerKey::new("b", "127.0.0.1", 1));
        status.changed().await.unwrap();
        assert!(handle.snapshot().peers.is_empty());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn unreachable_peer_is_dropped() {
        let gateway: Arc<dyn Gateway> = Arc::new(AdhocGateway::new());
        let handle = start(&config("a"), Some(gateway)).await.unwrap();
        let mut status = handle.status();

        let dead_port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        handle.observe(PeerKey::new("b", "127.0.0.1", dead_port));

        status.changed().await.unwrap();
        time::timeout(Duration::from_secs(5), status.wait_for(|s| s.peers.is_empty()))
            .await
            .expect("unreachable peer was never removed")
            .unwrap();
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn queued_message_resets_deadline_before_expiry() {
        let (mut coordinator, commands) = coordinator(Duration::from_millis(30));
        let (_stop, mut shutdown) = oneshot::channel();

        let key = PeerKey::new("b", "127.0.0.1", 1);
        let peers = coordinator.peers.as_mut().unwrap();
        let now = Instant::now();
        let Observed::New(generation) = peers.observe(&key, now) else {
            panic!("expected new peer");
        };
        peers.connected(&key, generation, "127.0.0.1:1".parse().unwrap(), now);
        peers.message(&key, generation, Frame::Chunk { table: ServiceTable::new() }, now);

        // received before the deadline, handled after it has passed
        commands
            .send(Command::Peer {
                key: key.clone(),
                generation,
                event: PeerEvent::Frame(Frame::Chunk { table: ServiceTable::new() }),
            })
            .unwrap();
        time::sleep(Duration::from_millis(35)).await;

        assert!(coordinator.step(&mut shutdown).await);
        let phase = coordinator.peers.as_ref().unwrap().phase(&key);
        assert_eq!(phase, Some(PeerPhase::Live));

        // nothing else arrives, so the refreshed deadline evicts it
        assert!(coordinator.step(&mut shutdown).await);
        assert_eq!(coordinator.peers.as_ref().unwrap().phase(&key), None);
    }

    #[tokio::test]
    async fn step_stops_on_shutdown() {
        let (mut coordinator, _commands) = coordinator(Duration::from_secs(60));
        let (stop, mut shutdown) = oneshot::channel();
        stop.send(()).unwrap();
        assert!(!coordinator.step(&mut shutdown).await);
    }
}
