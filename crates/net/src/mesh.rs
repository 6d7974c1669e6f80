//! TCP mesh overlay
//!
//! Every node listens for links and dials its bootstrap peers. Published
//! payloads are flooded over every link and de-duplicated by
//! `(origin, seq)`, so a message reaches every node in the connected
//! component once. Topic filtering happens at the receiver.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::WriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame, Frame};
use crate::overlay::{Overlay, OverlayEvent, OverlayEvents, PeerId};
use crate::DEFAULT_PORT;

/// Outbound frames buffered per link before new ones are dropped
const LINK_QUEUE: usize = 64;

/// How many `(origin, seq)` pairs are remembered for de-duplication
const MAX_SEEN: usize = 4096;

/// Ping interval in milliseconds
const HEARTBEAT_INTERVAL_MS: u64 = 5000;

/// Mesh node configuration
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub listen_addr: SocketAddr,
    /// Peers to dial on start
    pub bootstrap: Vec<SocketAddr>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            bootstrap: Vec::new(),
        }
    }
}

struct Link {
    id: u64,
    addr: SocketAddr,
    /// We dialed this link
    outbound: bool,
    tx: mpsc::Sender<Frame>,
}

/// Of two links between the same pair, keep the one dialed by the smaller id
fn preferred_link(local: &PeerId, peer: &PeerId, outbound: bool) -> bool {
    (local < peer) == outbound
}

/// Bounded memory of recently seen publishes
struct SeenSet {
    order: VecDeque<(PeerId, u64)>,
    set: HashSet<(PeerId, u64)>,
}

impl SeenSet {
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
            set: HashSet::new(),
        }
    }

    /// Returns `false` if the pair was already seen
    fn insert(&mut self, origin: &PeerId, seq: u64) -> bool {
        let key = (origin.clone(), seq);
        if self.set.contains(&key) {
            return false;
        }
        if self.order.len() >= MAX_SEEN {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.set.insert(key);
        true
    }
}

struct MeshState {
    running: bool,
    links: HashMap<PeerId, Link>,
    topics: HashSet<String>,
    seen: SeenSet,
    next_seq: u64,
    next_link_id: u64,
}

/// State shared by the node handle and its tasks
struct Shared {
    identity: PeerId,
    state: RwLock<MeshState>,
    events: mpsc::UnboundedSender<OverlayEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Mesh node handle
pub struct MeshNode {
    addr: SocketAddr,
    shared: Arc<Shared>,
}

impl MeshNode {
    /// Bind the listener, dial bootstrap peers and start the background tasks
    pub async fn start(config: MeshConfig) -> Result<(Self, OverlayEvents)> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let addr = listener.local_addr()?;
        let identity = PeerId::generate();

        info!(addr = %addr, peer = %identity.short(), "Mesh node started");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);

        let shared = Arc::new(Shared {
            identity,
            state: RwLock::new(MeshState {
                running: true,
                links: HashMap::new(),
                topics: HashSet::new(),
                seen: SeenSet::new(),
                next_seq: 0,
                next_link_id: 0,
            }),
            events: event_tx,
            shutdown_tx,
        });

        tokio::spawn(accept_loop(
            listener,
            shared.clone(),
            shared.shutdown_tx.subscribe(),
        ));
        tokio::spawn(heartbeat_task(shared.clone(), shared.shutdown_tx.subscribe()));

        let node = MeshNode { addr, shared };
        for peer_addr in config.bootstrap {
            let shared = node.shared.clone();
            tokio::spawn(async move {
                if let Err(e) = dial(peer_addr, shared).await {
                    warn!(addr = %peer_addr, error = %e, "Bootstrap dial failed");
                }
            });
        }

        Ok((node, event_rx))
    }

    /// The bound listen address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Close every link and stop the background tasks
    pub async fn shutdown(&self) {
        {
            let mut s = self.shared.state.write().await;
            s.running = false;
            s.links.clear();
        }
        let _ = self.shared.shutdown_tx.send(());
        info!("Mesh node shutdown initiated");
    }
}

#[async_trait]
impl Overlay for MeshNode {
    fn local_identity(&self) -> &PeerId {
        &self.shared.identity
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let mut s = self.shared.state.write().await;
        if !s.running {
            return Err(Error::NotRunning);
        }
        s.topics.insert(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        let mut s = self.shared.state.write().await;
        if !s.running {
            return Err(Error::NotRunning);
        }

        s.next_seq += 1;
        let seq = s.next_seq;
        s.seen.insert(&self.shared.identity, seq);

        if s.links.is_empty() {
            debug!(topic, "Published with no linked peers");
        }

        let frame = Frame::Publish {
            topic: topic.to_string(),
            origin: self.shared.identity.clone(),
            seq,
            data,
        };
        for (peer, link) in &s.links {
            if link.tx.try_send(frame.clone()).is_err() {
                debug!(peer = %peer.short(), "Link queue full, frame dropped");
            }
        }
        Ok(())
    }
}

async fn dial(addr: SocketAddr, shared: Arc<Shared>) -> Result<()> {
    debug!(addr = %addr, "Dialing peer");
    let stream = TcpStream::connect(addr).await?;
    tokio::spawn(handle_link(stream, addr, true, shared));
    Ok(())
}

/// Accept incoming links
async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_link(stream, addr, false, shared.clone()));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Run one link: handshake, register, then read until it closes
async fn handle_link(stream: TcpStream, addr: SocketAddr, outbound: bool, shared: Arc<Shared>) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let hello = Frame::Hello {
        peer_id: shared.identity.clone(),
    };
    if let Err(e) = write_frame(&mut writer, &hello).await {
        warn!(addr = %addr, error = %e, "Handshake write failed");
        return;
    }

    let peer = match read_frame(&mut reader).await {
        Ok(Frame::Hello { peer_id }) => peer_id,
        Ok(_) => {
            warn!(addr = %addr, "Expected Hello");
            return;
        }
        Err(e) => {
            warn!(addr = %addr, error = %e, "Handshake read failed");
            return;
        }
    };

    if peer == shared.identity {
        debug!(addr = %addr, "Dialed ourselves, dropping link");
        return;
    }

    let (tx, rx) = mpsc::channel(LINK_QUEUE);
    let (link_id, replaced) = {
        let mut s = shared.state.write().await;
        if !s.running {
            return;
        }

        // Both sides dialing at once leaves two links; both nodes keep the same one
        let replaced = match s.links.get(&peer) {
            None => false,
            Some(existing)
                if existing.outbound != outbound
                    && preferred_link(&shared.identity, &peer, outbound) =>
            {
                debug!(peer = %peer.short(), "Replacing duplicate link");
                true
            }
            Some(_) => {
                debug!(peer = %peer.short(), "Already linked, dropping duplicate");
                return;
            }
        };

        s.next_link_id += 1;
        let id = s.next_link_id;
        // Dropping the old sender ends its writer, which closes that link
        s.links.insert(
            peer.clone(),
            Link {
                id,
                addr,
                outbound,
                tx,
            },
        );
        (id, replaced)
    };

    let mut writer_handle = tokio::spawn(writer_task(writer, rx));
    if !replaced {
        let _ = shared.events.send(OverlayEvent::PeerConnected(peer.clone()));
    }
    info!(peer = %peer.short(), addr = %addr, outbound, "Peer linked");

    let mut shutdown_rx = shared.shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                match result {
                    Ok(frame) => handle_frame(frame, &peer, &shared).await,
                    Err(Error::ConnectionClosed) => {
                        debug!(peer = %peer.short(), "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(peer = %peer.short(), error = %e, "Read error");
                        break;
                    }
                }
            }
            // Write failure or the link was dropped from the table
            _ = &mut writer_handle => {
                debug!(peer = %peer.short(), "Writer stopped");
                break;
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    writer_handle.abort();

    let removed = {
        let mut s = shared.state.write().await;
        match s.links.get(&peer) {
            Some(link) if link.id == link_id => s.links.remove(&peer).is_some(),
            _ => false,
        }
    };
    if removed {
        let _ = shared.events.send(OverlayEvent::PeerDisconnected(peer.clone()));
        info!(peer = %peer.short(), "Peer unlinked");
    }
}

/// Writer task - sends frames to the linked peer
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}

/// Handle a frame received from `from`
async fn handle_frame(frame: Frame, from: &PeerId, shared: &Arc<Shared>) {
    match frame {
        Frame::Publish {
            topic,
            origin,
            seq,
            data,
        } => {
            let (deliver, forward) = {
                let mut s = shared.state.write().await;
                if !s.seen.insert(&origin, seq) {
                    return;
                }
                let deliver = origin != shared.identity && s.topics.contains(&topic);
                let forward: Vec<mpsc::Sender<Frame>> = s
                    .links
                    .iter()
                    .filter(|(peer, _)| *peer != from && **peer != origin)
                    .map(|(_, link)| link.tx.clone())
                    .collect();
                (deliver, forward)
            };

            let frame = Frame::Publish {
                topic: topic.clone(),
                origin: origin.clone(),
                seq,
                data: data.clone(),
            };
            for tx in forward {
                let _ = tx.try_send(frame.clone());
            }

            if deliver {
                let _ = shared.events.send(OverlayEvent::Message {
                    topic,
                    from: origin,
                    data,
                });
            }
        }
        Frame::Ping => {
            let s = shared.state.read().await;
            if let Some(link) = s.links.get(from) {
                let _ = link.tx.try_send(Frame::Pong);
            }
        }
        Frame::Pong => {}
        Frame::Hello { .. } => {
            debug!(peer = %from.short(), "Ignoring repeated Hello");
        }
    }
}

/// Heartbeat task - pings every link so dead sockets surface as disconnects
async fn heartbeat_task(shared: Arc<Shared>, mut shutdown_rx: broadcast::Receiver<()>) {
    let interval = std::time::Duration::from_millis(HEARTBEAT_INTERVAL_MS);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let s = shared.state.read().await;
                for link in s.links.values() {
                    if link.tx.try_send(Frame::Ping).is_err() {
                        debug!(addr = %link.addr, "Ping dropped");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Heartbeat task shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn local() -> MeshConfig {
        MeshConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            bootstrap: Vec::new(),
        }
    }

    async fn next_connected(rx: &mut OverlayEvents) -> PeerId {
        loop {
            let event = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for link")
                .expect("event channel closed");
            if let OverlayEvent::PeerConnected(peer) = event {
                return peer;
            }
        }
    }

    async fn next_message(rx: &mut OverlayEvents) -> (String, PeerId, Vec<u8>) {
        loop {
            let event = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for message")
                .expect("event channel closed");
            if let OverlayEvent::Message { topic, from, data } = event {
                return (topic, from, data);
            }
        }
    }

    async fn link_count(node: &MeshNode) -> usize {
        node.shared.state.read().await.links.len()
    }

    #[test]
    fn test_preferred_link_agrees_on_both_sides() {
        let a = PeerId::from("a");
        let b = PeerId::from("b");
        // The a->b connection is outbound for a and inbound for b
        assert!(preferred_link(&a, &b, true));
        assert!(preferred_link(&b, &a, false));
        // The b->a connection loses on both sides
        assert!(!preferred_link(&a, &b, false));
        assert!(!preferred_link(&b, &a, true));
    }

    #[test]
    fn test_seen_set_evicts_oldest() {
        let mut seen = SeenSet::new();
        let origin = PeerId::from("o");
        assert!(seen.insert(&origin, 1));
        assert!(!seen.insert(&origin, 1));
        for seq in 2..=(MAX_SEEN as u64 + 1) {
            assert!(seen.insert(&origin, seq));
        }
        // 1 was evicted
        assert!(seen.insert(&origin, 1));
    }

    #[tokio::test]
    async fn test_two_nodes_exchange() {
        let (a, mut a_rx) = MeshNode::start(local()).await.unwrap();
        let (b, mut b_rx) = MeshNode::start(MeshConfig {
            bootstrap: vec![a.addr()],
            ..local()
        })
        .await
        .unwrap();

        assert_eq!(&next_connected(&mut a_rx).await, b.local_identity());
        assert_eq!(&next_connected(&mut b_rx).await, a.local_identity());

        a.subscribe("lobby").await.unwrap();
        b.subscribe("lobby").await.unwrap();

        a.publish("lobby", b"curtain".to_vec()).await.unwrap();
        let (topic, from, data) = next_message(&mut b_rx).await;
        assert_eq!(topic, "lobby");
        assert_eq!(&from, a.local_identity());
        assert_eq!(data, b"curtain");

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn test_publish_floods_through_middle_node() {
        let (a, mut a_rx) = MeshNode::start(local()).await.unwrap();
        let (b, mut b_rx) = MeshNode::start(MeshConfig {
            bootstrap: vec![a.addr()],
            ..local()
        })
        .await
        .unwrap();
        next_connected(&mut a_rx).await;
        next_connected(&mut b_rx).await;

        let (c, mut c_rx) = MeshNode::start(MeshConfig {
            bootstrap: vec![b.addr()],
            ..local()
        })
        .await
        .unwrap();
        next_connected(&mut c_rx).await;
        next_connected(&mut b_rx).await;

        c.subscribe("lobby").await.unwrap();
        a.publish("lobby", b"cue".to_vec()).await.unwrap();

        let (_, from, data) = next_message(&mut c_rx).await;
        assert_eq!(&from, a.local_identity());
        assert_eq!(data, b"cue");

        // B is not subscribed and must not deliver locally
        assert!(b_rx.try_recv().is_err());

        for node in [a, b, c] {
            node.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_simultaneous_dial_keeps_one_link() {
        let (a, mut a_rx) = MeshNode::start(local()).await.unwrap();
        let (b, mut b_rx) = MeshNode::start(local()).await.unwrap();

        let (ab, ba) = tokio::join!(
            dial(b.addr(), a.shared.clone()),
            dial(a.addr(), b.shared.clone())
        );
        ab.unwrap();
        ba.unwrap();
        next_connected(&mut a_rx).await;
        next_connected(&mut b_rx).await;

        // Let the losing link close on both sides
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(link_count(&a).await, 1);
        assert_eq!(link_count(&b).await, 1);

        b.subscribe("lobby").await.unwrap();
        a.publish("lobby", b"both ways".to_vec()).await.unwrap();
        let (_, from, data) = next_message(&mut b_rx).await;
        assert_eq!(&from, a.local_identity());
        assert_eq!(data, b"both ways");

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn test_dead_writer_closes_link() {
        let (a, mut a_rx) = MeshNode::start(local()).await.unwrap();
        let (b, mut b_rx) = MeshNode::start(MeshConfig {
            bootstrap: vec![a.addr()],
            ..local()
        })
        .await
        .unwrap();
        let b_id = next_connected(&mut a_rx).await;
        next_connected(&mut b_rx).await;

        // Stops a's writer for the link; its reader must follow
        a.shared.state.write().await.links.remove(&b_id);

        let event = loop {
            let event = timeout(Duration::from_secs(2), b_rx.recv())
                .await
                .expect("link was left half open")
                .expect("event channel closed");
            if let OverlayEvent::PeerDisconnected(peer) = event {
                break peer;
            }
        };
        assert_eq!(&event, a.local_identity());
        assert_eq!(link_count(&b).await, 0);

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_publishing() {
        let (a, _a_rx) = MeshNode::start(local()).await.unwrap();
        a.shutdown().await;
        assert!(matches!(
            a.publish("lobby", vec![1]).await,
            Err(Error::NotRunning)
        ));
    }
}
