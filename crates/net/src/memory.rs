//! In-process overlay
//!
//! Every node joined to a hub is directly linked to every other node. Used
//! for tests and for rehearsing a show with several peers in one process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::{Error, Result};
use crate::overlay::{Overlay, OverlayEvent, OverlayEvents, PeerId};

struct HubNode {
    tx: mpsc::UnboundedSender<OverlayEvent>,
    topics: HashSet<String>,
}

/// Shared switchboard for in-process nodes
#[derive(Clone, Default)]
pub struct MemoryHub {
    nodes: Arc<Mutex<HashMap<PeerId, HubNode>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new node with a random identity
    pub async fn join(&self) -> (MemoryNode, OverlayEvents) {
        self.join_as(PeerId::generate()).await
    }

    /// Attach a new node with a fixed identity
    pub async fn join_as(&self, identity: PeerId) -> (MemoryNode, OverlayEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut nodes = self.nodes.lock().await;

        for (peer, node) in nodes.iter() {
            let _ = node.tx.send(OverlayEvent::PeerConnected(identity.clone()));
            let _ = tx.send(OverlayEvent::PeerConnected(peer.clone()));
        }

        nodes.insert(
            identity.clone(),
            HubNode {
                tx,
                topics: HashSet::new(),
            },
        );
        debug!(peer = %identity.short(), peers = nodes.len(), "Node joined hub");

        (
            MemoryNode {
                identity,
                hub: self.clone(),
            },
            rx,
        )
    }

    /// Number of attached nodes
    pub async fn len(&self) -> usize {
        self.nodes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.lock().await.is_empty()
    }
}

/// A node attached to a [`MemoryHub`]
#[derive(Clone)]
pub struct MemoryNode {
    identity: PeerId,
    hub: MemoryHub,
}

impl MemoryNode {
    /// Detach from the hub; remaining nodes see a disconnect
    pub async fn leave(&self) {
        let mut nodes = self.hub.nodes.lock().await;
        if nodes.remove(&self.identity).is_none() {
            return;
        }
        for node in nodes.values() {
            let _ = node
                .tx
                .send(OverlayEvent::PeerDisconnected(self.identity.clone()));
        }
        debug!(peer = %self.identity.short(), "Node left hub");
    }
}

#[async_trait]
impl Overlay for MemoryNode {
    fn local_identity(&self) -> &PeerId {
        &self.identity
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let mut nodes = self.hub.nodes.lock().await;
        let node = nodes.get_mut(&self.identity).ok_or(Error::NotRunning)?;
        node.topics.insert(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        let nodes = self.hub.nodes.lock().await;
        if !nodes.contains_key(&self.identity) {
            return Err(Error::NotRunning);
        }

        for (peer, node) in nodes.iter() {
            if *peer == self.identity || !node.topics.contains(topic) {
                continue;
            }
            let _ = node.tx.send(OverlayEvent::Message {
                topic: topic.to_string(),
                from: self.identity.clone(),
                data: data.clone(),
            });
        }
        Ok(())
    }
}
