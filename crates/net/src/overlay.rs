//! Publish/subscribe overlay capability
//!
//! An overlay connects this peer to others and carries opaque byte payloads
//! on named topics. Delivery is best-effort: no ordering, no acknowledgement,
//! and a publisher never receives its own messages.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Network-layer identity of a peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Fresh random identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for logs
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Events surfaced by an overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayEvent {
    /// A link to a new peer is up
    PeerConnected(PeerId),
    /// A link to a peer went away
    PeerDisconnected(PeerId),
    /// Payload published by another peer on a subscribed topic
    Message {
        topic: String,
        from: PeerId,
        data: Vec<u8>,
    },
}

/// Receiving side of an overlay, returned when the overlay starts
pub type OverlayEvents = mpsc::UnboundedReceiver<OverlayEvent>;

/// Topic-based publish/subscribe between peers
#[async_trait]
pub trait Overlay: Send + Sync + 'static {
    /// This peer's identity
    fn local_identity(&self) -> &PeerId;

    /// Start delivering messages published on `topic`
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Publish `data` to every peer subscribed to `topic`
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id() {
        let a = PeerId::generate();
        let b = PeerId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert_eq!(a.short().len(), 8);
        assert_eq!(PeerId::from("abc").short(), "abc");
    }
}
