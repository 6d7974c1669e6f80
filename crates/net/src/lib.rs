//! CueCannon Network Library
//!
//! Peer-to-peer plumbing for running a show without a server.
//!
//! # Architecture
//!
//! - **Overlay**: topic-based publish/subscribe between peers
//! - **MeshNode**: TCP overlay that floods publishes across linked peers
//! - **MemoryHub**: in-process overlay for tests and local rehearsals
//! - **Protocol**: lobby messages as protobuf requests
//!
//! # Usage
//!
//! ```ignore
//! let (node, mut events) = MeshNode::start(MeshConfig::default()).await?;
//! node.subscribe(LOBBY_TOPIC).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let OverlayEvent::Message { data, .. } = event {
//!         let msg = Message::decode(&data)?;
//!     }
//! }
//! ```

pub mod error;
mod frame;
pub mod memory;
pub mod mesh;
pub mod overlay;
pub mod protocol;

pub use error::{Error, Result};
pub use memory::{MemoryHub, MemoryNode};
pub use mesh::{MeshConfig, MeshNode};
pub use overlay::{Overlay, OverlayEvent, OverlayEvents, PeerId};
pub use protocol::{Message, LOBBY_TOPIC};

/// Default port for CueCannon mesh nodes
pub const DEFAULT_PORT: u16 = 7440;
