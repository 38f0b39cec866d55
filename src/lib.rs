//! LAN file sharing without a server.
//!
//! Nodes broadcast their presence, learn each other's addresses, and fetch
//! files by content identifier (the SHA-256 of a file's manifest): first the
//! manifest, then every block by index, reassembled in index order.

pub mod core;
pub mod network;
pub mod storage;
pub mod transfer;
pub mod utils;

// Re-export main types
pub use crate::core::{Config, Message, Node, PeerDirectory};
pub use network::{DiscoveryBeacon, DiscoveryListener, MessageRouter};
pub use storage::{FileCatalog, FileManifest};
pub use transfer::{BlockAssembler, TransferClient};
pub use utils::{
    error::{P2PError, Result},
    NodeUtils,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
