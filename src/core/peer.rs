use log::info;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub peer_id: String,
    pub address: IpAddr,
    pub last_seen: Instant,
}

/// Peer id → address map shared by discovery and every outbound request.
///
/// Cloning shares the same table. Each method takes the lock once and
/// releases it before returning. Entries are never removed.
#[derive(Clone, Default)]
pub struct PeerDirectory {
    peers: Arc<RwLock<HashMap<String, PeerRecord>>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes a peer. Returns true when the id was not known before.
    pub async fn upsert(&self, peer_id: &str, address: IpAddr) -> bool {
        let mut peers = self.peers.write().await;
        let record = PeerRecord {
            peer_id: peer_id.to_string(),
            address,
            last_seen: Instant::now(),
        };

        match peers.insert(peer_id.to_string(), record) {
            None => {
                info!("Discovered peer {} at {} ({})", peer_id, address, peers.len());
                true
            }
            Some(previous) => {
                if previous.address != address {
                    info!(
                        "Peer {} moved from {} to {}",
                        peer_id, previous.address, address
                    );
                }
                false
            }
        }
    }

    pub async fn lookup(&self, peer_id: &str) -> Option<IpAddr> {
        self.peers.read().await.get(peer_id).map(|p| p.address)
    }

    pub async fn all_addresses(&self) -> Vec<IpAddr> {
        self.peers.read().await.values().map(|p| p.address).collect()
    }

    pub async fn snapshot(&self) -> Vec<PeerRecord> {
        let mut records: Vec<PeerRecord> = self.peers.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        records
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}
