use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

use crate::core::protocol::Inbound;
use crate::core::{Message, PeerDirectory};
use crate::network::Datagram;
use crate::utils::{P2PError, Result};

/// Broadcasts `announce` on a fixed period for the life of the process.
pub struct DiscoveryBeacon {
    peer_id: String,
    transport: Arc<dyn Datagram>,
    target: SocketAddr,
    every: Duration,
}

impl DiscoveryBeacon {
    pub fn new(
        peer_id: String,
        transport: Arc<dyn Datagram>,
        target: SocketAddr,
        every: Duration,
    ) -> Self {
        Self {
            peer_id,
            transport,
            target,
            every,
        }
    }

    pub async fn announce(&self) -> Result<()> {
        let data = Message::announce(&self.peer_id).encode()?;
        self.transport.send_to(&data, self.target).await?;
        debug!("Announced presence to {}", self.target);
        Ok(())
    }

    /// Fire-and-forget: a failed broadcast is logged and the next tick tries again.
    pub async fn run(self) {
        info!(
            "Discovery beacon started: {} every {:?}",
            self.target, self.every
        );
        let mut ticker = interval(self.every);

        loop {
            ticker.tick().await;
            if let Err(e) = self.announce().await {
                warn!("Discovery announcement failed: {}", e);
            }
        }
    }
}

/// Learns peers from announcements. The datagram's source IP is recorded,
/// never an address carried in the payload.
pub struct DiscoveryListener {
    local_id: String,
    peers: PeerDirectory,
}

impl DiscoveryListener {
    pub fn new(local_id: String, peers: PeerDirectory) -> Self {
        Self { local_id, peers }
    }

    /// Returns the peer id that was recorded, if any.
    pub async fn handle_datagram(&self, data: &[u8], source: SocketAddr) -> Result<Option<String>> {
        match Message::decode(data)? {
            Inbound::Known(Message::Announce { user_id }) => {
                if user_id == self.local_id {
                    return Ok(None);
                }
                self.peers.upsert(&user_id, source.ip()).await;
                Ok(Some(user_id))
            }
            other => {
                debug!(
                    "Ignoring non-announce message from {} on discovery channel: {:?}",
                    source, other
                );
                Ok(None)
            }
        }
    }

    pub async fn run(self, socket: Arc<UdpSocket>, max_datagram: usize) {
        let mut buffer = vec![0u8; max_datagram];
        info!("Discovery listener started for node {}", self.local_id);

        loop {
            match socket.recv_from(&mut buffer).await {
                Ok((len, addr)) => match self.handle_datagram(&buffer[..len], addr).await {
                    Ok(_) => {}
                    Err(P2PError::Decode(e)) => {
                        debug!("Dropped malformed discovery datagram from {}: {}", addr, e)
                    }
                    Err(e) => warn!("Discovery datagram from {} failed: {}", addr, e),
                },
                Err(e) => {
                    warn!("Discovery listen error: {}", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}
