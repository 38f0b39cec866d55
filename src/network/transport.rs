use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

use crate::utils::{P2PError, Result};

/// Best-effort datagram sender. Delivery, ordering and uniqueness are not guaranteed.
#[async_trait]
pub trait Datagram: Send + Sync {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()>;
}

#[async_trait]
impl Datagram for UdpSocket {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        let sent = UdpSocket::send_to(self, data, target)
            .await
            .map_err(|e| P2PError::NetworkError(format!("Failed to send to {}: {}", target, e)))?;

        if sent != data.len() {
            return Err(P2PError::NetworkError(format!(
                "Short send to {}: {} of {} bytes",
                target,
                sent,
                data.len()
            )));
        }
        Ok(())
    }
}
