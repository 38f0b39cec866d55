use log::{debug, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::core::{Message, PeerDirectory};
use crate::network::Datagram;
use crate::utils::Result;

/// Sends transfer-channel requests. Every request goes to every known peer,
/// since the requester cannot know who holds a file.
#[derive(Clone)]
pub struct TransferClient {
    local_id: String,
    peers: PeerDirectory,
    transport: Arc<dyn Datagram>,
    transfer_port: u16,
    max_datagram: usize,
}

impl TransferClient {
    pub fn new(
        local_id: String,
        peers: PeerDirectory,
        transport: Arc<dyn Datagram>,
        transfer_port: u16,
        max_datagram: usize,
    ) -> Self {
        Self {
            local_id,
            peers,
            transport,
            transfer_port,
            max_datagram,
        }
    }

    /// Sends one message to a peer's transfer port.
    pub async fn send(&self, message: &Message, address: IpAddr) -> Result<()> {
        let data = message.encode_bounded(self.max_datagram)?;
        let target = SocketAddr::new(address, self.transfer_port);
        self.transport.send_to(&data, target).await?;
        debug!("Sent {} to {}", message.msg_type(), target);
        Ok(())
    }

    /// Returns how many peers the message was handed to.
    async fn fan_out(&self, message: &Message) -> Result<usize> {
        let data = message.encode_bounded(self.max_datagram)?;
        let addresses = self.peers.all_addresses().await;

        if addresses.is_empty() {
            warn!("No peers known, {} not sent", message.msg_type());
            return Ok(0);
        }

        let mut sent = 0;
        for address in addresses {
            let target = SocketAddr::new(address, self.transfer_port);
            match self.transport.send_to(&data, target).await {
                Ok(()) => sent += 1,
                Err(e) => warn!("Failed to send {} to {}: {}", message.msg_type(), target, e),
            }
        }

        debug!("Sent {} to {} peers", message.msg_type(), sent);
        Ok(sent)
    }

    pub async fn request_fingerprint(&self, file_id: &str) -> Result<usize> {
        info!("Requesting fingerprint {}", file_id);
        self.fan_out(&Message::request_file_fingerprint(&self.local_id, file_id))
            .await
    }

    pub async fn request_block(&self, file_id: &str, block_index: usize) -> Result<usize> {
        self.fan_out(&Message::request_block(&self.local_id, file_id, block_index))
            .await
    }

    /// One request per index, each to every peer. Returns the datagram count.
    pub async fn request_all_blocks(&self, file_id: &str, number_of_blocks: usize) -> Result<usize> {
        let mut sent = 0;
        for index in 0..number_of_blocks {
            sent += self.request_block(file_id, index).await?;
        }

        info!(
            "Requested {} blocks of {} ({} datagrams)",
            number_of_blocks, file_id, sent
        );
        Ok(sent)
    }
}
