use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::DEFAULT_BLOCK_SIZE;
use crate::utils::{P2PError, Result};

pub const DISCOVERY_PORT: u16 = 5000;
pub const TRANSFER_PORT: u16 = 5001;
pub const MAX_DATAGRAM: usize = 65_507;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub discovery_port: u16,
    pub transfer_port: u16,
    pub broadcast_addr: IpAddr,
    /// Seconds between presence announcements.
    pub announce_interval: u64,
    pub block_size: usize,
    pub max_datagram: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./p2p-data"),
            discovery_port: DISCOVERY_PORT,
            transfer_port: TRANSFER_PORT,
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            announce_interval: 2,
            block_size: DEFAULT_BLOCK_SIZE,
            max_datagram: MAX_DATAGRAM,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(P2PError::ConfigError("block_size must be positive".to_string()));
        }
        if self.announce_interval == 0 {
            return Err(P2PError::ConfigError(
                "announce_interval must be positive".to_string(),
            ));
        }
        if self.discovery_port == self.transfer_port {
            return Err(P2PError::ConfigError(format!(
                "discovery and transfer channels both use port {}",
                self.discovery_port
            )));
        }
        if self.max_datagram > MAX_DATAGRAM {
            return Err(P2PError::ConfigError(format!(
                "max_datagram {} exceeds the UDP limit {}",
                self.max_datagram, MAX_DATAGRAM
            )));
        }
        // coarse bound only; publish checks each file's escaped replies
        if self.block_size >= self.max_datagram / 2 {
            return Err(P2PError::ConfigError(format!(
                "block_size {} cannot fit in a {} byte datagram",
                self.block_size, self.max_datagram
            )));
        }
        Ok(())
    }

    pub fn announce_every(&self) -> Duration {
        Duration::from_secs(self.announce_interval)
    }

    pub fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_addr, self.discovery_port)
    }
}
