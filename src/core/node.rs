use log::info;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::{Config, PeerDirectory};
use crate::network::{DiscoveryBeacon, DiscoveryListener, MessageRouter};
use crate::storage::FileCatalog;
use crate::transfer::{BlockAssembler, TransferClient};
use crate::utils::{NodeUtils, Result};

/// One participant: a discovery socket, a transfer socket and the local stores.
pub struct Node {
    id: String,
    pub config: Config,
    peers: PeerDirectory,
    catalog: Arc<FileCatalog>,
    assembler: Arc<Mutex<BlockAssembler>>,
    client: TransferClient,
    discovery_socket: Arc<UdpSocket>,
    transfer_socket: Arc<UdpSocket>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let id = Uuid::new_v4().to_string();
        let catalog = Arc::new(
            FileCatalog::open(&config.data_dir, config.block_size)
                .await?
                .with_max_datagram(config.max_datagram),
        );
        let peers = PeerDirectory::new();

        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let discovery_socket = Arc::new(NodeUtils::create_broadcast_socket(SocketAddr::new(
            any,
            config.discovery_port,
        ))?);
        let transfer_socket =
            Arc::new(NodeUtils::bind_udp(SocketAddr::new(any, config.transfer_port)).await?);

        let client = TransferClient::new(
            id.clone(),
            peers.clone(),
            transfer_socket.clone(),
            config.transfer_port,
            config.max_datagram,
        );

        Ok(Self {
            id,
            config,
            peers,
            catalog,
            assembler: Arc::new(Mutex::new(BlockAssembler::new())),
            client,
            discovery_socket,
            transfer_socket,
            tasks: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client(&self) -> &TransferClient {
        &self.client
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    pub fn catalog(&self) -> &Arc<FileCatalog> {
        &self.catalog
    }

    pub fn assembler(&self) -> &Arc<Mutex<BlockAssembler>> {
        &self.assembler
    }

    /// Spawns the beacon, the discovery listener and the transfer router.
    pub fn start(&mut self) {
        info!(
            "Starting node {} (discovery {}, transfer {})",
            self.id, self.config.discovery_port, self.config.transfer_port
        );

        let beacon = DiscoveryBeacon::new(
            self.id.clone(),
            self.discovery_socket.clone(),
            self.config.broadcast_target(),
            self.config.announce_every(),
        );
        self.tasks.push(tokio::spawn(beacon.run()));

        let listener = DiscoveryListener::new(self.id.clone(), self.peers.clone());
        self.tasks.push(tokio::spawn(
            listener.run(self.discovery_socket.clone(), self.config.max_datagram),
        ));

        let router = MessageRouter::new(
            self.id.clone(),
            self.peers.clone(),
            self.catalog.clone(),
            self.assembler.clone(),
            self.client.clone(),
        );
        self.tasks.push(tokio::spawn(
            router.run(self.transfer_socket.clone(), self.config.max_datagram),
        ));
    }

    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Node {} stopped", self.id);
    }
}
