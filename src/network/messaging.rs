use log::{debug, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::core::protocol::Inbound;
use crate::core::{Message, PeerDirectory};
use crate::storage::FileCatalog;
use crate::transfer::{BlockAssembler, RecordOutcome, TransferClient};
use crate::utils::{P2PError, Result};

/// What a transfer-channel datagram led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    FingerprintSent,
    BlockSent,
    /// Manifest stored and one request per block sent to every peer.
    DownloadStarted { requests: usize },
    /// Another holder answered a fingerprint request already being served.
    AlreadyInFlight,
    BlockRecorded(RecordOutcome),
    Completed(PathBuf),
}

/// Entry point for every transfer-channel datagram.
///
/// Only senders already present in the peer directory are served; replies go
/// to the address discovery recorded for them.
pub struct MessageRouter {
    local_id: String,
    peers: PeerDirectory,
    catalog: Arc<FileCatalog>,
    assembler: Arc<Mutex<BlockAssembler>>,
    client: TransferClient,
}

impl MessageRouter {
    pub fn new(
        local_id: String,
        peers: PeerDirectory,
        catalog: Arc<FileCatalog>,
        assembler: Arc<Mutex<BlockAssembler>>,
        client: TransferClient,
    ) -> Self {
        Self {
            local_id,
            peers,
            catalog,
            assembler,
            client,
        }
    }

    pub async fn handle_datagram(&self, data: &[u8], source: SocketAddr) -> Result<Handled> {
        let inbound = Message::decode(data)?;
        let sender = inbound.user_id().to_string();

        let address = self
            .peers
            .lookup(&sender)
            .await
            .ok_or_else(|| P2PError::UnknownSender(sender.clone()))?;

        let message = match inbound {
            Inbound::Known(message) => message,
            Inbound::Unrecognized { kind, .. } => {
                return Err(P2PError::UnrecognizedMessage(kind));
            }
        };
        debug!(
            "Received {} from {} ({})",
            message.msg_type(),
            sender,
            source
        );

        match message {
            Message::RequestFileFingerprint { file_id, .. } => {
                self.answer_fingerprint(&file_id, address).await
            }
            Message::RequestBlock {
                file_id,
                block_index,
                ..
            } => self.answer_block(&file_id, block_index, address).await,
            Message::ResponseFileFingerprint {
                file_id, content, ..
            } => self.accept_fingerprint(&file_id, &content).await,
            Message::ResponseBlock {
                file_id,
                block_index,
                block_data,
                ..
            } => {
                self.accept_block(&file_id, block_index, block_data.into_bytes())
                    .await
            }
            Message::Announce { .. } => Err(P2PError::UnrecognizedMessage(
                "announce on transfer channel".to_string(),
            )),
        }
    }

    async fn answer_fingerprint(&self, file_id: &str, address: IpAddr) -> Result<Handled> {
        let fingerprint = self.catalog.fingerprint(file_id).await?;
        let response = Message::response_file_fingerprint(
            &self.local_id,
            &fingerprint.file_name,
            file_id,
            &fingerprint.content,
        );

        self.client.send(&response, address).await?;
        debug!("Sent fingerprint {} to {}", file_id, address);
        Ok(Handled::FingerprintSent)
    }

    async fn answer_block(&self, file_id: &str, index: usize, address: IpAddr) -> Result<Handled> {
        let (file_name, data) = self.catalog.block(file_id, index).await?;
        let response = Message::response_block(&self.local_id, &file_name, file_id, index, data)?;

        self.client.send(&response, address).await?;
        debug!("Sent block {} of {} to {}", index, file_id, address);
        Ok(Handled::BlockSent)
    }

    async fn accept_fingerprint(&self, file_id: &str, content: &str) -> Result<Handled> {
        let manifest = self.catalog.store_manifest(file_id, content).await?;
        let number_of_blocks = manifest.number_of_blocks();

        if !self.assembler.lock().await.begin(file_id, manifest) {
            debug!("Download {} already in flight", file_id);
            return Ok(Handled::AlreadyInFlight);
        }

        if number_of_blocks == 0 {
            return self.complete(file_id).await;
        }

        let requests = self
            .client
            .request_all_blocks(file_id, number_of_blocks)
            .await?;
        Ok(Handled::DownloadStarted { requests })
    }

    async fn accept_block(&self, file_id: &str, index: usize, payload: Vec<u8>) -> Result<Handled> {
        let (outcome, complete) = {
            let mut assembler = self.assembler.lock().await;
            let manifest = assembler
                .manifest(file_id)
                .ok_or_else(|| P2PError::UnknownDownload(file_id.to_string()))?;

            if index < manifest.number_of_blocks() && !manifest.verify_block(index, &payload) {
                return Err(P2PError::BlockVerificationFailed {
                    file_id: file_id.to_string(),
                    index,
                });
            }

            let outcome = assembler.record(file_id, index, payload)?;
            (outcome, assembler.is_complete(file_id))
        };

        if complete {
            return self.complete(file_id).await;
        }
        Ok(Handled::BlockRecorded(outcome))
    }

    /// Writes the assembled file, then drops the in-flight state.
    async fn complete(&self, file_id: &str) -> Result<Handled> {
        let (file_name, content) = {
            let assembler = self.assembler.lock().await;
            let manifest = assembler
                .manifest(file_id)
                .ok_or_else(|| P2PError::UnknownDownload(file_id.to_string()))?;
            (manifest.file_name().to_string(), assembler.materialize(file_id)?)
        };

        let path = self.catalog.store_file(&file_name, &content).await?;
        self.assembler.lock().await.discard(file_id);

        info!("Download {} complete: {:?}", file_id, path);
        Ok(Handled::Completed(path))
    }

    pub async fn run(self, socket: Arc<UdpSocket>, max_datagram: usize) {
        let mut buffer = vec![0u8; max_datagram];
        info!("Transfer listener started for node {}", self.local_id);

        loop {
            match socket.recv_from(&mut buffer).await {
                Ok((len, addr)) => {
                    if let Err(e) = self.handle_datagram(&buffer[..len], addr).await {
                        log_dropped(addr, &e);
                    }
                }
                Err(e) => {
                    warn!("Transfer listen error: {}", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

fn log_dropped(source: SocketAddr, err: &P2PError) {
    match err {
        P2PError::Decode(e) => debug!("Dropped undecodable datagram from {}: {}", source, e),
        P2PError::UnknownSender(id) => {
            info!("User id {} is not in the peers, dropped datagram from {}", id, source)
        }
        P2PError::FileNotFound(_) | P2PError::BlockNotFound { .. } => {
            info!("Not serving request from {}: {}", source, err)
        }
        P2PError::UnknownDownload(id) => debug!("Late block for {} from {}", id, source),
        P2PError::UnrecognizedMessage(kind) => {
            warn!("Invalid message type from {}: {}", source, kind)
        }
        other => warn!("Failed to handle datagram from {}: {}", source, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::transport::memory::MemoryTransport;
    use crate::storage::{content_id, FileManifest, HashUtils};
    use std::net::Ipv4Addr;

    const PORT: u16 = 5001;

    struct TestNode {
        id: String,
        ip: IpAddr,
        peers: PeerDirectory,
        transport: Arc<MemoryTransport>,
        catalog: Arc<FileCatalog>,
        assembler: Arc<Mutex<BlockAssembler>>,
        client: TransferClient,
        router: MessageRouter,
        dir: tempfile::TempDir,
    }

    impl TestNode {
        async fn new(last: u8, block_size: usize) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let id = format!("node-{}", last);
            let peers = PeerDirectory::new();
            let transport = Arc::new(MemoryTransport::new());
            let catalog = Arc::new(FileCatalog::open(dir.path(), block_size).await.unwrap());
            let assembler = Arc::new(Mutex::new(BlockAssembler::new()));
            let client =
                TransferClient::new(id.clone(), peers.clone(), transport.clone(), PORT, 65_507);
            let router = MessageRouter::new(
                id.clone(),
                peers.clone(),
                catalog.clone(),
                assembler.clone(),
                client.clone(),
            );

            Self {
                id,
                ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)),
                peers,
                transport,
                catalog,
                assembler,
                client,
                router,
                dir,
            }
        }

        async fn share(&self, name: &str, content: &str) -> String {
            let source = self.dir.path().join(format!("source-{}", name));
            std::fs::create_dir_all(&source).unwrap();
            let path = source.join(name);
            std::fs::write(&path, content).unwrap();
            self.catalog.publish(&path).await.unwrap()
        }

        fn source(&self) -> SocketAddr {
            SocketAddr::new(self.ip, PORT)
        }

        fn downloaded(&self, name: &str) -> Option<String> {
            std::fs::read_to_string(self.catalog.files_dir().join(name)).ok()
        }
    }

    async fn introduce(nodes: &[&TestNode]) {
        for a in nodes {
            for b in nodes {
                if a.id != b.id {
                    a.peers.upsert(&b.id, b.ip).await;
                }
            }
        }
    }

    /// Delivers queued datagrams until every outbox is empty. `reverse`
    /// flips each batch to simulate reordering.
    async fn pump(nodes: &[&TestNode], reverse: bool) -> Vec<Result<Handled>> {
        let mut results = Vec::new();
        loop {
            let mut delivered = false;
            for sender in nodes {
                let mut batch = sender.transport.take();
                if reverse {
                    batch.reverse();
                }
                for (target, data) in batch {
                    delivered = true;
                    if let Some(receiver) = nodes.iter().find(|n| n.ip == target.ip()) {
                        assert_eq!(target.port(), PORT);
                        results.push(receiver.router.handle_datagram(&data, sender.source()).await);
                    }
                }
            }
            if !delivered {
                return results;
            }
        }
    }

    #[tokio::test]
    async fn test_three_block_download() {
        let holder = TestNode::new(1, 3).await;
        let fetcher = TestNode::new(2, 3).await;
        introduce(&[&holder, &fetcher]).await;

        let file_id = holder.share("notes.txt", "foobarbaz").await;
        assert_eq!(fetcher.client.request_fingerprint(&file_id).await.unwrap(), 1);

        let results = pump(&[&holder, &fetcher], false).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(results
            .iter()
            .any(|r| matches!(r, Ok(Handled::DownloadStarted { requests: 3 }))));
        assert_eq!(results.iter().filter(|r| matches!(r, Ok(Handled::BlockSent))).count(), 3);

        assert_eq!(fetcher.downloaded("notes.txt").as_deref(), Some("foobarbaz"));
        assert!(fetcher.assembler.lock().await.in_flight().is_empty());

        // the fetcher can now serve the file itself
        assert_eq!(
            fetcher.catalog.fingerprint(&file_id).await.unwrap().file_name,
            "notes.txt"
        );
    }

    #[tokio::test]
    async fn test_reordered_blocks_from_two_holders() {
        let first = TestNode::new(1, 4).await;
        let second = TestNode::new(2, 4).await;
        let fetcher = TestNode::new(3, 4).await;
        introduce(&[&first, &second, &fetcher]).await;

        let text = "the quick brown fox jumps over the lazy dog, ünïcödé included";
        let file_id = first.share("fox.txt", text).await;
        assert_eq!(second.share("fox.txt", text).await, file_id);

        fetcher.client.request_fingerprint(&file_id).await.unwrap();
        let results = pump(&[&first, &second, &fetcher], true).await;

        assert_eq!(
            results.iter().filter(|r| matches!(r, Ok(Handled::DownloadStarted { .. }))).count(),
            1
        );
        assert!(results
            .iter()
            .any(|r| matches!(r, Ok(Handled::AlreadyInFlight))));
        assert!(results.iter().any(|r| matches!(r, Ok(Handled::Completed(_)))));
        // second holder's copies of each block arrive after completion
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(P2PError::UnknownDownload(_)))));

        assert_eq!(fetcher.downloaded("fox.txt").as_deref(), Some(text));
    }

    #[tokio::test]
    async fn test_unknown_sender_gets_no_reply() {
        let holder = TestNode::new(1, 3).await;
        let stranger = TestNode::new(9, 3).await;
        let file_id = holder.share("notes.txt", "foobarbaz").await;

        let request = Message::request_block(&stranger.id, &file_id, 0).encode().unwrap();
        let result = holder.router.handle_datagram(&request, stranger.source()).await;

        assert!(matches!(result, Err(P2PError::UnknownSender(ref id)) if id == "node-9"));
        assert!(holder.transport.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_silent() {
        let holder = TestNode::new(1, 3).await;
        let fetcher = TestNode::new(2, 3).await;
        introduce(&[&holder, &fetcher]).await;

        let missing = HashUtils::hash_data(b"nobody has this");
        fetcher.client.request_fingerprint(&missing).await.unwrap();
        fetcher.client.request_block(&missing, 0).await.unwrap();

        let results = pump(&[&holder, &fetcher], false).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, Err(P2PError::FileNotFound(_)))));
        assert!(holder.transport.is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_type() {
        let holder = TestNode::new(1, 3).await;
        let fetcher = TestNode::new(2, 3).await;
        introduce(&[&holder, &fetcher]).await;

        let chat = br#"{"type":"chat","user_id":"node-2","text":"hi"}"#;
        assert!(matches!(
            holder.router.handle_datagram(chat, fetcher.source()).await,
            Err(P2PError::UnrecognizedMessage(ref kind)) if kind == "chat"
        ));
        assert!(matches!(
            holder.router.handle_datagram(b"{oops", fetcher.source()).await,
            Err(P2PError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_tampered_manifest_and_block_rejected() {
        let holder = TestNode::new(1, 3).await;
        let fetcher = TestNode::new(2, 3).await;
        introduce(&[&holder, &fetcher]).await;

        let manifest = FileManifest::new("notes.txt", 3, &[b"foo".to_vec(), b"bar".to_vec()]);
        let content = manifest.to_canonical().unwrap();
        let file_id = content_id(&content);

        let forged = Message::response_file_fingerprint(
            &holder.id,
            "notes.txt",
            &HashUtils::hash_data(b"other"),
            &content,
        );
        assert!(matches!(
            fetcher.router.handle_datagram(&forged.encode().unwrap(), holder.source()).await,
            Err(P2PError::ManifestMismatch(_))
        ));
        assert!(fetcher.transport.is_empty());

        let genuine = Message::response_file_fingerprint(&holder.id, "notes.txt", &file_id, &content);
        assert_eq!(
            fetcher
                .router
                .handle_datagram(&genuine.encode().unwrap(), holder.source())
                .await
                .unwrap(),
            Handled::DownloadStarted { requests: 2 }
        );

        let bad_block =
            Message::response_block(&holder.id, "notes.txt", &file_id, 1, b"BAR".to_vec()).unwrap();
        assert!(matches!(
            fetcher.router.handle_datagram(&bad_block.encode().unwrap(), holder.source()).await,
            Err(P2PError::BlockVerificationFailed { index: 1, .. })
        ));
        assert_eq!(fetcher.assembler.lock().await.progress(&file_id), Some((0, 2)));
    }

    #[tokio::test]
    async fn test_empty_file_completes_without_block_requests() {
        let holder = TestNode::new(1, 3).await;
        let fetcher = TestNode::new(2, 3).await;
        introduce(&[&holder, &fetcher]).await;

        let file_id = holder.share("empty.txt", "").await;
        fetcher.client.request_fingerprint(&file_id).await.unwrap();
        let results = pump(&[&holder, &fetcher], false).await;

        assert!(results.iter().any(|r| matches!(r, Ok(Handled::Completed(_)))));
        assert_eq!(fetcher.downloaded("empty.txt").as_deref(), Some(""));
        assert!(!results.iter().any(|r| matches!(r, Ok(Handled::BlockSent))));
    }

    async fn deliver(from: &TestNode, to: &TestNode) -> Vec<Result<Handled>> {
        let mut results = Vec::new();
        for (_, data) in from.transport.take() {
            results.push(to.router.handle_datagram(&data, from.source()).await);
        }
        results
    }

    #[tokio::test]
    async fn test_lost_block_stalls_download() {
        let holder = TestNode::new(1, 3).await;
        let fetcher = TestNode::new(2, 3).await;
        introduce(&[&holder, &fetcher]).await;

        let file_id = holder.share("notes.txt", "foobarbaz").await;
        fetcher.client.request_fingerprint(&file_id).await.unwrap();

        deliver(&fetcher, &holder).await;
        deliver(&holder, &fetcher).await;
        deliver(&fetcher, &holder).await;

        // lose the response for block 1
        for (_, data) in holder.transport.take() {
            if let Ok(Inbound::Known(Message::ResponseBlock { block_index: 1, .. })) =
                Message::decode(&data)
            {
                continue;
            }
            fetcher
                .router
                .handle_datagram(&data, holder.source())
                .await
                .unwrap();
        }

        assert_eq!(fetcher.assembler.lock().await.progress(&file_id), Some((2, 3)));
        assert_eq!(fetcher.downloaded("notes.txt"), None);
        assert!(fetcher.transport.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_many_blocks() {
        let holder = TestNode::new(1, 64).await;
        let fetcher = TestNode::new(2, 64).await;
        introduce(&[&holder, &fetcher]).await;

        let text: String = (0..400).map(|i| format!("line {} → ok\n", i)).collect();
        let file_id = holder.share("big.txt", &text).await;
        fetcher.client.request_fingerprint(&file_id).await.unwrap();
        pump(&[&holder, &fetcher], true).await;

        assert_eq!(fetcher.downloaded("big.txt").as_deref(), Some(text.as_str()));
    }
}
