use log::debug;
use std::collections::{BTreeMap, HashMap};

use crate::storage::FileManifest;
use crate::utils::{P2PError, Result};

/// Reassembly state for one file: its manifest and the blocks received so far.
#[derive(Debug, Clone)]
pub struct InFlightDownload {
    pub manifest: FileManifest,
    received: BTreeMap<usize, Vec<u8>>,
}

impl InFlightDownload {
    fn new(manifest: FileManifest) -> Self {
        Self {
            manifest,
            received: BTreeMap::new(),
        }
    }

    pub fn received(&self) -> usize {
        self.received.len()
    }

    pub fn total(&self) -> usize {
        self.manifest.number_of_blocks()
    }

    pub fn is_complete(&self) -> bool {
        self.received() == self.total()
    }

    pub fn missing(&self) -> Vec<usize> {
        (0..self.total())
            .filter(|index| !self.received.contains_key(index))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// Index already held; the first payload is kept.
    Duplicate,
}

/// In-flight downloads keyed by content identifier.
///
/// Blocks may arrive in any order and any number of times (every peer answers
/// every fan-out request). Order is rebuilt from the numeric index at
/// `materialize`, never from arrival order.
#[derive(Default)]
pub struct BlockAssembler {
    downloads: HashMap<String, InFlightDownload>,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `file_id`. Returns false when it is already in flight,
    /// in which case the existing progress is kept.
    pub fn begin(&mut self, file_id: &str, manifest: FileManifest) -> bool {
        if self.downloads.contains_key(file_id) {
            return false;
        }
        debug!(
            "Tracking download {} ({} blocks)",
            file_id,
            manifest.number_of_blocks()
        );
        self.downloads
            .insert(file_id.to_string(), InFlightDownload::new(manifest));
        true
    }

    pub fn record(&mut self, file_id: &str, index: usize, payload: Vec<u8>) -> Result<RecordOutcome> {
        let download = self
            .downloads
            .get_mut(file_id)
            .ok_or_else(|| P2PError::UnknownDownload(file_id.to_string()))?;

        if index >= download.total() {
            return Err(P2PError::InvalidBlockIndex {
                file_id: file_id.to_string(),
                index,
                total: download.total(),
            });
        }

        if download.received.contains_key(&index) {
            debug!("Duplicate block {} of {} ignored", index, file_id);
            return Ok(RecordOutcome::Duplicate);
        }

        download.received.insert(index, payload);
        debug!(
            "Block {} of {} recorded ({}/{})",
            index,
            file_id,
            download.received(),
            download.total()
        );
        Ok(RecordOutcome::Recorded)
    }

    pub fn is_complete(&self, file_id: &str) -> bool {
        self.downloads
            .get(file_id)
            .map(InFlightDownload::is_complete)
            .unwrap_or(false)
    }

    /// Concatenates every block in ascending index order.
    pub fn materialize(&self, file_id: &str) -> Result<Vec<u8>> {
        let download = self
            .downloads
            .get(file_id)
            .ok_or_else(|| P2PError::UnknownDownload(file_id.to_string()))?;

        if !download.is_complete() {
            let missing = download.missing();
            return Err(P2PError::BlockNotFound {
                file_id: file_id.to_string(),
                index: missing.first().copied().unwrap_or(0),
            });
        }

        let mut content = Vec::new();
        for block in download.received.values() {
            content.extend_from_slice(block);
        }
        Ok(content)
    }

    pub fn discard(&mut self, file_id: &str) -> Option<InFlightDownload> {
        self.downloads.remove(file_id)
    }

    pub fn manifest(&self, file_id: &str) -> Option<&FileManifest> {
        self.downloads.get(file_id).map(|d| &d.manifest)
    }

    /// (received, total) for an in-flight download.
    pub fn progress(&self, file_id: &str) -> Option<(usize, usize)> {
        self.downloads
            .get(file_id)
            .map(|d| (d.received(), d.total()))
    }

    pub fn in_flight(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.downloads.keys().cloned().collect();
        ids.sort();
        ids
    }
}
