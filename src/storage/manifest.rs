use serde::{Deserialize, Serialize};

use crate::storage::HashUtils;
use crate::utils::{P2PError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestHeader {
    pub file_name: String,
    pub number_of_blocks: usize,
    #[serde(default)]
    pub block_size: usize,
    #[serde(default)]
    pub file_size: u64,
}

/// Description of a shared file. Its content identifier is the SHA-256 of the
/// serialized text, so a manifest is never edited once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub header: ManifestHeader,
    /// Per-block SHA-256, by index. May be empty for manifests produced elsewhere.
    #[serde(default)]
    pub blocks: Vec<String>,
}

impl FileManifest {
    pub fn new(file_name: impl Into<String>, block_size: usize, blocks: &[Vec<u8>]) -> Self {
        let file_size = blocks.iter().map(|b| b.len() as u64).sum();

        Self {
            header: ManifestHeader {
                file_name: file_name.into(),
                number_of_blocks: blocks.len(),
                block_size,
                file_size,
            },
            blocks: blocks.iter().map(|b| HashUtils::hash_data(b)).collect(),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let manifest: FileManifest = serde_json::from_str(content)?;

        if !manifest.blocks.is_empty() && manifest.blocks.len() != manifest.number_of_blocks() {
            return Err(P2PError::SerializationError(format!(
                "manifest lists {} digests for {} blocks",
                manifest.blocks.len(),
                manifest.number_of_blocks()
            )));
        }

        Ok(manifest)
    }

    /// Canonical text form. Field order is fixed by the struct layout.
    pub fn to_canonical(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn content_id(&self) -> Result<String> {
        Ok(content_id(&self.to_canonical()?))
    }

    pub fn file_name(&self) -> &str {
        &self.header.file_name
    }

    pub fn number_of_blocks(&self) -> usize {
        self.header.number_of_blocks
    }

    pub fn block_digest(&self, index: usize) -> Option<&str> {
        self.blocks.get(index).map(String::as_str)
    }

    /// Checks a block payload against the manifest digest. Manifests without
    /// digests accept any payload.
    pub fn verify_block(&self, index: usize, payload: &[u8]) -> bool {
        match self.block_digest(index) {
            Some(expected) => HashUtils::verify_data(payload, expected),
            None => self.blocks.is_empty(),
        }
    }
}

/// Content identifier of a manifest's serialized text, computed over the
/// exact bytes given.
pub fn content_id(serialized: &str) -> String {
    HashUtils::hash_data(serialized.as_bytes())
}
