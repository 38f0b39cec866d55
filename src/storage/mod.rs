pub mod catalog;
pub mod hash;
pub mod manifest;
pub mod splitter;

pub use catalog::{FileCatalog, Fingerprint};
pub use hash::HashUtils;
pub use manifest::{content_id, FileManifest, ManifestHeader};
pub use splitter::{read_block, split_into_blocks, DEFAULT_BLOCK_SIZE};
