use log::debug;
use std::ops::Range;
use std::path::Path;
use tokio::fs as async_fs;

use crate::storage::FileManifest;
use crate::utils::{P2PError, Result};

pub const DEFAULT_BLOCK_SIZE: usize = 16 * 1024;

/// Byte ranges of each block. Text payloads are cut on character boundaries
/// so every block survives the UTF-8 `block_data` field intact.
fn block_ranges(content: &[u8], block_size: usize) -> Vec<Range<usize>> {
    let text = std::str::from_utf8(content).ok();
    let mut ranges = Vec::new();
    let mut start = 0;

    while start < content.len() {
        let mut end = std::cmp::min(start + block_size, content.len());

        if let Some(text) = text {
            while end > start && !text.is_char_boundary(end) {
                end -= 1;
            }
            // block_size narrower than one character
            if end == start {
                end = start + 1;
                while !text.is_char_boundary(end) {
                    end += 1;
                }
            }
        }

        ranges.push(start..end);
        start = end;
    }

    ranges
}

fn check_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 {
        return Err(P2PError::ConfigError("block size must be positive".to_string()));
    }
    Ok(())
}

pub fn split_bytes(
    file_name: &str,
    content: &[u8],
    block_size: usize,
) -> Result<(FileManifest, Vec<Vec<u8>>)> {
    check_block_size(block_size)?;

    let blocks: Vec<Vec<u8>> = block_ranges(content, block_size)
        .into_iter()
        .map(|range| content[range].to_vec())
        .collect();
    let manifest = FileManifest::new(file_name, block_size, &blocks);

    debug!(
        "Split {} ({} bytes) into {} blocks of up to {} bytes",
        file_name,
        content.len(),
        blocks.len(),
        block_size
    );
    Ok((manifest, blocks))
}

pub async fn split_into_blocks(
    path: &Path,
    block_size: usize,
) -> Result<(FileManifest, Vec<Vec<u8>>)> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| P2PError::InvalidFileName(path.display().to_string()))?;

    let content = async_fs::read(path)
        .await
        .map_err(|e| P2PError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

    split_bytes(&file_name, &content, block_size)
}

/// Reads block `index` of the file at `path`, cut the same way `split_into_blocks` cuts it.
pub async fn read_block(path: &Path, index: usize, block_size: usize) -> Result<Vec<u8>> {
    check_block_size(block_size)?;

    let content = async_fs::read(path)
        .await
        .map_err(|e| P2PError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;

    block_ranges(&content, block_size)
        .get(index)
        .map(|range| content[range.clone()].to_vec())
        .ok_or_else(|| P2PError::BlockNotFound {
            file_id: path.display().to_string(),
            index,
        })
}
