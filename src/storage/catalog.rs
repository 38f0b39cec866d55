use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::core::config::MAX_DATAGRAM;
use crate::core::Message;
use crate::storage::manifest::content_id;
use crate::storage::{splitter, FileManifest, HashUtils};
use crate::utils::{P2PError, Result};

const MANIFEST_DIR: &str = "manifests";
const FILES_DIR: &str = "files";
const MANIFEST_EXT: &str = "json";

/// Manifest text as stored, plus the name of the payload it describes.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub file_name: String,
    pub content: String,
    pub manifest: FileManifest,
}

/// On-disk store of manifests (keyed by content identifier) and completed
/// files (keyed by file name) under one data directory.
pub struct FileCatalog {
    manifests_dir: PathBuf,
    files_dir: PathBuf,
    block_size: usize,
    max_datagram: usize,
}

impl FileCatalog {
    pub async fn open(data_dir: &Path, block_size: usize) -> Result<Self> {
        let manifests_dir = data_dir.join(MANIFEST_DIR);
        let files_dir = data_dir.join(FILES_DIR);

        for dir in [&manifests_dir, &files_dir] {
            async_fs::create_dir_all(dir)
                .await
                .map_err(|e| P2PError::IoError(format!("Failed to create directory: {}", e)))?;
        }

        info!("File catalog opened at {:?}", data_dir);
        Ok(Self {
            manifests_dir,
            files_dir,
            block_size,
            max_datagram: MAX_DATAGRAM,
        })
    }

    /// Bound applied by `publish` to the replies that will serve a file.
    pub fn with_max_datagram(mut self, max_datagram: usize) -> Self {
        self.max_datagram = max_datagram;
        self
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    fn manifest_path(&self, file_id: &str) -> Result<PathBuf> {
        if !HashUtils::is_content_id(file_id) {
            return Err(P2PError::FileNotFound(file_id.to_string()));
        }
        Ok(self
            .manifests_dir
            .join(format!("{}.{}", file_id.to_ascii_lowercase(), MANIFEST_EXT)))
    }

    /// Path of a completed file. Only the final path component of `file_name` is used.
    pub fn file_path(&self, file_name: &str) -> Result<PathBuf> {
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| P2PError::InvalidFileName(file_name.to_string()))?;
        Ok(self.files_dir.join(name))
    }

    /// Finds the manifest text hashing to `file_id`: the keyed entry first,
    /// then any other manifest in the store.
    async fn find_manifest(&self, file_id: &str) -> Result<Option<String>> {
        let keyed = self.manifest_path(file_id)?;
        if let Ok(content) = async_fs::read_to_string(&keyed).await {
            if content_id(&content).eq_ignore_ascii_case(file_id) {
                return Ok(Some(content));
            }
            warn!("Manifest {:?} does not match its key, ignoring", keyed);
        }

        let mut entries = async_fs::read_dir(&self.manifests_dir)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to read directory: {}", e)))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            if path == keyed || !path.is_file() {
                continue;
            }
            if let Ok(content) = async_fs::read_to_string(&path).await {
                if content_id(&content).eq_ignore_ascii_case(file_id) {
                    debug!("Manifest for {} found under {:?}", file_id, path);
                    return Ok(Some(content));
                }
            }
        }

        Ok(None)
    }

    /// Manifest for `file_id`, served only when the described payload is held locally.
    pub async fn fingerprint(&self, file_id: &str) -> Result<Fingerprint> {
        let content = self
            .find_manifest(file_id)
            .await?
            .ok_or_else(|| P2PError::FileNotFound(file_id.to_string()))?;
        let manifest = FileManifest::parse(&content)?;

        let payload = self.file_path(manifest.file_name())?;
        if !payload.is_file() {
            debug!("Manifest {} known but {:?} is missing", file_id, payload);
            return Err(P2PError::FileNotFound(file_id.to_string()));
        }

        Ok(Fingerprint {
            file_name: manifest.file_name().to_string(),
            content,
            manifest,
        })
    }

    /// Raw bytes of block `index` of the file named by `file_id`.
    pub async fn block(&self, file_id: &str, index: usize) -> Result<(String, Vec<u8>)> {
        let fingerprint = self.fingerprint(file_id).await?;
        let manifest = &fingerprint.manifest;

        if index >= manifest.number_of_blocks() {
            return Err(P2PError::BlockNotFound {
                file_id: file_id.to_string(),
                index,
            });
        }

        let path = self.file_path(manifest.file_name())?;
        let data = splitter::read_block(&path, index, manifest.header.block_size)
            .await
            .map_err(|e| match e {
                P2PError::BlockNotFound { .. } => P2PError::BlockNotFound {
                    file_id: file_id.to_string(),
                    index,
                },
                other => other,
            })?;

        Ok((fingerprint.file_name, data))
    }

    /// Persists a manifest received from a peer under its identifier.
    pub async fn store_manifest(&self, file_id: &str, content: &str) -> Result<FileManifest> {
        if !content_id(content).eq_ignore_ascii_case(file_id) {
            return Err(P2PError::ManifestMismatch(file_id.to_string()));
        }
        let manifest = FileManifest::parse(content)?;
        // validates the name before anything reaches disk
        self.file_path(manifest.file_name())?;

        let path = self.manifest_path(file_id)?;
        async_fs::write(&path, content)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to write manifest: {}", e)))?;

        debug!("Stored manifest {} for {}", file_id, manifest.file_name());
        Ok(manifest)
    }

    pub async fn store_file(&self, file_name: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.file_path(file_name)?;

        let mut file = async_fs::File::create(&path)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to create output file: {}", e)))?;
        file.write_all(data)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to write file: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to flush file: {}", e)))?;

        info!("File written: {:?} ({} bytes)", path, data.len());
        Ok(path)
    }

    /// Fails unless the fingerprint reply and every block reply for this file
    /// fit in one datagram. Peer ids are UUID strings, so a nil UUID stands in
    /// for the responder.
    fn check_servable(
        &self,
        file_id: &str,
        content: &str,
        manifest: &FileManifest,
        blocks: &[Vec<u8>],
    ) -> Result<()> {
        let responder = Uuid::nil().to_string();
        let file_name = manifest.file_name();

        Message::response_file_fingerprint(&responder, file_name, file_id, content)
            .encode_bounded(self.max_datagram)?;
        for (index, block) in blocks.iter().enumerate() {
            Message::response_block(&responder, file_name, file_id, index, block.clone())?
                .encode_bounded(self.max_datagram)?;
        }
        Ok(())
    }

    /// Shares a local file: copies it into the store, writes its manifest and
    /// returns the content identifier. Nothing is stored for a file that
    /// peers could not fetch.
    pub async fn publish(&self, source: &Path) -> Result<String> {
        let (manifest, blocks) = splitter::split_into_blocks(source, self.block_size).await?;
        let target = self.file_path(manifest.file_name())?;
        let content = manifest.to_canonical()?;
        let file_id = content_id(&content);

        if let Err(e) = self.check_servable(&file_id, &content, &manifest, &blocks) {
            warn!("Refusing to publish {:?}: {}", source, e);
            return Err(e);
        }

        if async_fs::canonicalize(source).await.ok() != async_fs::canonicalize(&target).await.ok() {
            self.store_file(manifest.file_name(), &blocks.concat()).await?;
        }

        async_fs::write(self.manifest_path(&file_id)?, &content)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to write manifest: {}", e)))?;

        info!(
            "Published {} as {} ({} blocks)",
            manifest.file_name(),
            file_id,
            manifest.number_of_blocks()
        );
        Ok(file_id)
    }

    /// All stored manifests that parse, by identifier.
    pub async fn list(&self) -> Result<Vec<(String, FileManifest)>> {
        let mut entries = async_fs::read_dir(&self.manifests_dir)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to read directory: {}", e)))?;

        let mut manifests = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            let Ok(content) = async_fs::read_to_string(&path).await else {
                continue;
            };
            match FileManifest::parse(&content) {
                Ok(manifest) => manifests.push((content_id(&content), manifest)),
                Err(e) => warn!("Skipping unreadable manifest {:?}: {}", path, e),
            }
        }

        manifests.sort_by(|a, b| a.1.file_name().cmp(b.1.file_name()));
        Ok(manifests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn catalog_with(content: &str, block_size: usize) -> (tempfile::TempDir, FileCatalog, String) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, content).unwrap();

        let catalog = FileCatalog::open(&dir.path().join("node"), block_size)
            .await
            .unwrap();
        let file_id = catalog.publish(&source).await.unwrap();
        (dir, catalog, file_id)
    }

    #[tokio::test]
    async fn test_publish_and_fingerprint() {
        let (_dir, catalog, file_id) = catalog_with("foobarbaz", 3).await;

        let fingerprint = catalog.fingerprint(&file_id).await.unwrap();
        assert_eq!(fingerprint.file_name, "notes.txt");
        assert_eq!(content_id(&fingerprint.content), file_id);
        assert_eq!(fingerprint.manifest.number_of_blocks(), 3);
    }

    #[tokio::test]
    async fn test_block_lookup() {
        let (_dir, catalog, file_id) = catalog_with("foobarbaz", 3).await;

        let (name, data) = catalog.block(&file_id, 1).await.unwrap();
        assert_eq!(name, "notes.txt");
        assert_eq!(data, b"bar");

        assert!(matches!(
            catalog.block(&file_id, 3).await,
            Err(P2PError::BlockNotFound { index: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_id_not_found() {
        let (_dir, catalog, _) = catalog_with("foobarbaz", 3).await;
        let missing = HashUtils::hash_data(b"nothing");

        assert!(matches!(
            catalog.fingerprint(&missing).await,
            Err(P2PError::FileNotFound(_))
        ));
        assert!(matches!(
            catalog.fingerprint("../secret").await,
            Err(P2PError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_manifest_without_payload_not_served() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path(), 3).await.unwrap();
        let manifest = FileManifest::new("absent.txt", 3, &[b"abc".to_vec()]);
        let content = manifest.to_canonical().unwrap();
        let file_id = content_id(&content);

        catalog.store_manifest(&file_id, &content).await.unwrap();
        assert!(matches!(
            catalog.fingerprint(&file_id).await,
            Err(P2PError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_manifest_rejects_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path(), 3).await.unwrap();
        let content = FileManifest::new("a.txt", 3, &[]).to_canonical().unwrap();
        let wrong_id = HashUtils::hash_data(b"other");

        assert!(matches!(
            catalog.store_manifest(&wrong_id, &content).await,
            Err(P2PError::ManifestMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_manifest_found_under_foreign_name() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path(), 3).await.unwrap();
        let content = FileManifest::new("x.txt", 3, &[b"xyz".to_vec()])
            .to_canonical()
            .unwrap();
        std::fs::write(dir.path().join("manifests").join("x.hackthehill"), &content).unwrap();
        catalog.store_file("x.txt", b"xyz").await.unwrap();

        let fingerprint = catalog.fingerprint(&content_id(&content)).await.unwrap();
        assert_eq!(fingerprint.file_name, "x.txt");
    }

    #[tokio::test]
    async fn test_store_file_strips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path(), 3).await.unwrap();

        let path = catalog.store_file("../../escape.txt", b"data").await.unwrap();
        assert_eq!(path, dir.path().join("files").join("escape.txt"));
        assert!(matches!(
            catalog.store_file("..", b"data").await,
            Err(P2PError::InvalidFileName(_))
        ));
    }

    async fn publish_raw(content: &[u8], block_size: usize) -> (tempfile::TempDir, FileCatalog, Result<String>) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("payload.txt");
        std::fs::write(&source, content).unwrap();

        let catalog = FileCatalog::open(&dir.path().join("node"), block_size)
            .await
            .unwrap();
        let published = catalog.publish(&source).await;
        (dir, catalog, published)
    }

    #[tokio::test]
    async fn test_publish_rejects_manifest_over_datagram() {
        // 1000 digests do not fit in one fingerprint reply
        let (_dir, catalog, published) = publish_raw(&[b'a'; 64_000], 64).await;

        assert!(matches!(published, Err(P2PError::MessageTooLarge(_))));
        assert!(catalog.list().await.unwrap().is_empty());
        assert!(!catalog.files_dir().join("payload.txt").exists());
    }

    #[tokio::test]
    async fn test_publish_rejects_block_that_escapes_past_datagram() {
        // each U+0001 is written as a six-byte \u0001 escape
        let text = "\u{1}".repeat(crate::storage::DEFAULT_BLOCK_SIZE);
        let (_dir, catalog, published) =
            publish_raw(text.as_bytes(), crate::storage::DEFAULT_BLOCK_SIZE).await;

        assert!(matches!(published, Err(P2PError::MessageTooLarge(_))));
        assert!(catalog.list().await.unwrap().is_empty());
        assert!(!catalog.files_dir().join("payload.txt").exists());
    }

    #[tokio::test]
    async fn test_publish_rejects_binary_payload() {
        let (_dir, catalog, published) = publish_raw(&[0xff, 0xfe, 0x00, 0x01], 16).await;

        assert!(matches!(published, Err(P2PError::NotUtf8 { index: 0, .. })));
        assert!(catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_smaller_datagram_bound_applies() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, "foobarbaz").unwrap();

        let catalog = FileCatalog::open(&dir.path().join("node"), 3)
            .await
            .unwrap()
            .with_max_datagram(128);
        assert!(matches!(
            catalog.publish(&source).await,
            Err(P2PError::MessageTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_list() {
        let (_dir, catalog, file_id) = catalog_with("hello", 2).await;
        let listed = catalog.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, file_id);
        assert_eq!(listed[0].1.file_name(), "notes.txt");
    }
}
