use sha2::{Digest, Sha256};

pub struct HashUtils;

impl HashUtils {
    /// Lowercase hex SHA-256, the form used for content identifiers and block digests.
    pub fn hash_data(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    pub fn verify_data(data: &[u8], expected_hash: &str) -> bool {
        Self::hash_data(data).eq_ignore_ascii_case(expected_hash)
    }

    /// True for a 64-character hex string.
    pub fn is_content_id(candidate: &str) -> bool {
        candidate.len() == 64 && candidate.chars().all(|c| c.is_ascii_hexdigit())
    }
}
