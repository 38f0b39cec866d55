use thiserror::Error;

pub type Result<T> = std::result::Result<T, P2PError>;

#[derive(Error, Debug)]
pub enum P2PError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Undecodable datagram: {0}")]
    Decode(String),

    #[error("Sender {0} has not been discovered")]
    UnknownSender(String),

    #[error("Unrecognized message type: {0}")]
    UnrecognizedMessage(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Block {index} of {file_id} not found")]
    BlockNotFound { file_id: String, index: usize },

    #[error("Manifest content does not hash to {0}")]
    ManifestMismatch(String),

    #[error("Block {index} of {file_id} failed verification")]
    BlockVerificationFailed { file_id: String, index: usize },

    #[error("Block index {index} out of range for {file_id} ({total} blocks)")]
    InvalidBlockIndex {
        file_id: String,
        index: usize,
        total: usize,
    },

    #[error("No download in flight for {0}")]
    UnknownDownload(String),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Block {index} of {file_id} is not valid UTF-8")]
    NotUtf8 { file_id: String, index: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for P2PError {
    fn from(err: std::io::Error) -> Self {
        P2PError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for P2PError {
    fn from(err: serde_json::Error) -> Self {
        P2PError::SerializationError(err.to_string())
    }
}
