use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::{P2PError, Result};

/// Wire messages. Every datagram is one flat JSON object tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    // Discovery channel
    Announce {
        user_id: String,
    },

    // Transfer channel
    RequestFileFingerprint {
        user_id: String,
        file_id: String,
    },
    ResponseFileFingerprint {
        user_id: String,
        file_name: String,
        file_id: String,
        content: String,
    },
    RequestBlock {
        user_id: String,
        file_id: String,
        block_index: usize,
    },
    ResponseBlock {
        user_id: String,
        file_name: String,
        file_id: String,
        block_index: usize,
        block_data: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Announce,
    RequestFileFingerprint,
    ResponseFileFingerprint,
    RequestBlock,
    ResponseBlock,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Announce => "announce",
            MessageType::RequestFileFingerprint => "request_file_fingerprint",
            MessageType::ResponseFileFingerprint => "response_file_fingerprint",
            MessageType::RequestBlock => "request_block",
            MessageType::ResponseBlock => "response_block",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "announce" => Some(MessageType::Announce),
            "request_file_fingerprint" => Some(MessageType::RequestFileFingerprint),
            "response_file_fingerprint" => Some(MessageType::ResponseFileFingerprint),
            "request_block" => Some(MessageType::RequestBlock),
            "response_block" => Some(MessageType::ResponseBlock),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields every datagram must carry, read before the full decode so an
/// unknown `type` can still be attributed to a sender.
#[derive(Deserialize)]
struct Header {
    #[serde(rename = "type")]
    kind: String,
    user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Known(Message),
    Unrecognized { user_id: String, kind: String },
}

impl Inbound {
    pub fn user_id(&self) -> &str {
        match self {
            Inbound::Known(message) => message.user_id(),
            Inbound::Unrecognized { user_id, .. } => user_id,
        }
    }
}

impl Message {
    pub fn announce(user_id: &str) -> Self {
        Message::Announce {
            user_id: user_id.to_string(),
        }
    }

    pub fn request_file_fingerprint(user_id: &str, file_id: &str) -> Self {
        Message::RequestFileFingerprint {
            user_id: user_id.to_string(),
            file_id: file_id.to_string(),
        }
    }

    pub fn response_file_fingerprint(
        user_id: &str,
        file_name: &str,
        file_id: &str,
        content: &str,
    ) -> Self {
        Message::ResponseFileFingerprint {
            user_id: user_id.to_string(),
            file_name: file_name.to_string(),
            file_id: file_id.to_string(),
            content: content.to_string(),
        }
    }

    pub fn request_block(user_id: &str, file_id: &str, block_index: usize) -> Self {
        Message::RequestBlock {
            user_id: user_id.to_string(),
            file_id: file_id.to_string(),
            block_index,
        }
    }

    /// Fails with `NotUtf8` when the block cannot travel as `block_data` text.
    pub fn response_block(
        user_id: &str,
        file_name: &str,
        file_id: &str,
        block_index: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        let block_data = String::from_utf8(data).map_err(|_| P2PError::NotUtf8 {
            file_id: file_id.to_string(),
            index: block_index,
        })?;

        Ok(Message::ResponseBlock {
            user_id: user_id.to_string(),
            file_name: file_name.to_string(),
            file_id: file_id.to_string(),
            block_index,
            block_data,
        })
    }

    pub fn user_id(&self) -> &str {
        match self {
            Message::Announce { user_id }
            | Message::RequestFileFingerprint { user_id, .. }
            | Message::ResponseFileFingerprint { user_id, .. }
            | Message::RequestBlock { user_id, .. }
            | Message::ResponseBlock { user_id, .. } => user_id,
        }
    }

    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Announce { .. } => MessageType::Announce,
            Message::RequestFileFingerprint { .. } => MessageType::RequestFileFingerprint,
            Message::ResponseFileFingerprint { .. } => MessageType::ResponseFileFingerprint,
            Message::RequestBlock { .. } => MessageType::RequestBlock,
            Message::ResponseBlock { .. } => MessageType::ResponseBlock,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| P2PError::SerializationError(e.to_string()))
    }

    /// Encodes and enforces the transport's datagram bound; oversized
    /// messages are never fragmented.
    pub fn encode_bounded(&self, max_datagram: usize) -> Result<Vec<u8>> {
        let data = self.encode()?;
        if data.len() > max_datagram {
            return Err(P2PError::MessageTooLarge(data.len()));
        }
        Ok(data)
    }

    pub fn decode(data: &[u8]) -> Result<Inbound> {
        let header: Header =
            serde_json::from_slice(data).map_err(|e| P2PError::Decode(e.to_string()))?;

        if MessageType::from_tag(&header.kind).is_none() {
            return Ok(Inbound::Unrecognized {
                user_id: header.user_id,
                kind: header.kind,
            });
        }

        let message: Message =
            serde_json::from_slice(data).map_err(|e| P2PError::Decode(e.to_string()))?;
        Ok(Inbound::Known(message))
    }
}
