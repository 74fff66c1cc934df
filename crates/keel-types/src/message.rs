//! Conversation message and attachment types.

use crate::bytes::estimate_bytes;
use serde::{Deserialize, Serialize};

/// Role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A single message in a conversation.
///
/// The persistence core only looks inside a message to size it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentPayload>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Attach an encoded payload to this message.
    pub fn with_attachment(mut self, attachment: AttachmentPayload) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Bytes this message occupies in storage: UTF-8 text length plus the
    /// decoded size of every attachment.
    pub fn byte_size(&self) -> u64 {
        let attachments: u64 = self.attachments.iter().map(|a| a.decoded_len()).sum();
        self.text.len() as u64 + attachments
    }
}

/// A self-describing encoded blob: MIME type plus standard base64 data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentPayload {
    pub mime_type: String,
    pub data: String,
}

impl AttachmentPayload {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Parse a `data:<mime>;base64,<payload>` URL.
    ///
    /// Returns `None` for URLs that are not base64 data URLs.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (header, data) = rest.split_once(',')?;
        let mime_type = header.strip_suffix(";base64")?;
        if mime_type.is_empty() {
            return None;
        }
        Some(Self::new(mime_type, data))
    }

    /// Render this payload back into a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Decoded byte length, computed from the encoded length alone.
    pub fn decoded_len(&self) -> u64 {
        estimate_bytes(&self.data)
    }

    /// Whether the MIME type names an image.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}
