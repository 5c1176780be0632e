use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::validation::file_name_from_url;

/// Denormalized identity snapshot attached to a message.
///
/// This is a point-in-time copy from the wire, not a live reference; later
/// profile edits do not rewrite history. Every field is optional because the
/// backend omits whatever it does not know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub available_name: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl Sender {
    /// Display override first, plain name second.
    pub fn display_name(&self) -> Option<&str> {
        self.available_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.name.as_deref())
    }
}

/// One file or image bound to a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub file_type: String,
    /// Canonical resource location. Empty until the backend has finished
    /// post-processing the upload.
    #[serde(default)]
    pub data_url: String,
    #[serde(default)]
    pub thumb_url: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub extension: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.file_type == "image"
    }

    pub fn is_ready(&self) -> bool {
        !self.data_url.is_empty()
    }

    /// Filename derived from the decoded final path segment of `data_url`.
    pub fn file_name(&self) -> String {
        file_name_from_url(&self.data_url)
    }
}

/// Loosely-typed inbound wire payload. Anything may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub message_type: i64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_attributes: Option<Map<String, Value>>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub conversation_id: Option<i64>,
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

/// Canonical chat event. `created_at` (unix seconds) is the sole ordering
/// key; `id` is stable once the backend has persisted the message and absent
/// for not-yet-acknowledged sends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub content: String,
    /// `0` = sent by the visitor, anything else = agent/bot.
    #[serde(default)]
    pub message_type: i64,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub content_attributes: Map<String, Value>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub conversation_id: Option<i64>,
    #[serde(default)]
    pub sender: Sender,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Converts a wire payload into the canonical shape. Idempotent: a
    /// round-trip through `RawMessage` is a no-op.
    pub fn normalize(raw: RawMessage) -> Message {
        Message {
            // id 0 is a placeholder some backends emit before persisting
            id: raw.id.filter(|&id| id != 0),
            content: raw.content.unwrap_or_default(),
            message_type: raw.message_type,
            content_type: raw.content_type.unwrap_or_default(),
            content_attributes: raw.content_attributes.unwrap_or_default(),
            created_at: raw.created_at.unwrap_or_default(),
            conversation_id: raw.conversation_id,
            sender: raw.sender.unwrap_or_default(),
            attachments: raw.attachments.unwrap_or_default(),
        }
    }

    pub fn is_visitor(&self) -> bool {
        self.message_type == 0
    }

    /// Messages carrying `content_attributes.deleted = true` are suppressed
    /// from render but kept in the feed for dedup purposes.
    pub fn is_deleted(&self) -> bool {
        self.content_attributes.get("deleted") == Some(&Value::Bool(true))
    }

    pub fn all_attachments_ready(&self) -> bool {
        self.attachments.iter().all(Attachment::is_ready)
    }
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Self {
        Message::normalize(raw)
    }
}

impl From<Message> for RawMessage {
    fn from(msg: Message) -> Self {
        RawMessage {
            id: msg.id,
            content: Some(msg.content),
            message_type: msg.message_type,
            content_type: Some(msg.content_type),
            content_attributes: Some(msg.content_attributes),
            created_at: Some(msg.created_at),
            conversation_id: msg.conversation_id,
            sender: Some(msg.sender),
            attachments: Some(msg.attachments),
        }
    }
}
