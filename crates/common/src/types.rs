use serde::{Deserialize, Serialize};

/// Kind of conversation a message came from or an endpoint resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Dm,
    Group,
    Channel,
}

impl std::fmt::Display for ChatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dm => write!(f, "dm"),
            Self::Group => write!(f, "group"),
            Self::Channel => write!(f, "channel"),
        }
    }
}

/// An uploaded file attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Platform file handle used to download the content.
    pub file_id: String,
    /// Original filename as uploaded by the sender.
    pub file_name: Option<String>,
}

/// Payload of an inbound message: a document XOR plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundBody {
    Text { text: String },
    Document { document: DocumentRef },
    /// Stickers, photos and anything else without usable text.
    Other,
}

/// One message delivered by the transport to a running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub sender_id: Option<u64>,
    pub body: InboundBody,
}

impl InboundMessage {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            sender_id: None,
            body: InboundBody::Text { text: text.into() },
        }
    }

    pub fn document(chat_id: i64, file_id: impl Into<String>, file_name: Option<&str>) -> Self {
        Self {
            chat_id,
            sender_id: None,
            body: InboundBody::Document {
                document: DocumentRef {
                    file_id: file_id.into(),
                    file_name: file_name.map(String::from),
                },
            },
        }
    }

    /// Plain text of the message, if it has any.
    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            InboundBody::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Handle to a message the bot sent, so it can be edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i32,
}
