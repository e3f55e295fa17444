use serde::{Deserialize, Serialize};

/// One normalized chat entry, ready for relay and speech playback.
///
/// Messages are immutable once extracted. A corrected or re-rendered entry
/// becomes a new logical message only if its `id` changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Unique identifier of the underlying chat entry. Taken from the
    /// entry's native `id` attribute or its `data-message-id` attribute
    /// when present; otherwise synthesized from author, content prefix,
    /// current time and a random suffix. Synthesized ids are NOT stable
    /// across two independent extractions of the same logical entry.
    pub id: String,

    /// Display name of the author
    pub author: String,

    /// Avatar URL, when the entry carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_photo: Option<String>,

    /// Message body. May contain inline `<img>` markup for embedded
    /// emoji and stickers.
    pub content: String,

    /// Display timestamp as rendered by the page, not necessarily sortable
    pub timestamp: String,

    /// Message subtype
    pub kind: MessageKind,

    /// Tag name of the originating entry node
    pub raw_type: String,
}

/// Subtype of a chat entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    /// Plain text message
    Text,
    /// Monetary (paid) message; content keeps amount and body together
    Paid,
    /// Monetary sticker
    PaidSticker,
    /// Membership announcement
    Membership,
    /// Anything else the page renders into the chat list
    Other,
}

/// Discriminant of a [`RelayEnvelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    #[serde(rename = "CHAT_MESSAGE")]
    ChatMessage,
    #[serde(rename = "CHAT_ERROR")]
    ChatError,
}

/// Wire envelope shared by every transport channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayEnvelope {
    pub fn message(message: ChatMessage) -> Self {
        Self {
            kind: EnvelopeKind::ChatMessage,
            data: Some(message),
            error: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::ChatError,
            data: None,
            error: Some(reason.into()),
        }
    }

    /// Id of the carried message, when this is a message envelope.
    pub fn message_id(&self) -> Option<&str> {
        self.data.as_ref().map(|message| message.id.as_str())
    }
}

/// Persisted single-slot snapshot of the latest relayed message, stored
/// under the `lastChatMessage` key. Last write wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,

    pub data: ChatMessage,

    /// Unix milliseconds at write time; polling consumers use this as
    /// their last-seen watermark
    pub timestamp: i64,
}

impl From<Snapshot> for RelayEnvelope {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            kind: snapshot.kind,
            data: Some(snapshot.data),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_message() -> ChatMessage {
        ChatMessage {
            id: "msg-1".to_string(),
            author: "Alice".to_string(),
            author_photo: None,
            content: "hello".to_string(),
            timestamp: "12:34 PM".to_string(),
            kind: MessageKind::Text,
            raw_type: "live-chat-text-message".to_string(),
        }
    }

    #[test]
    fn message_envelope_wire_shape() {
        let envelope = RelayEnvelope::message(test_message());
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["type"], "CHAT_MESSAGE");
        assert_eq!(json["data"]["author"], "Alice");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn error_envelope_wire_shape() {
        let envelope = RelayEnvelope::error("Chat is disabled");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["type"], "CHAT_ERROR");
        assert_eq!(json["error"], "Chat is disabled");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn envelope_round_trip() {
        let envelope = RelayEnvelope::message(test_message());
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: RelayEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, envelope);
        assert_eq!(parsed.message_id(), Some("msg-1"));
    }

    #[test]
    fn message_kind_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(MessageKind::PaidSticker).unwrap(),
            "paid-sticker"
        );
        assert_eq!(serde_json::to_value(MessageKind::Paid).unwrap(), "paid");
    }

    #[test]
    fn snapshot_converts_to_envelope() {
        let snapshot = Snapshot {
            kind: EnvelopeKind::ChatMessage,
            data: test_message(),
            timestamp: 1_700_000_000_000,
        };

        let envelope = RelayEnvelope::from(snapshot);
        assert_eq!(envelope.kind, EnvelopeKind::ChatMessage);
        assert_eq!(envelope.message_id(), Some("msg-1"));
    }
}
