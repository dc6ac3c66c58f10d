use crate::types::jid::{Jid, MessageId};

/// Delivery status of a stored message.
///
/// Transitions are driven by externally reported status codes and applied
/// last-write-wins; the network may report them out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MessageStatus::Pending),
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Sticker => "sticker",
        }
    }

    /// Rough content-type hint handed to the media uploader.
    pub fn content_type_hint(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/jpeg",
            MediaKind::Video => "video/mp4",
            MediaKind::Audio => "audio/ogg",
            MediaKind::Document => "application/octet-stream",
            MediaKind::Sticker => "image/webp",
        }
    }
}

/// Normalized content of an incoming message.
#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    Media {
        kind: MediaKind,
        caption: Option<String>,
    },
    /// A protocol signal recalling a previously sent message.
    Revoke { target_id: MessageId },
}

impl MessageContent {
    /// Plain text, or the caption extracted from a media payload.
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(body) => Some(body),
            MessageContent::Media { caption, .. } => caption.as_deref(),
            MessageContent::Revoke { .. } => None,
        }
    }

    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            MessageContent::Media { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Routing identifiers attached to a message by the network.
#[derive(Debug, Clone)]
pub struct MessageKey {
    pub id: MessageId,
    pub remote_jid: Jid,
    /// Alternate identifier for chats routed through the business-account
    /// scheme; preferred over `remote_jid` when present.
    pub remote_jid_alt: Option<Jid>,
    /// Sender phone-number identity, populated when the primary identifier
    /// is a hidden-user one.
    pub sender_pn: Option<Jid>,
    /// Sending participant inside a group chat.
    pub participant: Option<Jid>,
    pub from_me: bool,
}

impl MessageKey {
    /// The canonical routing identifier for an individual chat, preferring
    /// the explicit alternate/business identifier over the primary one.
    pub fn canonical_chat_jid(&self) -> &Jid {
        self.remote_jid_alt
            .as_ref()
            .or(self.sender_pn.as_ref())
            .unwrap_or(&self.remote_jid)
    }
}

/// A message as delivered by the connection, live or replayed.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub key: MessageKey,
    /// Sender's self-chosen profile name, when pushed with the message.
    pub push_name: Option<String>,
    /// Verified business display name, when the sender is a business account.
    pub verified_biz_name: Option<String>,
    /// Network-assigned unix seconds, not insertion time.
    pub timestamp: i64,
    pub content: MessageContent,
    /// Reply-to message id, when this message quotes another.
    pub quoted_message_id: Option<MessageId>,
}

/// Per-recipient receipt inside a group context.
#[derive(Debug, Clone)]
pub struct UserReceipt {
    pub user: Jid,
    pub status: MessageStatus,
    pub timestamp: i64,
}

/// Externally reported status change for an already-delivered message.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub message_id: MessageId,
    pub chat: Jid,
    pub status: Option<MessageStatus>,
    pub receipts: Vec<UserReceipt>,
}

/// A chat surfaced by a roster event or a history batch.
#[derive(Debug, Clone)]
pub struct ChatUpsert {
    pub jid: Jid,
    pub name: Option<String>,
    pub notify: Option<String>,
    pub verified_name: Option<String>,
}

/// Directory entry delivered alongside a history batch.
#[derive(Debug, Clone)]
pub struct Contact {
    pub jid: Jid,
    pub name: Option<String>,
    pub notify: Option<String>,
    pub verified_name: Option<String>,
}

/// Member of a group roster.
#[derive(Debug, Clone)]
pub struct Participant {
    pub jid: Jid,
    /// Phone-number identity when the roster entry routes through the
    /// hidden-user scheme.
    pub phone_number: Option<Jid>,
    pub name: Option<String>,
    pub verified_name: Option<String>,
}

impl Participant {
    /// Best-effort phone number for storage.
    pub fn number(&self) -> &str {
        self.phone_number
            .as_ref()
            .map(|j| j.phone_number())
            .unwrap_or_else(|| self.jid.phone_number())
    }
}

/// Group metadata fetched from the network on demand.
#[derive(Debug, Clone, Default)]
pub struct GroupInfo {
    pub subject: Option<String>,
    pub participants: Vec<Participant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [
            MessageStatus::Pending,
            MessageStatus::Sent,
            MessageStatus::Delivered,
            MessageStatus::Read,
            MessageStatus::Failed,
        ] {
            assert_eq!(MessageStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MessageStatus::parse("bogus"), None);
    }

    #[test]
    fn canonical_jid_prefers_alternate() {
        let key = MessageKey {
            id: "m1".into(),
            remote_jid: "111@lid".parse().unwrap(),
            remote_jid_alt: Some("201234@s.whatsapp.net".parse().unwrap()),
            sender_pn: None,
            participant: None,
            from_me: false,
        };
        assert_eq!(key.canonical_chat_jid().user, "201234");

        let key = MessageKey {
            remote_jid_alt: None,
            sender_pn: Some("209999@s.whatsapp.net".parse().unwrap()),
            ..key
        };
        assert_eq!(key.canonical_chat_jid().user, "209999");
    }

    #[test]
    fn media_caption_is_body() {
        let content = MessageContent::Media {
            kind: MediaKind::Image,
            caption: Some("look".into()),
        };
        assert_eq!(content.text(), Some("look"));
        assert_eq!(content.media_kind(), Some(MediaKind::Image));
    }
}
