use crate::types::jid::Jid;
use crate::types::message::{ChatUpsert, Contact, IncomingMessage, StatusUpdate};

/// Why a connection closed, as reported by the protocol layer.
///
/// Only `LoggedOut` is terminal for a session; every other reason is treated
/// as transient and answered with a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The user explicitly revoked this device. Terminal.
    LoggedOut,
    ConnectionClosed,
    ConnectionLost,
    TimedOut,
    /// Another client took over the stream.
    ConnectionReplaced,
    /// The server asked for a restart (e.g. after pairing).
    Restarting,
    Unknown,
}

impl DisconnectReason {
    pub fn is_logged_out(&self) -> bool {
        matches!(self, DisconnectReason::LoggedOut)
    }
}

/// Bulk replay of past chats/contacts/messages delivered after a connection
/// opens, used to backfill state missed while disconnected.
#[derive(Debug, Clone, Default)]
pub struct HistoryBatch {
    pub chats: Vec<ChatUpsert>,
    pub contacts: Vec<Contact>,
    pub messages: Vec<IncomingMessage>,
}

/// Events emitted by a live connection, consumed by one dispatcher per
/// session in delivery order.
#[derive(Debug, Clone)]
pub enum Event {
    /// A pairing QR payload was issued. Only meaningful while the session is
    /// not yet ready.
    Qr { payload: String },
    /// The connection opened and authenticated as `jid`.
    Connected { jid: Jid },
    Disconnected { reason: DisconnectReason },
    /// New messages, live (`live = true`) or replayed offline ones.
    Messages {
        messages: Vec<IncomingMessage>,
        live: bool,
    },
    StatusUpdates(Vec<StatusUpdate>),
    ChatsUpsert(Vec<ChatUpsert>),
    HistoryBatch(HistoryBatch),
}
