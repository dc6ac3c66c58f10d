//! The black-box protocol connection.
//!
//! Handshake, encryption and the wire format all live behind these traits;
//! the supervisor only sees the event stream and a handful of authenticated
//! calls on the live connection.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::store::credentials::CredentialStore;
use crate::store::models::SessionId;
use crate::types::events::Event;
use crate::types::jid::{Jid, MessageId};
use crate::types::message::GroupInfo;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("request timed out")]
    Timeout,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Identity lookup answer for a raw or hidden-user identifier.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub exists: bool,
    /// The canonical routing identifier the network wants messages sent to.
    pub jid: Jid,
    /// Profile name learned during the lookup, when the directory has one.
    pub notify: Option<String>,
}

/// Raw media bytes fetched from the network for one message.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// A live, authenticated connection handle. Cheap to clone behind an `Arc`;
/// exclusively owned by one session worker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a text message and returns the network-assigned message id.
    async fn send_text(&self, to: &Jid, body: &str) -> Result<MessageId, TransportError>;

    /// Lightweight authenticated round-trip proving the application-layer
    /// session is alive, not just the socket.
    async fn probe(&self) -> Result<(), TransportError>;

    /// Directory lookup mapping a raw/business identifier to its canonical
    /// routing identity.
    async fn resolve_identity(&self, jid: &Jid) -> Result<ResolvedIdentity, TransportError>;

    async fn group_roster(&self, group: &Jid) -> Result<GroupInfo, TransportError>;

    /// Downloads the binary payload referenced by a media message.
    async fn fetch_media(&self, message_id: &str) -> Result<MediaPayload, TransportError>;

    async fn send_read_receipt(
        &self,
        chat: &Jid,
        message_ids: &[MessageId],
    ) -> Result<(), TransportError>;

    async fn disconnect(&self);
}

/// Opens one connection per session, loading and saving the opaque
/// credential blob through the store it is handed.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(
        &self,
        session_id: SessionId,
        credentials: Arc<dyn CredentialStore>,
        fresh_history: bool,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<Event>), TransportError>;
}
