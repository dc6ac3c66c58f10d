//! The ingestion pipeline: one per session worker.
//!
//! Every message event, regardless of source (live delivery, offline
//! replay, history batch), flows through the same path: derive the
//! canonical chat key, ensure the chat row exists, normalize the message,
//! insert idempotently, then advance the chat's last-message pointer.
//! Per-record failures are logged and dropped at that granularity; one
//! malformed message must never halt the stream.

use log::{debug, info, warn};
use std::sync::Arc;

use crate::config::Config;
use crate::directory::composite_chat_id;
use crate::resolver::{self, NameSources};
use crate::store::Database;
use crate::store::error::{Result, StoreError};
use crate::store::models::{NewChat, NewMessage, SessionId};
use crate::transport::Transport;
use crate::types::events::Event;
use crate::types::jid::Jid;
use crate::types::message::{
    ChatUpsert, Contact, GroupInfo, IncomingMessage, MediaKind, MessageContent, MessageStatus,
    StatusUpdate,
};
use crate::upload::{MediaUploader, history_media_placeholder};

pub struct Ingestor {
    session_id: SessionId,
    db: Arc<Database>,
    transport: Arc<dyn Transport>,
    uploader: Arc<dyn MediaUploader>,
    config: Config,
}

impl Ingestor {
    pub fn new(
        session_id: SessionId,
        db: Arc<Database>,
        transport: Arc<dyn Transport>,
        uploader: Arc<dyn MediaUploader>,
        config: Config,
    ) -> Self {
        Self {
            session_id,
            db,
            transport,
            uploader,
            config,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn history_log_every(&self) -> usize {
        self.config.history_log_every.max(1)
    }

    pub async fn handle_event(&self, event: Event) {
        match event {
            Event::Messages { messages, live } => self.handle_messages(messages, live).await,
            Event::StatusUpdates(updates) => self.handle_status_updates(updates).await,
            Event::ChatsUpsert(chats) => self.handle_chats_upsert(&chats, &[]).await,
            Event::HistoryBatch(batch) => self.handle_history_batch(batch).await,
            // Connection lifecycle events are consumed by the supervisor
            // before dispatch reaches the pipeline.
            Event::Qr { .. } | Event::Connected { .. } | Event::Disconnected { .. } => {}
        }
    }

    pub async fn handle_messages(&self, messages: Vec<IncomingMessage>, live: bool) {
        for message in messages {
            // Revokes bypass normal insertion entirely.
            if let MessageContent::Revoke { target_id } = &message.content {
                self.handle_revoke(target_id).await;
                continue;
            }

            if let Err(e) = self.ingest_message(&message, live, &[]).await {
                warn!(
                    target: "Ingest",
                    "Failed to store message {}: {e}",
                    message.key.id
                );
            }
        }
    }

    pub(crate) async fn handle_revoke(&self, target_id: &str) {
        match self.db.delete_message(target_id).await {
            Ok(true) => info!(target: "Ingest", "Deleted revoked message {target_id}"),
            // Revoking something never stored is a no-op, not an error.
            Ok(false) => debug!(target: "Ingest", "Revoke for unknown message {target_id}, ignoring"),
            Err(e) => warn!(target: "Ingest", "Failed to delete revoked message {target_id}: {e}"),
        }
    }

    /// Drives one message through chat-ensure → normalize → insert →
    /// last-message update. Returns whether a new row was written.
    pub async fn ingest_message(
        &self,
        message: &IncomingMessage,
        live: bool,
        contacts: &[Contact],
    ) -> Result<bool> {
        let chat_jid = self.chat_jid_for(message);
        let chat_id = composite_chat_id(&chat_jid, self.session_id);

        self.ensure_chat_exists(&chat_jid, message, contacts).await?;

        let Some(new_message) = self
            .normalize_message(&chat_jid, &chat_id, message, live, contacts)
            .await?
        else {
            return Ok(false);
        };

        let inserted = self.db.insert_message(&new_message).await?;

        // The pointer only moves forward, so replaying this on a duplicate
        // or out-of-order message is harmless.
        self.db
            .update_chat_last_message(&chat_id, &new_message.id, new_message.timestamp)
            .await?;

        if inserted && live && !message.key.from_me {
            self.schedule_read_receipt(chat_jid, message.key.id.clone());
        }

        Ok(inserted)
    }

    /// The chat a message belongs to. Individual chats prefer the explicit
    /// alternate/business identifier over the primary routing id.
    fn chat_jid_for(&self, message: &IncomingMessage) -> Jid {
        if message.key.remote_jid.is_group() {
            message.key.remote_jid.clone()
        } else {
            message.key.canonical_chat_jid().clone()
        }
    }

    /// Creates or refreshes the owning chat row with the best display name
    /// currently available.
    async fn ensure_chat_exists(
        &self,
        chat_jid: &Jid,
        message: &IncomingMessage,
        contacts: &[Contact],
    ) -> Result<()> {
        let (name, numbers) = if chat_jid.is_group() {
            match self.transport.group_roster(chat_jid).await {
                Ok(info) => {
                    let numbers = self.roster_numbers(&info);
                    (info.subject.unwrap_or_else(|| "Group Chat".to_string()), numbers)
                }
                Err(e) => {
                    debug!(
                        target: "Ingest",
                        "Could not fetch roster for {chat_jid}, using basic info: {e}"
                    );
                    (
                        "Group Chat".to_string(),
                        vec![chat_jid.phone_number().to_string()],
                    )
                }
            }
        } else {
            let number = chat_jid.phone_number().to_string();
            let name = if message.key.from_me {
                self.outgoing_chat_name(chat_jid, &number).await
            } else {
                resolver::resolve_display_name(
                    NameSources {
                        push_name: message.push_name.as_deref(),
                        verified_name: message.verified_biz_name.as_deref(),
                        contact: resolver::find_contact(contacts, chat_jid),
                    },
                    &number,
                )
            };
            (name, vec![number])
        };

        let chat = NewChat {
            id: composite_chat_id(chat_jid, self.session_id),
            session_id: self.session_id,
            name: Some(name),
            phone_numbers: serde_json::to_string(&numbers)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            is_group: chat_jid.is_group(),
        };

        self.db.upsert_chat(&chat).await
    }

    /// Recipient name for a chat created by one of our own messages: try the
    /// directory, then a name we already stored, then the raw number.
    async fn outgoing_chat_name(&self, chat_jid: &Jid, number: &str) -> String {
        if let Ok(identity) = self.transport.resolve_identity(chat_jid).await
            && let Some(notify) = identity.notify.filter(|n| !n.trim().is_empty())
        {
            return notify;
        }

        if let Ok(Some(existing)) = self
            .db
            .get_chat(&composite_chat_id(chat_jid, self.session_id))
            .await
            && let Some(name) = existing.name.filter(|n| n != number)
        {
            return name;
        }

        number.to_string()
    }

    fn roster_numbers(&self, info: &GroupInfo) -> Vec<String> {
        // The stored column is width-bounded, so only a prefix of the roster
        // is kept.
        info.participants
            .iter()
            .take(self.config.max_stored_participants)
            .map(|p| p.number().to_string())
            .collect()
    }

    /// Builds the storable row, or `None` when the message carries neither
    /// text nor media worth recording.
    async fn normalize_message(
        &self,
        chat_jid: &Jid,
        chat_id: &str,
        message: &IncomingMessage,
        live: bool,
        contacts: &[Contact],
    ) -> Result<Option<NewMessage>> {
        let body = message.content.text().map(str::to_string);
        let media_kind = message.content.media_kind();

        if body.as_deref().is_none_or(str::is_empty) && media_kind.is_none() {
            return Ok(None);
        }

        let (from_number, sender_name) = self.resolve_sender(chat_jid, message, contacts).await;

        let media_url = match media_kind {
            Some(kind) if live => self.upload_media(&message.key.id, kind).await,
            // Bulk history skips the upload to avoid stalling the pipeline
            // on network calls; the placeholder marks it fetchable later.
            Some(kind) => Some(history_media_placeholder(kind)),
            None => None,
        };

        let status = if message.key.from_me {
            MessageStatus::Sent
        } else {
            MessageStatus::Delivered
        };

        Ok(Some(NewMessage {
            id: message.key.id.clone(),
            chat_id: chat_id.to_string(),
            session_id: self.session_id,
            sender_id: from_number.clone(),
            from_number,
            sender_name,
            body: body.filter(|b| !b.is_empty()),
            timestamp: message.timestamp,
            from_me: message.key.from_me,
            has_media: media_kind.is_some(),
            media_type: media_kind.map(|k| k.as_str().to_string()),
            media_url,
            parent_id: message.quoted_message_id.clone(),
            status: status.as_str().to_string(),
        }))
    }

    async fn resolve_sender(
        &self,
        chat_jid: &Jid,
        message: &IncomingMessage,
        contacts: &[Contact],
    ) -> (String, String) {
        if chat_jid.is_group() {
            let Some(participant) = &message.key.participant else {
                let number = chat_jid.phone_number().to_string();
                return (number.clone(), message.push_name.clone().unwrap_or(number));
            };

            let (number, roster_name) = match self.transport.group_roster(chat_jid).await {
                Ok(info) => {
                    let entry = info
                        .participants
                        .iter()
                        .find(|p| p.jid.user == participant.user);
                    match entry {
                        Some(p) => (
                            p.number().to_string(),
                            p.name.clone().or_else(|| p.verified_name.clone()),
                        ),
                        None => (participant.phone_number().to_string(), None),
                    }
                }
                Err(_) => (participant.phone_number().to_string(), None),
            };

            let name = roster_name
                .filter(|n| !n.trim().is_empty())
                .or_else(|| message.push_name.clone())
                .or_else(|| {
                    resolver::find_contact(contacts, participant)
                        .and_then(resolver::contact_display_name)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| number.clone());

            (number, name)
        } else if message.key.from_me {
            let number = self
                .db
                .session_phone(self.session_id)
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| "unknown".to_string());
            let name = message
                .push_name
                .clone()
                .unwrap_or_else(|| "You".to_string());
            (number, name)
        } else {
            let number = chat_jid.phone_number().to_string();
            let name = resolver::resolve_display_name(
                NameSources {
                    push_name: message.push_name.as_deref(),
                    verified_name: message.verified_biz_name.as_deref(),
                    contact: resolver::find_contact(contacts, chat_jid),
                },
                &number,
            );
            (number, name)
        }
    }

    /// Downloads and uploads a live media payload. Failure stores the
    /// message without a media URL rather than dropping it.
    async fn upload_media(&self, message_id: &str, kind: MediaKind) -> Option<String> {
        let payload = match self.transport.fetch_media(message_id).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "Ingest", "Failed to download media for {message_id}: {e}");
                return None;
            }
        };

        let hint = if payload.content_type.is_empty() {
            kind.content_type_hint().to_string()
        } else {
            payload.content_type
        };

        match self.uploader.upload(payload.data, &hint).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(target: "Ingest", "Media upload failed for {message_id}: {e}");
                None
            }
        }
    }

    /// Sends the auto read receipt after a deliberate delay, keeping the
    /// send rate low. Best effort; failure only logs.
    fn schedule_read_receipt(&self, chat: Jid, message_id: String) {
        let transport = self.transport.clone();
        let delay = self.config.read_receipt_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = transport.send_read_receipt(&chat, &[message_id.clone()]).await {
                debug!(target: "Ingest", "Failed to send read receipt for {message_id}: {e}");
            }
        });
    }

    pub async fn handle_status_updates(&self, updates: Vec<StatusUpdate>) {
        for update in updates {
            if let Some(status) = update.status {
                match self
                    .db
                    .update_message_status(&update.message_id, status)
                    .await
                {
                    Ok(true) => debug!(
                        target: "Ingest",
                        "Message {} status -> {}",
                        update.message_id,
                        status.as_str()
                    ),
                    // A status race beat the insert, or the message was never
                    // ours. Never create a placeholder row for it.
                    Ok(false) => debug!(
                        target: "Ingest",
                        "Status update for unknown message {}, dropped",
                        update.message_id
                    ),
                    Err(e) => warn!(
                        target: "Ingest",
                        "Failed to update status for {}: {e}",
                        update.message_id
                    ),
                }
            }

            for receipt in &update.receipts {
                debug!(
                    target: "Ingest",
                    "Receipt in {}: {} -> {} at {}",
                    update.chat,
                    receipt.user.phone_number(),
                    receipt.status.as_str(),
                    receipt.timestamp
                );
            }
        }
    }

    pub async fn handle_chats_upsert(&self, chats: &[ChatUpsert], contacts: &[Contact]) {
        for chat in chats {
            if let Err(e) = self.upsert_roster_chat(chat, contacts).await {
                warn!(target: "Ingest", "Failed to store chat {}: {e}", chat.jid);
            }
        }
    }

    async fn upsert_roster_chat(&self, chat: &ChatUpsert, contacts: &[Contact]) -> Result<()> {
        let (name, numbers) = if chat.jid.is_group() {
            match self.transport.group_roster(&chat.jid).await {
                Ok(info) => {
                    let numbers = self.roster_numbers(&info);
                    let name = chat
                        .name
                        .clone()
                        .or(info.subject)
                        .unwrap_or_else(|| "Unknown Group".to_string());
                    (name, numbers)
                }
                Err(e) => {
                    debug!(target: "Ingest", "Could not fetch roster for {}: {e}", chat.jid);
                    (
                        chat.name.clone().unwrap_or_else(|| "Unknown Group".to_string()),
                        vec![chat.jid.phone_number().to_string()],
                    )
                }
            }
        } else {
            let number = chat.jid.phone_number().to_string();
            let mut name = chat
                .name
                .clone()
                .or_else(|| chat.notify.clone())
                .or_else(|| chat.verified_name.clone())
                .or_else(|| {
                    resolver::find_contact(contacts, &chat.jid)
                        .and_then(resolver::contact_display_name)
                        .map(str::to_string)
                });

            if name.is_none()
                && let Ok(identity) = self.transport.resolve_identity(&chat.jid).await
            {
                name = identity.notify.filter(|n| !n.trim().is_empty());
            }

            (name.unwrap_or_else(|| number.clone()), vec![number])
        };

        let chat_row = NewChat {
            id: composite_chat_id(&chat.jid, self.session_id),
            session_id: self.session_id,
            name: Some(name),
            phone_numbers: serde_json::to_string(&numbers)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            is_group: chat.jid.is_group(),
        };

        self.db.upsert_chat(&chat_row).await
    }
}
