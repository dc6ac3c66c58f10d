use log::warn;

use crate::ingest::Ingestor;
use crate::resolver::phone_to_jid;
use crate::store::models::SessionId;
use crate::supervisor::{Supervisor, SupervisorError};
use crate::types::jid::MessageId;
use crate::types::message::{IncomingMessage, MessageContent, MessageKey};

impl Supervisor {
    /// Sends a text message from one session to a raw phone number and
    /// records it through the same pipeline that ingests received messages,
    /// so the stored row is indistinguishable from a live-delivered echo.
    ///
    /// Errors distinguish session-not-found, session-not-ready and
    /// socket-not-connected so callers can answer precisely.
    pub async fn send_text(
        &self,
        session_id: SessionId,
        phone: &str,
        body: &str,
    ) -> Result<MessageId, SupervisorError> {
        let session = self
            .db
            .get_session(session_id)
            .await?
            .ok_or(SupervisorError::SessionNotFound)?;
        if !session.ready {
            return Err(SupervisorError::SessionNotReady);
        }

        let handle = self
            .handles
            .get(&session_id)
            .map(|h| h.value().clone())
            .ok_or(SupervisorError::SocketNotConnected)?;

        let to = phone_to_jid(phone, &self.config.default_country_code);
        let message_id = handle.transport.send_text(&to, body).await?;

        let echo = IncomingMessage {
            key: MessageKey {
                id: message_id.clone(),
                remote_jid: to,
                remote_jid_alt: None,
                sender_pn: None,
                participant: None,
                from_me: true,
            },
            push_name: None,
            verified_biz_name: None,
            timestamp: chrono::Utc::now().timestamp(),
            content: MessageContent::Text(body.to_string()),
            quoted_message_id: None,
        };

        let ingestor = Ingestor::new(
            session_id,
            self.db.clone(),
            handle.transport.clone(),
            self.uploader(),
            self.config.clone(),
        );
        if let Err(e) = ingestor.ingest_message(&echo, true, &[]).await {
            // The message is already on the wire; a persistence hiccup must
            // not be reported as a send failure.
            warn!(target: "Supervisor", "Sent message {message_id} could not be stored: {e}");
        }

        Ok(message_id)
    }
}
