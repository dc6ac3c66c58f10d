//! History-batch processing.
//!
//! After a reconnect the network replays past chats, contacts and messages
//! in bulk. Processing is incremental and resumable: the per-session
//! timestamp watermark bounds duplicate work, while the id-keyed idempotent
//! insert remains the real correctness guarantee — timestamps are not
//! strictly monotonic across sources.

use log::{info, warn};

use crate::ingest::Ingestor;
use crate::types::events::HistoryBatch;
use crate::types::message::MessageContent;

impl Ingestor {
    pub async fn handle_history_batch(&self, batch: HistoryBatch) {
        let session_id = self.session_id();
        info!(
            target: "Ingest/History",
            "History batch for session {session_id}: {} chats, {} contacts, {} messages",
            batch.chats.len(),
            batch.contacts.len(),
            batch.messages.len()
        );

        let watermark = match self.db().latest_message_timestamp(session_id).await {
            Ok(ts) => ts.unwrap_or(0),
            Err(e) => {
                warn!(
                    target: "Ingest/History",
                    "Could not read sync watermark, replaying everything: {e}"
                );
                0
            }
        };

        self.handle_chats_upsert(&batch.chats, &batch.contacts).await;

        let total = batch.messages.len();
        let mut stored = 0usize;
        let mut duplicates = 0usize;
        let mut skipped_old = 0usize;

        for (index, message) in batch.messages.iter().enumerate() {
            if let MessageContent::Revoke { target_id } = &message.content {
                self.handle_revoke(target_id).await;
                continue;
            }

            if message.timestamp < watermark {
                skipped_old += 1;
                continue;
            }

            match self.ingest_message(message, false, &batch.contacts).await {
                Ok(true) => stored += 1,
                Ok(false) => duplicates += 1,
                Err(e) => warn!(
                    target: "Ingest/History",
                    "Failed to store history message {}: {e}",
                    message.key.id
                ),
            }

            let processed = index + 1;
            if processed % self.history_log_every() == 0 && processed < total {
                info!(target: "Ingest/History", "Progress: {processed}/{total} messages processed");
            }
        }

        info!(
            target: "Ingest/History",
            "History batch done for session {session_id}: {stored} stored, \
             {duplicates} duplicates, {skipped_old} older than watermark {watermark}"
        );
    }
}
