use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::store::schema::{chats, messages, sessions};

pub type SessionId = i32;

/// One authenticated connection lifecycle bound to a single phone number.
#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = sessions)]
pub struct Session {
    pub id: SessionId,
    pub phone_number: Option<String>,
    pub ready: bool,
    pub qr: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = chats)]
pub struct Chat {
    /// Composite key `{remote_jid}_{session_id}`.
    pub id: String,
    pub session_id: SessionId,
    pub name: Option<String>,
    /// JSON array of participant numbers; a singleton for individual chats,
    /// a bounded prefix for groups.
    pub phone_numbers: String,
    pub is_group: bool,
    pub last_message_id: Option<String>,
    pub last_message_timestamp: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Chat {
    pub fn participant_numbers(&self) -> Vec<String> {
        serde_json::from_str(&self.phone_numbers).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = messages)]
pub struct Message {
    /// Network-assigned message id, the dedup key.
    pub id: String,
    pub chat_id: String,
    pub session_id: SessionId,
    pub from_number: String,
    pub sender_id: String,
    pub sender_name: String,
    pub body: Option<String>,
    /// Unix seconds assigned by the network, not insertion time.
    pub timestamp: i64,
    pub from_me: bool,
    pub has_media: bool,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub parent_id: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = chats)]
pub struct NewChat {
    pub id: String,
    pub session_id: SessionId,
    pub name: Option<String>,
    pub phone_numbers: String,
    pub is_group: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: String,
    pub chat_id: String,
    pub session_id: SessionId,
    pub from_number: String,
    pub sender_id: String,
    pub sender_name: String,
    pub body: Option<String>,
    pub timestamp: i64,
    pub from_me: bool,
    pub has_media: bool,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub parent_id: Option<String>,
    pub status: String,
}
