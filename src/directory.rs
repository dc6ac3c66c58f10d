//! Session directory: the process-wide "current session" pointer and the
//! deterministic keys derived from session ids.

use rand::RngCore;
use std::sync::Mutex;

use crate::store::Database;
use crate::store::error::Result;
use crate::store::models::{Session, SessionId};
use crate::types::jid::Jid;

/// Composite chat key: `{remote}_{session}`. Deterministic and
/// collision-free, so replaying the same inputs always resolves to the same
/// chat row.
pub fn composite_chat_id(remote: &Jid, session_id: SessionId) -> String {
    format!("{remote}_{session_id}")
}

/// Random id for locally originated messages that have not been assigned a
/// network id yet.
pub fn generate_message_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("local-{hex}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentSession {
    pub session_id: SessionId,
    pub phone_number: Option<String>,
}

/// Tracks which session is "current" for callers that do not address one
/// explicitly. Purely advisory; the store stays the source of truth.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    current: Mutex<Option<CurrentSession>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current(&self, session_id: SessionId, phone_number: Option<String>) {
        let mut current = self.current.lock().expect("directory lock poisoned");
        *current = Some(CurrentSession {
            session_id,
            phone_number,
        });
    }

    pub fn current(&self) -> Option<CurrentSession> {
        self.current.lock().expect("directory lock poisoned").clone()
    }

    pub fn clear(&self) {
        let mut current = self.current.lock().expect("directory lock poisoned");
        *current = None;
    }

    /// Whether the current pointer names a session that has learned its
    /// phone identity.
    pub fn is_ready(&self) -> bool {
        self.current()
            .map(|c| c.phone_number.is_some())
            .unwrap_or(false)
    }

    /// Points the directory at the most recently ready session from the
    /// store, returning it when one exists.
    pub async fn load_active(&self, db: &Database) -> Result<Option<Session>> {
        let session = db.most_recent_ready_session().await?;
        if let Some(session) = &session {
            self.set_current(session.id, session.phone_number.clone());
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_id_is_deterministic() {
        let jid: Jid = "201112223334@s.whatsapp.net".parse().unwrap();
        let a = composite_chat_id(&jid, 4);
        let b = composite_chat_id(&jid, 4);
        assert_eq!(a, b);
        assert_eq!(a, "201112223334@s.whatsapp.net_4");
    }

    #[test]
    fn composite_id_separates_sessions() {
        let jid: Jid = "1234@g.us".parse().unwrap();
        assert_ne!(composite_chat_id(&jid, 1), composite_chat_id(&jid, 2));
    }

    #[test]
    fn message_ids_are_unique() {
        let a = generate_message_id();
        let b = generate_message_id();
        assert_ne!(a, b);
        assert!(a.starts_with("local-"));
    }

    #[test]
    fn current_pointer_round_trips() {
        let dir = SessionDirectory::new();
        assert!(dir.current().is_none());
        assert!(!dir.is_ready());

        dir.set_current(3, None);
        assert!(!dir.is_ready());

        dir.set_current(3, Some("201112223334".into()));
        assert!(dir.is_ready());
        assert_eq!(dir.current().unwrap().session_id, 3);

        dir.clear();
        assert!(dir.current().is_none());
    }
}
