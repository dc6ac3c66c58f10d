//! The persistence gateway: sessions, chats and messages tables.
//!
//! This is the single source of truth shared by every session worker. All
//! mutations are idempotent at this layer — message inserts dedup on the
//! network-assigned id, chat upserts key on the composite chat id — so the
//! ingestion pipeline can replay overlapping event streams safely.

pub mod credentials;
pub mod error;
pub mod models;
pub mod schema;

use diesel::connection::SimpleConnection;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use crate::store::error::{Result, StoreError};
use crate::store::models::{Chat, Message, NewChat, NewMessage, Session, SessionId};
use crate::store::schema::{chats, messages, sessions};
use crate::types::message::MessageStatus;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Counts reported back from a session merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub chats_moved: usize,
    pub messages_moved: usize,
}

#[derive(Debug)]
struct ConnectionOptions;

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for ConnectionOptions
{
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        // Run migrations
        {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            conn.run_pending_migrations(MIGRATIONS)
                .map_err(|e| StoreError::Migration(e.to_string()))?;
        }

        Ok(Self { pool })
    }

    fn get_connection(
        &self,
    ) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>> {
        self.pool
            .get()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    // ----- sessions -----

    /// Creates an empty, not-ready session row and returns its id.
    pub async fn create_session(&self) -> Result<SessionId> {
        let mut conn = self.get_connection()?;
        let ts = now();

        diesel::insert_into(sessions::table)
            .values((
                sessions::ready.eq(false),
                sessions::created_at.eq(ts),
                sessions::updated_at.eq(ts),
            ))
            .returning(sessions::id)
            .get_result(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub async fn get_session(&self, session_id: SessionId) -> Result<Option<Session>> {
        let mut conn = self.get_connection()?;

        sessions::table
            .find(session_id)
            .first(&mut conn)
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Stores a freshly rendered QR payload. Guarded so that a spurious late
    /// QR event can never overwrite a ready session's slot.
    pub async fn update_session_qr(&self, session_id: SessionId, qr: &str) -> Result<bool> {
        let mut conn = self.get_connection()?;

        let rows = diesel::update(
            sessions::table.filter(sessions::id.eq(session_id).and(sessions::ready.eq(false))),
        )
        .set((sessions::qr.eq(qr), sessions::updated_at.eq(now())))
        .execute(&mut conn)
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows > 0)
    }

    /// Marks a session ready and binds it to the learned phone number; the
    /// pending QR payload is cleared at the same time.
    pub async fn mark_session_ready(&self, session_id: SessionId, phone: &str) -> Result<()> {
        let mut conn = self.get_connection()?;

        diesel::update(sessions::table.find(session_id))
            .set((
                sessions::ready.eq(true),
                sessions::phone_number.eq(phone),
                sessions::qr.eq(None::<String>),
                sessions::updated_at.eq(now()),
            ))
            .execute(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    /// Flips a session to not-ready. Only the explicit-logout path calls
    /// this; transient disconnects must leave readiness untouched.
    pub async fn mark_session_not_ready(&self, session_id: SessionId) -> Result<()> {
        let mut conn = self.get_connection()?;

        diesel::update(sessions::table.find(session_id))
            .set((sessions::ready.eq(false), sessions::updated_at.eq(now())))
            .execute(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    /// All sessions that should be reconnected after a restart, most
    /// recently updated first.
    pub async fn all_ready_sessions(&self) -> Result<Vec<Session>> {
        let mut conn = self.get_connection()?;

        sessions::table
            .filter(sessions::ready.eq(true))
            .order(sessions::updated_at.desc())
            .load(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub async fn most_recent_ready_session(&self) -> Result<Option<Session>> {
        let mut conn = self.get_connection()?;

        sessions::table
            .filter(sessions::ready.eq(true))
            .order(sessions::updated_at.desc())
            .first(&mut conn)
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub async fn session_by_phone(&self, phone: &str) -> Result<Option<Session>> {
        let mut conn = self.get_connection()?;

        sessions::table
            .filter(sessions::phone_number.eq(phone))
            .order(sessions::id.desc())
            .first(&mut conn)
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub async fn session_phone(&self, session_id: SessionId) -> Result<Option<String>> {
        let mut conn = self.get_connection()?;

        sessions::table
            .find(session_id)
            .select(sessions::phone_number)
            .first::<Option<String>>(&mut conn)
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))
            .map(|row| row.flatten())
    }

    /// Re-parents every chat and message of `old` onto `new` and deletes the
    /// old session row, all in one transaction. Invoked when a new
    /// connection authenticates with a phone number an older ready session
    /// already owns.
    pub async fn merge_sessions(&self, old: SessionId, new: SessionId) -> Result<MergeStats> {
        let mut conn = self.get_connection()?;
        let ts = now();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let chats_moved =
                diesel::update(chats::table.filter(chats::session_id.eq(old)))
                    .set((chats::session_id.eq(new), chats::updated_at.eq(ts)))
                    .execute(conn)?;

            let messages_moved =
                diesel::update(messages::table.filter(messages::session_id.eq(old)))
                    .set((messages::session_id.eq(new), messages::updated_at.eq(ts)))
                    .execute(conn)?;

            diesel::delete(sessions::table.find(old)).execute(conn)?;

            Ok(MergeStats {
                chats_moved,
                messages_moved,
            })
        })
        .map_err(|e| StoreError::Database(e.to_string()))
    }

    // ----- chats -----

    /// Inserts the chat or refreshes its display name and participant list.
    /// The last-message pointer is owned by `update_chat_last_message` and
    /// never touched here.
    pub async fn upsert_chat(&self, chat: &NewChat) -> Result<()> {
        let mut conn = self.get_connection()?;
        let ts = now();

        diesel::insert_into(chats::table)
            .values((chat, chats::created_at.eq(ts), chats::updated_at.eq(ts)))
            .on_conflict(chats::id)
            .do_update()
            .set((
                chats::name.eq(chat.name.as_deref()),
                chats::phone_numbers.eq(chat.phone_numbers.as_str()),
                chats::is_group.eq(chat.is_group),
                chats::updated_at.eq(ts),
            ))
            .execute(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        let mut conn = self.get_connection()?;

        chats::table
            .find(chat_id)
            .first(&mut conn)
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub async fn chats_for_session(&self, session_id: SessionId) -> Result<Vec<Chat>> {
        let mut conn = self.get_connection()?;

        chats::table
            .filter(chats::session_id.eq(session_id))
            .order(chats::last_message_timestamp.desc())
            .load(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Advances the chat's last-message pointer, but only forward: replayed
    /// out-of-order messages must never regress it.
    pub async fn update_chat_last_message(
        &self,
        chat_id: &str,
        message_id: &str,
        timestamp: i64,
    ) -> Result<bool> {
        let mut conn = self.get_connection()?;

        let rows = diesel::update(
            chats::table.filter(
                chats::id.eq(chat_id).and(
                    chats::last_message_timestamp
                        .is_null()
                        .or(chats::last_message_timestamp.le(timestamp)),
                ),
            ),
        )
        .set((
            chats::last_message_id.eq(message_id),
            chats::last_message_timestamp.eq(timestamp),
            chats::updated_at.eq(now()),
        ))
        .execute(&mut conn)
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows > 0)
    }

    /// Finds chats whose id or participant-number array matches a normalized
    /// phone number, newest activity first.
    pub async fn search_chats_by_phone(
        &self,
        phone: &str,
        session_id: SessionId,
    ) -> Result<Vec<Chat>> {
        let mut conn = self.get_connection()?;
        let exact = format!("%\"{phone}\"%");
        let partial = format!("%{phone}%");

        chats::table
            .filter(chats::session_id.eq(session_id))
            .filter(
                chats::phone_numbers
                    .like(exact)
                    .or(chats::phone_numbers.like(partial.clone()))
                    .or(chats::id.like(partial)),
            )
            .order(chats::last_message_timestamp.desc())
            .load(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub async fn chat_by_phone(
        &self,
        phone: &str,
        session_id: SessionId,
    ) -> Result<Option<Chat>> {
        Ok(self
            .search_chats_by_phone(phone, session_id)
            .await?
            .into_iter()
            .next())
    }

    // ----- messages -----

    /// Idempotent insert keyed on the network-assigned message id. Returns
    /// whether a row was actually written; a duplicate id is silently
    /// ignored, never overwritten.
    pub async fn insert_message(&self, message: &NewMessage) -> Result<bool> {
        let mut conn = self.get_connection()?;
        let ts = now();

        let rows = diesel::insert_into(messages::table)
            .values((
                message,
                messages::created_at.eq(ts),
                messages::updated_at.eq(ts),
            ))
            .on_conflict(messages::id)
            .do_nothing()
            .execute(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows > 0)
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Option<Message>> {
        let mut conn = self.get_connection()?;

        messages::table
            .find(message_id)
            .first(&mut conn)
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Applies an externally reported status, last-write-wins. Returns false
    /// when the id is unknown so the caller can log-and-drop.
    pub async fn update_message_status(
        &self,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<bool> {
        let mut conn = self.get_connection()?;

        let rows = diesel::update(messages::table.find(message_id))
            .set((
                messages::status.eq(status.as_str()),
                messages::updated_at.eq(now()),
            ))
            .execute(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows > 0)
    }

    /// Removes a revoked message. Deleting an id that was never stored is a
    /// no-op, not an error.
    pub async fn delete_message(&self, message_id: &str) -> Result<bool> {
        let mut conn = self.get_connection()?;

        let rows = diesel::delete(messages::table.find(message_id))
            .execute(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows > 0)
    }

    /// High-water mark used to bound duplicate work when a history batch
    /// replays messages the store already has.
    pub async fn latest_message_timestamp(&self, session_id: SessionId) -> Result<Option<i64>> {
        let mut conn = self.get_connection()?;

        messages::table
            .filter(messages::session_id.eq(session_id))
            .select(max(messages::timestamp))
            .first(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub async fn count_messages(&self, session_id: SessionId) -> Result<i64> {
        let mut conn = self.get_connection()?;

        messages::table
            .filter(messages::session_id.eq(session_id))
            .count()
            .get_result(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub async fn count_chats(&self, session_id: SessionId) -> Result<i64> {
        let mut conn = self.get_connection()?;

        chats::table
            .filter(chats::session_id.eq(session_id))
            .count()
            .get_result(&mut conn)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}
