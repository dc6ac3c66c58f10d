//! The connection supervisor.
//!
//! Owns the process-wide map of session id → live connection handle.
//! Handles cannot be persisted, so this registry is the only place they
//! live: inserted on connect, replaced on reconnect, removed on logout or
//! explicit termination. Everything durable stays in the store.
//!
//! The close-handling asymmetry is deliberate: only an explicit logout ever
//! flips a session to not-ready. Treating any transient disconnect as
//! "session lost" would cause spurious full re-syncs and wrongly-reported
//! unavailability to callers.

use dashmap::DashMap;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{Notify, mpsc};

use crate::config::Config;
use crate::directory::SessionDirectory;
use crate::ingest::Ingestor;
use crate::qrcode::QrRenderer;
use crate::store::Database;
use crate::store::credentials::CredentialStore;
use crate::store::error::StoreError;
use crate::store::models::SessionId;
use crate::transport::{Transport, TransportError, TransportFactory};
use crate::types::events::{DisconnectReason, Event};
use crate::types::jid::Jid;
use crate::upload::MediaUploader;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("session not found")]
    SessionNotFound,
    #[error("session is not ready")]
    SessionNotReady,
    #[error("socket is not connected")]
    SocketNotConnected,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// One live connection and the bits needed to tear it down.
pub struct SessionHandle {
    pub session_id: SessionId,
    pub transport: Arc<dyn Transport>,
    /// Wakes the keep-alive timer and the event loop so neither outlives
    /// the handle they belong to.
    pub(crate) shutdown: Arc<Notify>,
    /// Connection generation; a stale loop must never act on a handle that
    /// has since been replaced.
    pub(crate) generation: u64,
}

pub struct Supervisor {
    pub(crate) db: Arc<Database>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    transport_factory: Arc<dyn TransportFactory>,
    uploader: Arc<dyn MediaUploader>,
    qr_renderer: Arc<dyn QrRenderer>,
    directory: Arc<SessionDirectory>,
    pub(crate) config: Config,
    pub(crate) handles: DashMap<SessionId, Arc<SessionHandle>>,
    generation: AtomicU64,
}

impl Supervisor {
    pub fn new(
        db: Arc<Database>,
        credentials: Arc<dyn CredentialStore>,
        transport_factory: Arc<dyn TransportFactory>,
        uploader: Arc<dyn MediaUploader>,
        qr_renderer: Arc<dyn QrRenderer>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            credentials,
            transport_factory,
            uploader,
            qr_renderer,
            directory: Arc::new(SessionDirectory::new()),
            config,
            handles: DashMap::new(),
            generation: AtomicU64::new(0),
        })
    }

    pub fn directory(&self) -> Arc<SessionDirectory> {
        self.directory.clone()
    }

    pub fn database(&self) -> Arc<Database> {
        self.db.clone()
    }

    pub(crate) fn uploader(&self) -> Arc<dyn MediaUploader> {
        self.uploader.clone()
    }

    pub fn is_connected(&self, session_id: SessionId) -> bool {
        self.handles.contains_key(&session_id)
    }

    /// Creates an empty session row and opens its first connection; the QR
    /// payload lands in the row once the network issues one.
    pub async fn create_session(self: &Arc<Self>) -> Result<SessionId, SupervisorError> {
        let session_id = self.db.create_session().await?;
        self.directory.set_current(session_id, None);
        info!(target: "Supervisor", "Created session {session_id}, waiting for pairing");
        self.start_session(session_id, false).await?;
        Ok(session_id)
    }

    /// Opens (or reopens) the connection for one session, reusing its
    /// persisted credentials so auth state and history continuity survive.
    pub fn start_session(
        self: &Arc<Self>,
        session_id: SessionId,
        fresh_history: bool,
    ) -> impl std::future::Future<Output = Result<(), SupervisorError>> + Send + '_ {
        async move {
        if self.db.get_session(session_id).await?.is_none() {
            return Err(SupervisorError::SessionNotFound);
        }

        if fresh_history {
            match self.credentials.clear_sync_state(session_id).await {
                Ok(0) => {}
                Ok(cleared) => info!(
                    target: "Supervisor",
                    "Cleared {cleared} sync-state files for session {session_id} to force a fresh history sync"
                ),
                Err(e) => warn!(
                    target: "Supervisor",
                    "Could not clear sync state for session {session_id}: {e}"
                ),
            }
        }

        info!(target: "Supervisor", "Opening connection for session {session_id}");
        let (transport, events) = self
            .transport_factory
            .connect(session_id, self.credentials.clone(), fresh_history)
            .await?;

        let handle = Arc::new(SessionHandle {
            session_id,
            transport,
            shutdown: Arc::new(Notify::new()),
            generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
        });

        if let Some(previous) = self.handles.insert(session_id, handle.clone()) {
            debug!(target: "Supervisor", "Replacing stale handle for session {session_id}");
            previous.shutdown.notify_waiters();
        }

        let loop_self = self.clone();
        let loop_handle = handle.clone();
        tokio::spawn(async move {
            loop_self.run_session_loop(loop_handle, events).await;
        });

        let keepalive_self = self.clone();
        tokio::spawn(async move {
            keepalive_self.keepalive_loop(handle).await;
        });

        Ok(())
        }
    }

    /// The per-session dispatcher: consumes the connection's event stream in
    /// delivery order until the connection closes or the handle is torn
    /// down.
    async fn run_session_loop(
        self: Arc<Self>,
        handle: Arc<SessionHandle>,
        mut events: mpsc::Receiver<Event>,
    ) {
        let session_id = handle.session_id;
        let ingestor = Ingestor::new(
            session_id,
            self.db.clone(),
            handle.transport.clone(),
            self.uploader.clone(),
            self.config.clone(),
        );

        // Whatever path exits this loop, the keep-alive timer must not keep
        // running against the dead handle.
        let _shutdown_guard = scopeguard::guard(handle.clone(), |h| {
            h.shutdown.notify_waiters();
        });

        loop {
            tokio::select! {
                _ = handle.shutdown.notified() => {
                    debug!(target: "Supervisor", "Session {session_id} loop shut down");
                    return;
                }
                event = events.recv() => {
                    match event {
                        Some(Event::Qr { payload }) => self.handle_qr(session_id, &payload).await,
                        Some(Event::Connected { jid }) => self.handle_open(session_id, &jid).await,
                        Some(Event::Disconnected { reason }) => {
                            self.handle_close(&handle, reason).await;
                            return;
                        }
                        Some(other) => ingestor.handle_event(other).await,
                        // Stream ended without a close event; treat it like a
                        // lost connection.
                        None => {
                            self.handle_close(&handle, DisconnectReason::ConnectionLost).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// A pairing payload arrived. Only a not-yet-ready session may accept
    /// it; a spurious late QR must not clobber a ready session's slot.
    async fn handle_qr(&self, session_id: SessionId, payload: &str) {
        match self.db.get_session(session_id).await {
            Ok(Some(session)) if !session.ready => {}
            Ok(Some(_)) => {
                debug!(target: "Supervisor", "Ignoring QR for ready session {session_id}");
                return;
            }
            Ok(None) => {
                warn!(target: "Supervisor", "QR for unknown session {session_id}");
                return;
            }
            Err(e) => {
                warn!(target: "Supervisor", "Could not load session {session_id}: {e}");
                return;
            }
        }

        // Fall back to the raw payload when rendering fails; pairing still
        // works with it.
        let rendered = match self.qr_renderer.render(payload) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(target: "Supervisor", "QR rendering failed for session {session_id}: {e}");
                payload.to_string()
            }
        };

        match self.db.update_session_qr(session_id, &rendered).await {
            Ok(true) => info!(target: "Supervisor", "Stored QR payload for session {session_id}"),
            Ok(false) => debug!(target: "Supervisor", "QR slot for session {session_id} is closed"),
            Err(e) => warn!(target: "Supervisor", "Failed to store QR for session {session_id}: {e}"),
        }
    }

    /// The connection authenticated. Learn the phone identity, merge away
    /// any older ready session bound to the same number, then mark ready.
    async fn handle_open(&self, session_id: SessionId, jid: &Jid) {
        let phone = jid.phone_number().to_string();
        info!(target: "Supervisor", "Session {session_id} connected as {phone}");

        match self.db.session_by_phone(&phone).await {
            Ok(Some(existing)) if existing.id != session_id && existing.ready => {
                info!(
                    target: "Supervisor",
                    "Phone {phone} already bound to session {}, migrating it into {session_id}",
                    existing.id
                );

                if let Some((_, old_handle)) = self.handles.remove(&existing.id) {
                    old_handle.shutdown.notify_waiters();
                    old_handle.transport.disconnect().await;
                }

                match self.db.merge_sessions(existing.id, session_id).await {
                    Ok(stats) => info!(
                        target: "Supervisor",
                        "Merged session {}: {} chats, {} messages re-owned",
                        existing.id, stats.chats_moved, stats.messages_moved
                    ),
                    Err(e) => error!(
                        target: "Supervisor",
                        "Failed to merge session {} into {session_id}: {e}",
                        existing.id
                    ),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(target: "Supervisor", "Phone lookup failed for {phone}: {e}"),
        }

        if let Err(e) = self.db.mark_session_ready(session_id, &phone).await {
            error!(target: "Supervisor", "Failed to mark session {session_id} ready: {e}");
            return;
        }
        self.directory.set_current(session_id, Some(phone));
    }

    /// Close handling. Logout is terminal; everything else schedules a
    /// reconnect with the same session id and credentials, leaving the ready
    /// flag untouched.
    async fn handle_close(self: &Arc<Self>, handle: &Arc<SessionHandle>, reason: DisconnectReason) {
        let session_id = handle.session_id;
        handle.shutdown.notify_waiters();
        let was_registered = self
            .handles
            .remove_if(&session_id, |_, h| h.generation == handle.generation)
            .is_some();

        if reason.is_logged_out() {
            info!(target: "Supervisor", "Session {session_id} logged out, not reconnecting");
            if let Err(e) = self.db.mark_session_not_ready(session_id).await {
                error!(
                    target: "Supervisor",
                    "Failed to mark logged-out session {session_id} not ready: {e}"
                );
            }
            if let Some(current) = self.directory.current()
                && current.session_id == session_id
            {
                self.directory.clear();
            }
            return;
        }

        // The handle was already evicted by a teardown or a replacing
        // reconnect; a trailing close event from the dead connection must
        // not spawn another one.
        if !was_registered {
            debug!(
                target: "Supervisor",
                "Session {session_id} closed ({reason:?}) after teardown, not reconnecting"
            );
            return;
        }

        let delay = self.config.reconnect_delay;
        info!(
            target: "Supervisor",
            "Connection lost for session {session_id} ({reason:?}), reconnecting in {}s; session stays ready",
            delay.as_secs()
        );

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = this.start_session(session_id, false).await {
                warn!(target: "Supervisor", "Reconnect for session {session_id} failed: {e}");
            }
        });
    }

    /// Graceful teardown: cancel the keep-alive timer, detach the event
    /// loop, drop the handle. Does not touch the ready flag.
    pub async fn terminate_session(&self, session_id: SessionId) {
        if let Some((_, handle)) = self.handles.remove(&session_id) {
            info!(target: "Supervisor", "Terminating session {session_id}");
            handle.shutdown.notify_waiters();
            handle.transport.disconnect().await;
        }
    }

    /// The sole recovery path after a crash or redeploy: reconnect every
    /// session the store says was ready. One failing session must not block
    /// its siblings.
    pub async fn restore_ready_sessions(self: &Arc<Self>, fresh_history: bool) -> usize {
        let sessions = match self.db.all_ready_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!(target: "Supervisor", "Could not list ready sessions: {e}");
                return 0;
            }
        };

        if sessions.is_empty() {
            info!(target: "Supervisor", "No ready sessions to restore");
            return 0;
        }

        info!(target: "Supervisor", "Restoring {} ready session(s)", sessions.len());
        let mut restored = 0;
        for session in sessions {
            match self.start_session(session.id, fresh_history).await {
                Ok(()) => {
                    restored += 1;
                    info!(
                        target: "Supervisor",
                        "Restored session {} ({})",
                        session.id,
                        session.phone_number.as_deref().unwrap_or("unknown")
                    );
                }
                Err(e) => {
                    error!(target: "Supervisor", "Failed to restore session {}: {e}", session.id);
                }
            }
        }
        restored
    }
}
