use log::{debug, info, warn};
use std::sync::Arc;

use crate::supervisor::{SessionHandle, Supervisor};

impl Supervisor {
    /// Per-session keep-alive loop. Every tick issues an authenticated
    /// probe on the live connection — a bare socket-state check can report
    /// healthy while the application-layer session is stale.
    ///
    /// Probe failure attempts a silent reconnect but never flips the ready
    /// flag; only an explicit logout close event may do that. Probe success
    /// re-marks a stale not-ready row as ready.
    pub(crate) async fn keepalive_loop(self: Arc<Self>, handle: Arc<SessionHandle>) {
        let session_id = handle.session_id;

        loop {
            tokio::select! {
                _ = handle.shutdown.notified() => {
                    debug!(target: "Supervisor/Keepalive", "Shutdown signaled for session {session_id}, exiting keepalive loop");
                    return;
                }
                _ = tokio::time::sleep(self.config.keepalive_interval) => {
                    // The handle may have been evicted (logout) or replaced
                    // (reconnect) since the last tick; a stale loop must not
                    // touch the connection.
                    let still_current = self
                        .handles
                        .get(&session_id)
                        .map(|current| current.generation == handle.generation)
                        .unwrap_or(false);
                    if !still_current {
                        debug!(target: "Supervisor/Keepalive", "Handle for session {session_id} is gone, exiting keepalive loop");
                        return;
                    }

                    let session = match self.db.get_session(session_id).await {
                        Ok(Some(session)) => session,
                        Ok(None) => {
                            warn!(target: "Supervisor/Keepalive", "Session {session_id} no longer in store, stopping keepalive");
                            self.handles.remove_if(&session_id, |_, h| h.generation == handle.generation);
                            return;
                        }
                        Err(e) => {
                            warn!(target: "Supervisor/Keepalive", "Could not load session {session_id}: {e}");
                            continue;
                        }
                    };

                    match handle.transport.probe().await {
                        Ok(()) => {
                            debug!(target: "Supervisor/Keepalive", "Keepalive probe OK for session {session_id}");

                            // The socket is demonstrably alive; if the row went
                            // stale, repair it. This is the only place besides
                            // the open handler that marks ready, and nothing
                            // here ever unmarks it.
                            if !session.ready {
                                match &session.phone_number {
                                    Some(phone) => {
                                        if let Err(e) = self.db.mark_session_ready(session_id, phone).await {
                                            warn!(target: "Supervisor/Keepalive", "Could not re-mark session {session_id} ready: {e}");
                                        } else {
                                            info!(target: "Supervisor/Keepalive", "Session {session_id} re-marked ready (connection verified)");
                                        }
                                    }
                                    None => debug!(target: "Supervisor/Keepalive", "Session {session_id} alive but has no phone identity yet"),
                                }
                            }
                        }
                        Err(e) => {
                            warn!(target: "Supervisor/Keepalive", "Keepalive probe failed for session {session_id}: {e}");
                            info!(target: "Supervisor/Keepalive", "Session {session_id} stays ready; attempting silent reconnect");

                            handle.shutdown.notify_waiters();
                            self.handles.remove_if(&session_id, |_, h| h.generation == handle.generation);

                            let this = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = this.start_session(session_id, false).await {
                                    warn!(target: "Supervisor/Keepalive", "Silent reconnect for session {session_id} failed: {e}");
                                }
                            });
                            return;
                        }
                    }
                }
            }
        }
    }
}
