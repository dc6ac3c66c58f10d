//! Shared test doubles: an in-process transport whose event stream the
//! tests script by hand, plus capturing collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use chatvault::Config;
use chatvault::Database;
use chatvault::Supervisor;
use chatvault::qrcode::RawQrRenderer;
use chatvault::store::credentials::{CredentialStore, FileCredentialStore};
use chatvault::store::models::SessionId;
use chatvault::transport::{
    MediaPayload, ResolvedIdentity, Transport, TransportError, TransportFactory,
};
use chatvault::types::events::Event;
use chatvault::types::jid::{Jid, MessageId};
use chatvault::types::message::GroupInfo;
use chatvault::upload::MediaUploader;

pub struct FakeTransport {
    pub sent: Mutex<Vec<(Jid, String)>>,
    pub receipts: Mutex<Vec<(Jid, Vec<MessageId>)>>,
    pub probe_ok: AtomicBool,
    pub probe_count: AtomicU64,
    pub disconnected: AtomicBool,
    pub rosters: Mutex<HashMap<String, GroupInfo>>,
    pub media: Mutex<HashMap<String, MediaPayload>>,
    next_id: AtomicU64,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            receipts: Mutex::new(Vec::new()),
            probe_ok: AtomicBool::new(true),
            probe_count: AtomicU64::new(0),
            disconnected: AtomicBool::new(false),
            rosters: Mutex::new(HashMap::new()),
            media: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn set_roster(&self, group: &str, info: GroupInfo) {
        self.rosters.lock().unwrap().insert(group.to_string(), info);
    }

    pub fn set_media(&self, message_id: &str, data: &[u8], content_type: &str) {
        self.media.lock().unwrap().insert(
            message_id.to_string(),
            MediaPayload {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn probes(&self) -> u64 {
        self.probe_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send_text(&self, to: &Jid, body: &str) -> Result<MessageId, TransportError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push((to.clone(), body.to_string()));
        Ok(format!("wire-{id}"))
    }

    async fn probe(&self) -> Result<(), TransportError> {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        if self.probe_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Timeout)
        }
    }

    async fn resolve_identity(&self, jid: &Jid) -> Result<ResolvedIdentity, TransportError> {
        Ok(ResolvedIdentity {
            exists: true,
            jid: jid.clone(),
            notify: None,
        })
    }

    async fn group_roster(&self, group: &Jid) -> Result<GroupInfo, TransportError> {
        self.rosters
            .lock()
            .unwrap()
            .get(&group.to_string())
            .cloned()
            .ok_or_else(|| TransportError::Protocol(format!("no roster for {group}")))
    }

    async fn fetch_media(&self, message_id: &str) -> Result<MediaPayload, TransportError> {
        self.media
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| TransportError::Protocol(format!("no media for {message_id}")))
    }

    async fn send_read_receipt(
        &self,
        chat: &Jid,
        message_ids: &[MessageId],
    ) -> Result<(), TransportError> {
        self.receipts
            .lock()
            .unwrap()
            .push((chat.clone(), message_ids.to_vec()));
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

/// One scripted connection: the transport handed to the supervisor plus the
/// sender side of its event stream.
pub struct FakeConnection {
    pub session_id: SessionId,
    pub fresh_history: bool,
    pub transport: Arc<FakeTransport>,
    pub events: mpsc::Sender<Event>,
}

impl FakeConnection {
    pub async fn emit(&self, event: Event) {
        self.events
            .send(event)
            .await
            .expect("event loop should still be listening");
    }
}

#[derive(Default)]
pub struct FakeFactory {
    connections: Mutex<Vec<Arc<FakeConnection>>>,
    /// When set, the next `connect` call fails with this error message.
    pub fail_next: AtomicBool,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn connection(&self, index: usize) -> Arc<FakeConnection> {
        self.connections.lock().unwrap()[index].clone()
    }

    /// Waits until at least `count` connections have been opened.
    pub async fn wait_for_connections(&self, count: usize) -> Arc<FakeConnection> {
        wait_until(Duration::from_secs(2), || self.connection_count() >= count).await;
        self.connection(count - 1)
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn connect(
        &self,
        session_id: SessionId,
        _credentials: Arc<dyn CredentialStore>,
        fresh_history: bool,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<Event>), TransportError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Protocol("scripted connect failure".into()));
        }

        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(FakeTransport::new());
        self.connections.lock().unwrap().push(Arc::new(FakeConnection {
            session_id,
            fresh_history,
            transport: transport.clone(),
            events: tx,
        }));
        Ok((transport, rx))
    }
}

/// Uploader that keeps payloads in memory and hands back stable URLs.
#[derive(Default)]
pub struct MemoryUploader {
    pub uploads: Mutex<Vec<(usize, String)>>,
}

#[async_trait]
impl MediaUploader for MemoryUploader {
    async fn upload(
        &self,
        data: Vec<u8>,
        content_type_hint: &str,
    ) -> Result<String, anyhow::Error> {
        let mut uploads = self.uploads.lock().unwrap();
        let url = format!("mem://upload/{}", uploads.len());
        uploads.push((data.len(), content_type_hint.to_string()));
        Ok(url)
    }
}

pub struct TestHarness {
    pub supervisor: Arc<Supervisor>,
    pub db: Arc<Database>,
    pub factory: Arc<FakeFactory>,
    pub uploader: Arc<MemoryUploader>,
    // Held for the lifetime of the harness so scratch files stay alive.
    _dir: tempfile::TempDir,
}

/// Fast-timer config so lifecycle tests run in milliseconds.
pub fn test_config() -> Config {
    Config {
        reconnect_delay: Duration::from_millis(30),
        keepalive_interval: Duration::from_millis(40),
        read_receipt_delay: Duration::from_millis(5),
        ..Config::default()
    }
}

pub async fn harness() -> TestHarness {
    harness_with_config(test_config()).await
}

pub async fn harness_with_config(config: Config) -> TestHarness {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("chatvault-test.db");
    let db = Arc::new(
        Database::new(db_path.to_str().unwrap())
            .await
            .expect("database should initialize"),
    );
    let credentials = Arc::new(
        FileCredentialStore::new(dir.path().join("creds"))
            .await
            .expect("credential store"),
    );
    let factory = FakeFactory::new();
    let uploader = Arc::new(MemoryUploader::default());

    let supervisor = Supervisor::new(
        db.clone(),
        credentials,
        factory.clone(),
        uploader.clone(),
        Arc::new(RawQrRenderer),
        config,
    );

    TestHarness {
        supervisor,
        db,
        factory,
        uploader,
        _dir: dir,
    }
}

/// Polls a condition until it holds or the timeout elapses.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Async variant for conditions that must query the store.
pub async fn wait_until_async<F, Fut>(timeout: Duration, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond().await {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn jid(raw: &str) -> Jid {
    raw.parse().expect("test JID should parse")
}
