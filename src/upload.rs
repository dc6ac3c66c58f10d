//! Media upload collaborator.
//!
//! The actual object store is external; a failed upload must never abort
//! message persistence, so callers store the message without a media URL
//! instead of dropping it.

use async_trait::async_trait;

use crate::types::message::MediaKind;

/// Placeholder URL stored for media carried in a bulk history batch, where
/// uploading inline would stall the pipeline on network calls. The binary
/// can be fetched on demand later.
pub fn history_media_placeholder(kind: MediaKind) -> String {
    format!("history_sync_media_{}", kind.as_str())
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Uploads a binary payload and returns the URL it is reachable under.
    async fn upload(&self, data: Vec<u8>, content_type_hint: &str)
    -> Result<String, anyhow::Error>;
}

/// Discards media payloads; used where no object store is configured.
#[derive(Debug, Default)]
pub struct NoopUploader;

#[async_trait]
impl MediaUploader for NoopUploader {
    async fn upload(
        &self,
        _data: Vec<u8>,
        _content_type_hint: &str,
    ) -> Result<String, anyhow::Error> {
        Err(anyhow::anyhow!("no media uploader configured"))
    }
}
