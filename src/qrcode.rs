//! QR rendering collaborator.
//!
//! Rendering the pairing payload into an image is external; the supervisor
//! only persists whatever the renderer returns. When rendering fails the
//! raw payload is stored instead, so a caller can still pair.

pub trait QrRenderer: Send + Sync {
    /// Renders a raw pairing payload into a storable representation
    /// (typically a data URL).
    fn render(&self, payload: &str) -> Result<String, anyhow::Error>;
}

/// Stores the raw payload untouched.
#[derive(Debug, Default)]
pub struct RawQrRenderer;

impl QrRenderer for RawQrRenderer {
    fn render(&self, payload: &str) -> Result<String, anyhow::Error> {
        Ok(payload.to_string())
    }
}
