//! Multi-session chat recorder.
//!
//! Keeps one persistent protocol connection per linked account and records
//! every chat and message it observes into a relational store, with
//! idempotent, at-least-once ingestion that survives disconnects and
//! process restarts. The protocol itself lives behind the traits in
//! [`transport`].

pub mod config;
pub mod directory;
pub mod ingest;
pub mod qrcode;
pub mod resolver;
pub mod store;
pub mod transport;
pub mod types;
pub mod upload;

// Supervisor internals are split across a few files, one concern each.
pub mod supervisor;
mod keepalive;
mod send;
mod history_sync;

pub use config::Config;
pub use store::Database;
pub use supervisor::{Supervisor, SupervisorError};
