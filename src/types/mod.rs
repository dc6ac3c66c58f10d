pub mod events;
pub mod jid;
pub mod message;
