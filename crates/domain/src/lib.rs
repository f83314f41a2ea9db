//! Shared domain types for the NextAI gateway.
//!
//! Everything that crosses a crate boundary lives here: chats and their
//! message history, agent requests and their event stream, provider entries,
//! cron job specs/state, channel configuration, and the shared error enum
//! with stable wire codes.

pub mod agent;
pub mod channel;
pub mod chat;
pub mod cron;
pub mod error;
pub mod provider;
pub mod tool;

pub use error::{Error, Result};
