//! Shared domain types for Vitrine.
//!
//! Conversations, inbound messages, outbound payloads, session lifecycle
//! events, credential sets, configuration and the error enums shared by the
//! core and infrastructure crates.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod conversation;
pub mod credential;
pub mod error;
pub mod message;
pub mod session;
