//! Infrastructure adapters for Vitrine.
//!
//! Implements the ports defined in `vitrine-core`:
//! - `filesystem` -- `FileSystem` over `tokio::fs`, data dir resolution
//! - `blob` -- `ObjectStore` backends (local directory, Azure Blob Storage)
//! - `bridge` -- `ChatTransport` backed by a JSON Lines sidecar process
//! - `webhook` -- `CommandHandler` that forwards commands over HTTP
//! - `config` -- `vitrine.toml` loading and environment overrides

pub mod blob;
pub mod bridge;
pub mod config;
pub mod filesystem;
pub mod webhook;
