//! Remote storage abstractions.
//!
//! Defines the object store port and the credential bridge that mirrors the
//! local credential directory through it. Store implementations live in
//! vitrine-infra.

pub mod credentials;
pub mod object_store;

pub use credentials::CredentialBridge;
pub use object_store::ObjectStore;
