//! Session supervision and command routing for Vitrine.
//!
//! This crate defines the "ports" (transport, object store, filesystem and
//! command handler traits) that the infrastructure layer implements, plus the
//! stateful pieces built on top of them. It depends only on `vitrine-types`
//! -- never on `vitrine-infra` or any network/IO crate.

pub mod command;
pub mod fs;
pub mod session;
pub mod storage;
