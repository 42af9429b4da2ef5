//! Status server: a human-readable page and a JSON health probe.

pub mod handlers;
pub mod router;
