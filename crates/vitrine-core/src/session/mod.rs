//! Session lifecycle: transport ports, reconnect policy, outbound delivery
//! and the supervisor that ties them together.
//!
//! - `transport` -- `ChatTransport` / `ChatSession` ports
//! - `box_session` -- object-safe wrapper for `ChatSession`
//! - `policy` -- reconnect backoff and attempt accounting
//! - `delivery` -- FIFO queue of replies produced while not ready
//! - `outbox` -- the readiness-gated `send` capability
//! - `supervisor` -- the lifecycle state machine

pub mod box_session;
pub mod delivery;
pub mod outbox;
pub mod policy;
pub mod supervisor;
pub mod transport;

pub use box_session::BoxChatSession;
pub use delivery::PendingDeliveryQueue;
pub use outbox::{Outbox, SendOutcome};
pub use policy::{ReconnectDecision, ReconnectPolicy, ReconnectState};
pub use supervisor::SessionSupervisor;
pub use transport::{ChatSession, ChatTransport, ConnectOptions, Connection};
