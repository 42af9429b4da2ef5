//! Chat transport ports.
//!
//! The protocol client (wire format, cryptography, pairing) lives behind
//! these traits. A transport opens sessions; a session sends payloads and
//! reports everything else as [`SessionEvent`]s on its event channel.

use std::path::PathBuf;

use tokio::sync::mpsc;
use vitrine_types::conversation::ConversationId;
use vitrine_types::error::TransportError;
use vitrine_types::message::MessagePayload;
use vitrine_types::session::SessionEvent;

/// What a transport needs to open a session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Label announced for the linked device.
    pub device_label: String,
    /// Local credential directory the protocol client resumes from.
    pub auth_dir: PathBuf,
}

/// A freshly opened session and its event stream.
///
/// The stream ends when the session is gone for good.
pub struct Connection<S> {
    pub session: S,
    pub events: mpsc::Receiver<SessionEvent>,
}

/// One live protocol connection.
pub trait ChatSession: Send + Sync {
    /// Deliver a payload to a conversation.
    fn send(
        &self,
        destination: &ConversationId,
        payload: &MessagePayload,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Tear the connection down. Must be idempotent.
    fn close(&self) -> impl std::future::Future<Output = ()> + Send;
}

/// Factory for sessions.
pub trait ChatTransport: Send + Sync {
    type Session: ChatSession + 'static;

    /// Open a new session. Each call yields a distinct session instance.
    fn connect(
        &self,
        options: &ConnectOptions,
    ) -> impl std::future::Future<Output = Result<Connection<Self::Session>, TransportError>> + Send;
}
