//! BoxChatSession -- object-safe dynamic dispatch wrapper for ChatSession.
//!
//! Same blanket-impl pattern as `BoxCommandHandler`:
//! 1. Define an object-safe `ChatSessionDyn` trait with boxed futures
//! 2. Blanket-impl `ChatSessionDyn` for all `T: ChatSession`
//! 3. `BoxChatSession` wraps `Box<dyn ChatSessionDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use vitrine_types::conversation::ConversationId;
use vitrine_types::error::TransportError;
use vitrine_types::message::MessagePayload;

use super::transport::ChatSession;

/// Object-safe version of [`ChatSession`] with boxed futures.
pub trait ChatSessionDyn: Send + Sync {
    fn send_boxed<'a>(
        &'a self,
        destination: &'a ConversationId,
        payload: &'a MessagePayload,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

    fn close_boxed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl<T: ChatSession> ChatSessionDyn for T {
    fn send_boxed<'a>(
        &'a self,
        destination: &'a ConversationId,
        payload: &'a MessagePayload,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(self.send(destination, payload))
    }

    fn close_boxed(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.close())
    }
}

/// Type-erased session, so the outbox does not carry the transport's type.
pub struct BoxChatSession {
    inner: Box<dyn ChatSessionDyn>,
}

impl BoxChatSession {
    pub fn new<T: ChatSession + 'static>(session: T) -> Self {
        Self {
            inner: Box::new(session),
        }
    }

    pub async fn send(
        &self,
        destination: &ConversationId,
        payload: &MessagePayload,
    ) -> Result<(), TransportError> {
        self.inner.send_boxed(destination, payload).await
    }

    pub async fn close(&self) {
        self.inner.close_boxed().await
    }
}

impl std::fmt::Debug for BoxChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxChatSession").finish_non_exhaustive()
    }
}
