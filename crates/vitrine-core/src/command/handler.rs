//! Command handler port.
//!
//! Business commands are black boxes to the router: they receive a
//! [`CommandContext`] and reply through its outbox. `BoxCommandHandler`
//! follows the same blanket-impl pattern as `BoxChatSession` so handlers of
//! different types can share one routing table.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use vitrine_types::error::HandlerError;
use vitrine_types::message::{InboundMessage, MessagePayload};

use super::normalize::NormalizedText;
use crate::session::outbox::{Outbox, SendOutcome};

/// Everything a handler gets for one message.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Name of the route that matched (or of the side channel).
    pub command: String,
    pub message: InboundMessage,
    pub text: NormalizedText,
    /// False when the group is not warmed up yet; handlers should stick to
    /// plain text replies.
    pub rich_media_allowed: bool,
    pub outbox: Outbox,
}

impl CommandContext {
    /// Reply in the conversation the message came from.
    pub async fn reply(&self, payload: MessagePayload) -> SendOutcome {
        self.outbox.send(&self.message.conversation, payload).await
    }

    pub fn is_group(&self) -> bool {
        self.message.conversation.is_group()
    }
}

/// A business command (or side-channel inspector).
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait CommandHandler: Send + Sync {
    fn handle(
        &self,
        ctx: &CommandContext,
    ) -> impl std::future::Future<Output = Result<(), HandlerError>> + Send;
}

/// Object-safe version of [`CommandHandler`] with boxed futures.
pub trait CommandHandlerDyn: Send + Sync {
    fn handle_boxed<'a>(
        &'a self,
        ctx: &'a CommandContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
}

impl<T: CommandHandler> CommandHandlerDyn for T {
    fn handle_boxed<'a>(
        &'a self,
        ctx: &'a CommandContext,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(self.handle(ctx))
    }
}

/// Type-erased, cheaply cloneable command handler.
#[derive(Clone)]
pub struct BoxCommandHandler {
    inner: Arc<dyn CommandHandlerDyn>,
}

impl BoxCommandHandler {
    pub fn new<T: CommandHandler + 'static>(handler: T) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    pub async fn handle(&self, ctx: &CommandContext) -> Result<(), HandlerError> {
        self.inner.handle_boxed(ctx).await
    }
}

impl std::fmt::Debug for BoxCommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxCommandHandler").finish_non_exhaustive()
    }
}
