//! Per-message command dispatch.
//!
//! The router owns the command table, the group readiness cache and the
//! side-channel inspectors. One call to [`CommandRouter::route`] handles one
//! inbound message end to end and never fails: handler errors and panics
//! are contained here and turned into a single generic reply.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::{debug, info, warn};
use vitrine_types::config::CommandsConfig;
use vitrine_types::error::HandlerError;
use vitrine_types::message::{InboundMessage, MessagePayload};

use super::handler::{BoxCommandHandler, CommandContext};
use super::normalize::{NormalizedText, normalize};
use super::readiness::GroupReadinessCache;
use super::table::{CommandTable, CommandWeight};
use crate::session::outbox::Outbox;

/// Name used in logs and contexts for the anti-abuse side channel.
pub const ABUSE_SCAN: &str = "abuse_scan";
/// Name used in logs and contexts for the receipt-image side channel.
pub const RECEIPT_IMAGE: &str = "receipt_image";

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// No text to match.
    Ignored,
    /// Text did not match any route.
    NoMatch,
    /// Heavy command in a group that is not warmed up yet.
    Skipped { command: String },
    Handled { command: String },
    /// The handler failed; the generic error reply was sent or queued.
    Failed { command: String },
}

pub struct CommandRouter {
    table: CommandTable,
    readiness: GroupReadinessCache,
    outbox: Outbox,
    abuse_scan: Option<BoxCommandHandler>,
    receipt_handler: Option<BoxCommandHandler>,
    error_reply: String,
}

impl CommandRouter {
    pub fn new(table: CommandTable, outbox: Outbox) -> Self {
        Self {
            table,
            readiness: GroupReadinessCache::default(),
            outbox,
            abuse_scan: None,
            receipt_handler: None,
            error_reply: CommandsConfig::default().error_reply,
        }
    }

    pub fn with_readiness(mut self, readiness: GroupReadinessCache) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_abuse_scan(mut self, handler: BoxCommandHandler) -> Self {
        self.abuse_scan = Some(handler);
        self
    }

    pub fn with_receipt_handler(mut self, handler: BoxCommandHandler) -> Self {
        self.receipt_handler = Some(handler);
        self
    }

    pub fn with_error_reply(mut self, reply: impl Into<String>) -> Self {
        self.error_reply = reply.into();
        self
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub fn readiness(&self) -> &GroupReadinessCache {
        &self.readiness
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Process one inbound message.
    pub async fn route(&self, message: InboundMessage) -> RouteOutcome {
        let normalized = normalize(&message.content);

        self.run_side_channels(&message, normalized.as_ref()).await;

        let Some(text) = normalized else {
            return RouteOutcome::Ignored;
        };

        let is_group = message.conversation.is_group();
        let Some(route) = self.table.find(&text, is_group) else {
            return RouteOutcome::NoMatch;
        };
        let command = route.name.clone();

        let mut rich_media_allowed = true;
        if is_group && !self.readiness.ensure_ready(&message.conversation, &self.outbox).await {
            match route.weight {
                CommandWeight::Lightweight => rich_media_allowed = false,
                CommandWeight::Heavy => {
                    debug!(
                        conversation = %message.conversation,
                        command = %command,
                        "group not ready, skipping heavy command"
                    );
                    return RouteOutcome::Skipped { command };
                }
            }
        }

        info!(
            conversation = %message.conversation,
            sender = %message.sender,
            command = %command,
            "dispatching command"
        );

        let conversation = message.conversation.clone();
        let ctx = CommandContext {
            command: command.clone(),
            message,
            text,
            rich_media_allowed,
            outbox: self.outbox.clone(),
        };

        match invoke(&route.handler, &ctx).await {
            Ok(()) => RouteOutcome::Handled { command },
            Err(e) => {
                warn!(
                    conversation = %conversation,
                    command = %command,
                    error = %e,
                    "command handler failed"
                );
                self.outbox
                    .send(&conversation, MessagePayload::text(self.error_reply.clone()))
                    .await;
                RouteOutcome::Failed { command }
            }
        }
    }

    /// Inspectors that see messages regardless of the command table. Their
    /// failures are logged and never answered.
    async fn run_side_channels(&self, message: &InboundMessage, text: Option<&NormalizedText>) {
        if let Some(scan) = &self.abuse_scan {
            self.run_side_channel(ABUSE_SCAN, scan, message, text).await;
        }

        if message.content.is_image()
            && message.conversation.is_group()
            && let Some(receipts) = &self.receipt_handler
        {
            self.run_side_channel(RECEIPT_IMAGE, receipts, message, text)
                .await;
        }
    }

    async fn run_side_channel(
        &self,
        name: &str,
        handler: &BoxCommandHandler,
        message: &InboundMessage,
        text: Option<&NormalizedText>,
    ) {
        let ctx = CommandContext {
            command: name.to_string(),
            message: message.clone(),
            text: text.cloned().unwrap_or_default(),
            rich_media_allowed: true,
            outbox: self.outbox.clone(),
        };
        if let Err(e) = invoke(handler, &ctx).await {
            warn!(
                conversation = %message.conversation,
                side_channel = name,
                error = %e,
                "side channel failed"
            );
        }
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("routes", &self.table.names())
            .field("abuse_scan", &self.abuse_scan.is_some())
            .field("receipt_handler", &self.receipt_handler.is_some())
            .finish_non_exhaustive()
    }
}

/// Run a handler with panics converted into [`HandlerError::Panicked`].
async fn invoke(handler: &BoxCommandHandler, ctx: &CommandContext) -> Result<(), HandlerError> {
    match AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(HandlerError::Panicked),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use vitrine_types::conversation::ConversationId;
    use vitrine_types::message::InboundContent;

    use super::*;
    use crate::command::handler::CommandHandler;
    use crate::command::table::{StorefrontCommand, storefront_table};
    use crate::session::outbox::tests::{FakeSession, attached_outbox};

    pub(crate) const DIRECT: &str = "5511999990000@s.whatsapp.net";
    pub(crate) const GROUP: &str = "120363000000000000@g.us";

    pub(crate) fn text_message(conversation: &str, text: &str) -> InboundMessage {
        message(conversation, InboundContent::Text { text: text.into() })
    }

    pub(crate) fn message(conversation: &str, content: InboundContent) -> InboundMessage {
        InboundMessage {
            id: "3EB0C0FFEE".into(),
            conversation: ConversationId::new(conversation),
            sender: "5511988887777@s.whatsapp.net".into(),
            sender_name: Some("Cliente".into()),
            from_self: false,
            timestamp: Utc::now(),
            content,
        }
    }

    /// Records `(command, rich_media_allowed)` for every call.
    #[derive(Clone, Default)]
    pub(crate) struct Recorder {
        pub calls: Arc<Mutex<Vec<(String, bool)>>>,
    }

    impl Recorder {
        pub fn commands(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(c, _)| c.clone())
                .collect()
        }
    }

    impl CommandHandler for Recorder {
        async fn handle(&self, ctx: &CommandContext) -> Result<(), HandlerError> {
            self.calls
                .lock()
                .unwrap()
                .push((ctx.command.clone(), ctx.rich_media_allowed));
            Ok(())
        }
    }

    struct Failing;

    impl CommandHandler for Failing {
        async fn handle(&self, _ctx: &CommandContext) -> Result<(), HandlerError> {
            Err(HandlerError::Failed("catalog unavailable".into()))
        }
    }

    struct Panicking;

    impl CommandHandler for Panicking {
        async fn handle(&self, _ctx: &CommandContext) -> Result<(), HandlerError> {
            panic!("handler bug");
        }
    }

    fn router_with(recorder: &Recorder, outbox: Outbox) -> CommandRouter {
        let recorder = recorder.clone();
        CommandRouter::new(
            storefront_table(move |_| BoxCommandHandler::new(recorder.clone())),
            outbox,
        )
    }

    #[tokio::test]
    async fn dispatches_matching_command() {
        let fake = Arc::new(FakeSession::default());
        let outbox = attached_outbox(&fake).await;
        outbox.mark_ready_and_flush().await;
        let recorder = Recorder::default();
        let router = router_with(&recorder, outbox);

        assert_eq!(
            router.route(text_message(DIRECT, "@TABELA")).await,
            RouteOutcome::Handled {
                command: "tabela".into()
            }
        );
        router.route(text_message(DIRECT, ".compra abc")).await;
        router.route(text_message(DIRECT, "@grupo on")).await;

        assert_eq!(recorder.commands(), vec!["tabela", "compra2", "grupo"]);
    }

    #[tokio::test]
    async fn unmatched_text_invokes_nothing_and_replies_nothing() {
        let fake = Arc::new(FakeSession::default());
        let outbox = attached_outbox(&fake).await;
        let recorder = Recorder::default();
        let router = router_with(&recorder, outbox.clone());

        assert_eq!(
            router.route(text_message(DIRECT, "hello")).await,
            RouteOutcome::NoMatch
        );
        assert!(recorder.commands().is_empty());
        assert!(outbox.pending().is_empty().await);
        assert!(fake.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn content_without_text_is_ignored() {
        let outbox = Outbox::new();
        let recorder = Recorder::default();
        let router = router_with(&recorder, outbox);

        assert_eq!(
            router.route(message(DIRECT, InboundContent::Other)).await,
            RouteOutcome::Ignored
        );
        assert_eq!(
            router.route(text_message(DIRECT, "\u{200b} ")).await,
            RouteOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn failing_handler_yields_exactly_one_error_reply() {
        let fake = Arc::new(FakeSession::default());
        let outbox = attached_outbox(&fake).await;
        outbox.mark_ready_and_flush().await;
        let recorder = Recorder::default();
        let other = recorder.clone();
        let router = CommandRouter::new(
            storefront_table(move |command| match command {
                StorefrontCommand::Pagamentos => BoxCommandHandler::new(Failing),
                _ => BoxCommandHandler::new(other.clone()),
            }),
            outbox,
        )
        .with_error_reply("erro");

        assert_eq!(
            router.route(text_message(DIRECT, "@pagamentos")).await,
            RouteOutcome::Failed {
                command: "pagamentos".into()
            }
        );
        assert_eq!(fake.sent_texts(), vec!["erro"]);

        // The next message is unaffected.
        router.route(text_message(DIRECT, "@tabela")).await;
        assert_eq!(recorder.commands(), vec!["tabela"]);
        assert_eq!(fake.sent_texts(), vec!["erro"]);
    }

    #[tokio::test]
    async fn panicking_handler_is_contained_and_reply_is_queued_when_not_ready() {
        let fake = Arc::new(FakeSession::default());
        let outbox = attached_outbox(&fake).await;
        let router = CommandRouter::new(
            storefront_table(|_| BoxCommandHandler::new(Panicking)),
            outbox.clone(),
        );

        assert_eq!(
            router.route(text_message(DIRECT, "@todos")).await,
            RouteOutcome::Failed {
                command: "todos".into()
            }
        );
        let queued = outbox.pending().drain().await;
        assert_eq!(queued.len(), 1);
        assert_eq!(
            queued[0].payload,
            MessagePayload::text(CommandsConfig::default().error_reply)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unready_group_runs_lightweight_without_media_and_skips_heavy() {
        // Outbox not ready, so the warm-up send fails.
        let fake = Arc::new(FakeSession::default());
        let outbox = attached_outbox(&fake).await;
        let recorder = Recorder::default();
        let router = router_with(&recorder, outbox.clone());

        assert_eq!(
            router.route(text_message(GROUP, "@tabela")).await,
            RouteOutcome::Skipped {
                command: "tabela".into()
            }
        );
        assert_eq!(
            router.route(text_message(GROUP, "@pagamentos")).await,
            RouteOutcome::Handled {
                command: "pagamentos".into()
            }
        );

        assert_eq!(
            recorder.calls.lock().unwrap().clone(),
            vec![("pagamentos".to_string(), false)]
        );
        // Skipping is silent.
        assert!(outbox.pending().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_group_runs_heavy_commands_with_media() {
        let fake = Arc::new(FakeSession::default());
        let outbox = attached_outbox(&fake).await;
        outbox.mark_ready_and_flush().await;
        let recorder = Recorder::default();
        let router = router_with(&recorder, outbox);

        router.route(text_message(GROUP, "@todos")).await;
        router.route(text_message(GROUP, "@tabela")).await;

        assert_eq!(
            recorder.calls.lock().unwrap().clone(),
            vec![("todos".to_string(), true), ("tabela".to_string(), true)]
        );
        // One warm-up for the group, not one per message.
        assert_eq!(fake.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn side_channels_see_messages_and_their_failures_are_silent() {
        let fake = Arc::new(FakeSession::default());
        let outbox = attached_outbox(&fake).await;
        outbox.mark_ready_and_flush().await;
        let scans = Recorder::default();
        let receipts = Recorder::default();
        let commands = Recorder::default();
        let router = router_with(&commands, outbox)
            .with_abuse_scan(BoxCommandHandler::new(scans.clone()))
            .with_receipt_handler(BoxCommandHandler::new(receipts.clone()));

        let image = InboundContent::Image {
            caption: None,
            mime_type: Some("image/jpeg".into()),
            url: None,
        };
        router.route(message(DIRECT, image.clone())).await;
        router.route(message(GROUP, image)).await;
        router.route(text_message(DIRECT, "oi")).await;

        assert_eq!(scans.commands().len(), 3);
        assert_eq!(receipts.commands(), vec![RECEIPT_IMAGE]);

        let failing = CommandRouter::new(CommandTable::new(), Outbox::new())
            .with_abuse_scan(BoxCommandHandler::new(Failing));
        assert_eq!(
            failing.route(text_message(DIRECT, "oi")).await,
            RouteOutcome::NoMatch
        );
        assert!(failing.outbox().pending().is_empty().await);
        assert!(fake.sent_texts().is_empty());
    }
}
