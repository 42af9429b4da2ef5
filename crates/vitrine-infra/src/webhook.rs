//! Business commands served over HTTP.
//!
//! The storefront logic (catalogue, orders, payments) lives in a separate
//! service. [`WebhookCommandHandler`] forwards each routed command to it as
//! a JSON POST and sends whatever replies come back through the outbox.
//!
//! Requests are signed with HMAC-SHA256 over the raw body when a secret is
//! configured: `X-Vitrine-Signature: sha256=<hex>`.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};
use vitrine_core::command::{CommandContext, CommandHandler};
use vitrine_types::conversation::ConversationId;
use vitrine_types::error::HandlerError;
use vitrine_types::message::MessagePayload;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-vitrine-signature";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("invalid webhook URL: {0}")]
    InvalidUrl(String),

    #[error("failed to create HTTP client: {0}")]
    Client(String),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// What the business service receives for one command.
#[derive(Debug, Serialize)]
pub struct WebhookRequest<'a> {
    pub command: &'a str,
    pub message_id: &'a str,
    pub conversation: &'a ConversationId,
    pub sender: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<&'a str>,
    /// Normalized text, original case.
    pub text: &'a str,
    /// Everything after the command word.
    pub arguments: &'a str,
    pub is_group: bool,
    pub has_image: bool,
    pub rich_media_allowed: bool,
}

impl<'a> WebhookRequest<'a> {
    pub fn from_context(ctx: &'a CommandContext) -> Self {
        Self {
            command: &ctx.command,
            message_id: &ctx.message.id,
            conversation: &ctx.message.conversation,
            sender: &ctx.message.sender,
            sender_name: ctx.message.sender_name.as_deref(),
            text: &ctx.text.original,
            arguments: ctx.text.arguments(),
            is_group: ctx.is_group(),
            has_image: ctx.message.content.is_image(),
            rich_media_allowed: ctx.rich_media_allowed,
        }
    }
}

/// What the business service answers.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookResponse {
    #[serde(default)]
    pub replies: Vec<WebhookReply>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookReply {
    /// Defaults to the conversation the command came from.
    #[serde(default)]
    pub to: Option<ConversationId>,
    pub payload: MessagePayload,
}

/// [`CommandHandler`] that POSTs the command to a business endpoint.
#[derive(Clone)]
pub struct WebhookCommandHandler {
    client: reqwest::Client,
    url: Url,
    secret: Option<SecretString>,
}

impl WebhookCommandHandler {
    pub fn new(
        url: &str,
        timeout: Duration,
        secret: Option<SecretString>,
    ) -> Result<Self, WebhookError> {
        let url = Url::parse(url).map_err(|e| WebhookError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(WebhookError::InvalidUrl(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        if let Some(secret) = &secret {
            // Fail at startup rather than on the first command.
            compute_signature(secret.expose_secret().as_bytes(), b"")?;
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebhookError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url,
            secret,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn call(&self, ctx: &CommandContext) -> Result<WebhookResponse, HandlerError> {
        let body = serde_json::to_vec(&WebhookRequest::from_context(ctx))
            .map_err(|e| HandlerError::Failed(format!("failed to encode request: {e}")))?;

        let mut request = self
            .client
            .post(self.url.clone())
            .header("content-type", "application/json");
        if let Some(secret) = &self.secret {
            let signature = compute_signature(secret.expose_secret().as_bytes(), &body)
                .map_err(|e| HandlerError::Failed(e.to_string()))?;
            request = request.header(SIGNATURE_HEADER, format!("sha256={signature}"));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| HandlerError::Failed(format!("webhook request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| HandlerError::Failed(format!("failed to read webhook response: {e}")))?;
        if !status.is_success() {
            return Err(HandlerError::Failed(format!(
                "webhook returned {status}: {}",
                truncate(&text, 200)
            )));
        }

        parse_response(&text)
    }
}

impl CommandHandler for WebhookCommandHandler {
    async fn handle(&self, ctx: &CommandContext) -> Result<(), HandlerError> {
        let response = self.call(ctx).await?;
        debug!(
            command = %ctx.command,
            replies = response.replies.len(),
            "webhook answered"
        );

        for reply in response.replies {
            let Some(payload) = shape_reply(reply.payload, ctx.rich_media_allowed) else {
                warn!(
                    command = %ctx.command,
                    conversation = %ctx.message.conversation,
                    "dropping media reply for a group that is not ready"
                );
                continue;
            };
            let destination = reply.to.unwrap_or_else(|| ctx.message.conversation.clone());
            ctx.outbox.send(&destination, payload).await;
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebhookCommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookCommandHandler")
            .field("url", &self.url.as_str())
            .field("signed", &self.secret.is_some())
            .finish()
    }
}

/// An empty body means no replies.
fn parse_response(body: &str) -> Result<WebhookResponse, HandlerError> {
    if body.trim().is_empty() {
        return Ok(WebhookResponse::default());
    }
    serde_json::from_str(body)
        .map_err(|e| HandlerError::Failed(format!("invalid webhook response: {e}")))
}

/// Fit a reply to what the conversation can take right now.
///
/// Without rich media, a captioned image degrades to its caption and other
/// media is dropped.
fn shape_reply(payload: MessagePayload, rich_media_allowed: bool) -> Option<MessagePayload> {
    if rich_media_allowed || !payload.is_rich_media() {
        return Some(payload);
    }
    match payload {
        MessagePayload::Image {
            caption: Some(caption),
            ..
        } if !caption.trim().is_empty() => Some(MessagePayload::text(caption)),
        _ => None,
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// HMAC-SHA256 of `body`, lowercase hex.
pub fn compute_signature(secret: &[u8], body: &[u8]) -> Result<String, WebhookError> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|e| WebhookError::InvalidKey(e.to_string()))?;
    mac.update(body);
    Ok(hex_encode(&mac.finalize().into_bytes()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use vitrine_core::command::NormalizedText;
    use vitrine_core::session::Outbox;
    use vitrine_types::message::{InboundContent, InboundMessage, MediaSource, PendingReply};

    use super::*;

    fn context(conversation: &str, text: &str, rich_media_allowed: bool) -> CommandContext {
        CommandContext {
            command: "comprar".to_string(),
            message: InboundMessage {
                id: "ABC123".to_string(),
                conversation: ConversationId::new(conversation),
                sender: "5511988887777@s.whatsapp.net".to_string(),
                sender_name: Some("Ana".to_string()),
                from_self: false,
                timestamp: Utc::now(),
                content: InboundContent::Text {
                    text: text.to_string(),
                },
            },
            text: NormalizedText::new(text),
            rich_media_allowed,
            outbox: Outbox::new(),
        }
    }

    fn image(caption: Option<&str>) -> MessagePayload {
        MessagePayload::Image {
            media: MediaSource::Url {
                url: "https://cdn.example.com/tabela.png".to_string(),
            },
            caption: caption.map(str::to_string),
        }
    }

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/commands", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if raw.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8(raw).unwrap()
        });
        (url, server)
    }

    #[test]
    fn signature_matches_rfc4231_vector() {
        // RFC 4231 test case 2.
        let signature = compute_signature(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn request_carries_message_details() {
        let ctx = context("120363@g.us", "\u{200e}.Comprar 2 Camisa", false);
        let json = serde_json::to_value(WebhookRequest::from_context(&ctx)).unwrap();

        assert_eq!(json["command"], "comprar");
        assert_eq!(json["conversation"], "120363@g.us");
        assert_eq!(json["text"], ".Comprar 2 Camisa");
        assert_eq!(json["arguments"], "2 Camisa");
        assert_eq!(json["sender_name"], "Ana");
        assert_eq!(json["is_group"], true);
        assert_eq!(json["has_image"], false);
        assert_eq!(json["rich_media_allowed"], false);
    }

    #[test]
    fn media_is_downgraded_when_not_allowed() {
        assert_eq!(
            shape_reply(image(Some("Tabela de hoje")), false),
            Some(MessagePayload::text("Tabela de hoje"))
        );
        assert_eq!(shape_reply(image(None), false), None);
        assert_eq!(shape_reply(image(Some("  ")), false), None);
        assert_eq!(
            shape_reply(image(Some("Tabela")), true),
            Some(image(Some("Tabela")))
        );
        assert_eq!(
            shape_reply(MessagePayload::text("oi"), false),
            Some(MessagePayload::text("oi"))
        );
    }

    #[test]
    fn empty_body_means_no_replies() {
        assert!(parse_response("").unwrap().replies.is_empty());
        assert!(parse_response("{}").unwrap().replies.is_empty());
        assert!(matches!(
            parse_response("<html>"),
            Err(HandlerError::Failed(_))
        ));
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(WebhookCommandHandler::new("ftp://x", Duration::from_secs(1), None).is_err());
        assert!(WebhookCommandHandler::new("nope", Duration::from_secs(1), None).is_err());
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let handler = WebhookCommandHandler::new(
            "https://shop.example.com/hook",
            Duration::from_secs(1),
            Some(SecretString::from("s3cret".to_string())),
        )
        .unwrap();
        let debug = format!("{handler:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("signed: true"));
    }

    #[tokio::test]
    async fn replies_are_sent_through_the_outbox() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"replies":[{"payload":{"kind":"text","text":"Pedido anotado"}},{"to":"5511988887777@s.whatsapp.net","payload":{"kind":"text","text":"Obrigado!"}},{"payload":{"kind":"image","media":{"source":"url","url":"https://cdn.example.com/p.png"}}}]}"#,
        )
        .await;
        let handler = WebhookCommandHandler::new(
            &url,
            Duration::from_secs(5),
            Some(SecretString::from("s3cret".to_string())),
        )
        .unwrap();
        let ctx = context("120363@g.us", ".comprar 2 Camisa", false);

        handler.handle(&ctx).await.unwrap();

        let raw = server.await.unwrap();
        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        let expected = compute_signature(b"s3cret", body.as_bytes()).unwrap();
        assert!(
            head.to_ascii_lowercase()
                .contains(&format!("{SIGNATURE_HEADER}: sha256={expected}"))
        );

        // The outbox is not attached, so replies are parked in order.
        let parked = ctx.outbox.pending().drain().await;
        assert_eq!(
            parked,
            vec![
                PendingReply {
                    destination: ConversationId::new("120363@g.us"),
                    payload: MessagePayload::text("Pedido anotado"),
                },
                PendingReply {
                    destination: ConversationId::new("5511988887777@s.whatsapp.net"),
                    payload: MessagePayload::text("Obrigado!"),
                },
            ]
        );
    }

    #[tokio::test]
    async fn error_status_fails_the_handler() {
        let (url, server) = serve_once("500 Internal Server Error", r#"{"error":"db down"}"#).await;
        let handler = WebhookCommandHandler::new(&url, Duration::from_secs(5), None).unwrap();
        let ctx = context("5511988887777@s.whatsapp.net", ".estoque", true);

        let err = handler.handle(&ctx).await.unwrap_err();

        assert!(matches!(err, HandlerError::Failed(ref m) if m.contains("500")));
        assert!(!server.await.unwrap().to_ascii_lowercase().contains(SIGNATURE_HEADER));
        assert!(ctx.outbox.pending().is_empty().await);
    }
}
