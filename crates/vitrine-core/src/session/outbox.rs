//! Outbox: the readiness-gated `send` capability.
//!
//! Handlers never talk to the live session directly. They send through an
//! `Outbox`, which forwards to the session when it is ready and parks the
//! reply in the [`PendingDeliveryQueue`] otherwise. The supervisor attaches
//! each new session instance and flips readiness on open/close.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, warn};
use vitrine_types::conversation::ConversationId;
use vitrine_types::error::TransportError;
use vitrine_types::message::{MessagePayload, PendingReply};

use super::box_session::BoxChatSession;
use super::delivery::{FlushReport, PendingDeliveryQueue};

/// How a reply left the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the live session.
    Sent,
    /// Parked until the next open transition.
    Queued,
}

struct OutboxInner {
    /// Held exclusively while a flush runs, shared by every send, so no
    /// direct send overtakes replies that were queued before it.
    gate: RwLock<()>,
    ready: AtomicBool,
    session: RwLock<Option<Arc<BoxChatSession>>>,
    pending: PendingDeliveryQueue,
}

/// Cloneable handle shared by the supervisor and every handler.
#[derive(Clone)]
pub struct Outbox {
    inner: Arc<OutboxInner>,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbox {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(OutboxInner {
                gate: RwLock::new(()),
                ready: AtomicBool::new(false),
                session: RwLock::new(None),
                pending: PendingDeliveryQueue::new(),
            }),
        }
    }

    /// Whether the session currently accepts outbound sends.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> &PendingDeliveryQueue {
        &self.inner.pending
    }

    /// Install a new session instance. Readiness stays false until open.
    pub async fn attach(&self, session: Arc<BoxChatSession>) {
        self.inner.ready.store(false, Ordering::Release);
        *self.inner.session.write().await = Some(session);
    }

    /// Drop the current session instance and mark not ready.
    pub async fn detach(&self) -> Option<Arc<BoxChatSession>> {
        self.inner.ready.store(false, Ordering::Release);
        self.inner.session.write().await.take()
    }

    pub fn mark_not_ready(&self) {
        self.inner.ready.store(false, Ordering::Release);
    }

    /// Mark ready and deliver everything queued while not ready.
    pub async fn mark_ready_and_flush(&self) -> FlushReport {
        let _flushing = self.inner.gate.write().await;
        self.inner.ready.store(true, Ordering::Release);
        match self.current().await {
            Some(session) => self.inner.pending.flush(&session).await,
            None => FlushReport::default(),
        }
    }

    async fn current(&self) -> Option<Arc<BoxChatSession>> {
        self.inner.session.read().await.clone()
    }

    /// Send a reply, queueing it when the session is not ready or the direct
    /// send fails.
    pub async fn send(&self, destination: &ConversationId, payload: MessagePayload) -> SendOutcome {
        let _gate = self.inner.gate.read().await;
        if self.is_ready()
            && let Some(session) = self.current().await
        {
            match session.send(destination, &payload).await {
                Ok(()) => return SendOutcome::Sent,
                Err(e) => {
                    warn!(
                        destination = %destination,
                        error = %e,
                        "direct send failed, queueing reply"
                    );
                }
            }
        }

        let queued = self
            .inner
            .pending
            .enqueue(PendingReply {
                destination: destination.clone(),
                payload,
            })
            .await;
        debug!(destination = %destination, queued, "reply queued until session is ready");
        SendOutcome::Queued
    }

    /// Send without the queue fallback. Fails when not ready.
    pub async fn send_direct(
        &self,
        destination: &ConversationId,
        payload: &MessagePayload,
    ) -> Result<(), TransportError> {
        let _gate = self.inner.gate.read().await;
        if !self.is_ready() {
            return Err(TransportError::NotConnected);
        }
        let session = self.current().await.ok_or(TransportError::NotConnected)?;
        session.send(destination, payload).await
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}
