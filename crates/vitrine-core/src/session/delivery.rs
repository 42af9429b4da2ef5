//! Pending delivery queue.
//!
//! Replies produced while the session is not ready wait here and are flushed
//! in insertion order once the session opens. Delivery is best-effort: a
//! flush attempts each entry exactly once and then forgets it.

use std::collections::VecDeque;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use vitrine_types::message::PendingReply;

use super::box_session::BoxChatSession;

/// Outcome of one flush.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
}

/// FIFO of replies waiting for readiness.
///
/// Safe to share between concurrently running message tasks.
#[derive(Debug, Default)]
pub struct PendingDeliveryQueue {
    entries: Mutex<VecDeque<PendingReply>>,
}

impl PendingDeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reply. Returns the queue length afterwards.
    pub async fn enqueue(&self, reply: PendingReply) -> usize {
        let mut entries = self.entries.lock().await;
        entries.push_back(reply);
        entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Remove and return every queued reply in FIFO order.
    pub async fn drain(&self) -> Vec<PendingReply> {
        self.entries.lock().await.drain(..).collect()
    }

    /// Deliver every queued reply through `session`, in order.
    ///
    /// The queue is emptied up front, so each entry is attempted at most
    /// once. Failures are logged and the entry is dropped.
    pub async fn flush(&self, session: &BoxChatSession) -> FlushReport {
        let pending = self.drain().await;
        let mut report = FlushReport::default();

        for reply in pending {
            match session.send(&reply.destination, &reply.payload).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        destination = %reply.destination,
                        error = %e,
                        "dropping queued reply after failed delivery"
                    );
                }
            }
        }

        if report.delivered + report.failed > 0 {
            debug!(
                delivered = report.delivered,
                failed = report.failed,
                "flushed pending replies"
            );
        }
        report
    }
}
