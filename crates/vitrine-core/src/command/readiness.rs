//! Group readiness cache.
//!
//! Groups need one warm-up send before heavier payloads are delivered
//! reliably. The cache probes once per conversation, remembers success for
//! the process lifetime, and throttles retries with a cooldown so bursty
//! traffic does not turn into a storm of warm-up attempts.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::{debug, warn};
use vitrine_types::config::ReadinessConfig;
use vitrine_types::conversation::ConversationId;
use vitrine_types::error::TransportError;
use vitrine_types::message::{MessagePayload, Presence};

use crate::session::outbox::Outbox;

/// The warm-up send for one conversation.
pub trait WarmUp: Send + Sync {
    fn warm_up(
        &self,
        conversation: &ConversationId,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}

/// Warm-up through the outbox is a presence update. It bypasses the
/// pending queue: a warm-up that cannot go out now is simply a failure.
impl WarmUp for Outbox {
    async fn warm_up(&self, conversation: &ConversationId) -> Result<(), TransportError> {
        self.send_direct(
            conversation,
            &MessagePayload::Presence {
                state: Presence::Available,
            },
        )
        .await
    }
}

/// Per-conversation warm-up state.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessRecord {
    /// Never goes back to false once set.
    pub ready: bool,
    pub last_attempt_at: Instant,
}

#[derive(Debug)]
pub struct GroupReadinessCache {
    records: DashMap<ConversationId, ReadinessRecord>,
    cooldown: Duration,
}

impl Default for GroupReadinessCache {
    fn default() -> Self {
        Self::from(&ReadinessConfig::default())
    }
}

impl From<&ReadinessConfig> for GroupReadinessCache {
    fn from(config: &ReadinessConfig) -> Self {
        Self::new(Duration::from_secs(config.cooldown_secs))
    }
}

impl GroupReadinessCache {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            records: DashMap::new(),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn record(&self, conversation: &ConversationId) -> Option<ReadinessRecord> {
        self.records.get(conversation).map(|r| *r)
    }

    /// Whether `conversation` may receive heavy payloads, warming it up if
    /// needed.
    ///
    /// Non-group conversations are always ready. The attempt is recorded
    /// under the map's entry lock before the warm-up is awaited, so
    /// concurrent callers inside the cooldown window see the attempt and
    /// back off instead of probing again.
    pub async fn ensure_ready<W: WarmUp>(&self, conversation: &ConversationId, warm: &W) -> bool {
        if !conversation.is_group() {
            return true;
        }

        let now = Instant::now();
        match self.records.entry(conversation.clone()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.ready {
                    return true;
                }
                if now.duration_since(record.last_attempt_at) < self.cooldown {
                    debug!(conversation = %conversation, "warm-up attempted recently, skipping");
                    return false;
                }
                record.last_attempt_at = now;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ReadinessRecord {
                    ready: false,
                    last_attempt_at: now,
                });
            }
        }

        match warm.warm_up(conversation).await {
            Ok(()) => {
                if let Some(mut record) = self.records.get_mut(conversation) {
                    record.ready = true;
                }
                debug!(conversation = %conversation, "group warmed up");
                true
            }
            Err(e) => {
                warn!(conversation = %conversation, error = %e, "group warm-up failed");
                false
            }
        }
    }
}
