//! Reconnect policy: growing backoff for transient closures, immediate fresh
//! start for logouts, and a ceiling that hands recovery to the process
//! supervisor.

use std::time::Duration;

use vitrine_types::config::ReconnectConfig;
use vitrine_types::session::CloseReason;

/// Tunable backoff constants.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub growth_factor: f64,
    pub max_delay: Duration,
    /// Consecutive failed attempts tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            growth_factor: config.growth_factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (1-based).
    ///
    /// `min(base_delay * growth_factor^(attempt-1), max_delay)`. A growth
    /// factor below 1 is treated as 1 so the delay never shrinks.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.growth_factor.max(1.0).powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// What the supervisor should do after a session instance closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Transient failure: start a new instance after `delay`.
    Restart { attempt: u32, delay: Duration },
    /// Credentials were invalidated: discard them and start over right away.
    RestartFresh,
    /// Too many consecutive failures: stop and let the process exit.
    Terminate { attempts: u32 },
}

/// Attempt accounting across session instances.
#[derive(Debug, Clone, Default)]
pub struct ReconnectState {
    attempts: u32,
    logged_out: bool,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the last closure was a logout.
    pub fn logged_out(&self) -> bool {
        self.logged_out
    }

    /// A session reached open.
    pub fn on_open(&mut self) {
        self.attempts = 0;
        self.logged_out = false;
    }

    /// A session closed for `reason`.
    pub fn on_close(&mut self, reason: &CloseReason, policy: &ReconnectPolicy) -> ReconnectDecision {
        if reason.is_logout() {
            self.attempts = 0;
            self.logged_out = true;
            return ReconnectDecision::RestartFresh;
        }

        self.logged_out = false;
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts > policy.max_attempts {
            return ReconnectDecision::Terminate {
                attempts: self.attempts,
            };
        }

        ReconnectDecision::Restart {
            attempt: self.attempts,
            delay: policy.delay_for(self.attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_from_base_and_caps() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.delay_for(1), Duration::from_millis(5_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(7_500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(11_250));
        assert_eq!(policy.delay_for(6), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn delay_is_non_decreasing() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<_> = (1..=20).map(|a| policy.delay_for(a)).collect();

        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
    }

    #[test]
    fn shrinking_growth_factor_is_clamped() {
        let policy = ReconnectPolicy {
            growth_factor: 0.5,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(4), policy.base_delay);
    }

    #[test]
    fn terminates_only_after_ceiling_is_exceeded() {
        let policy = ReconnectPolicy::default();
        let mut state = ReconnectState::new();
        let reason = CloseReason::ConnectionClosed;

        for expected in 1..=10 {
            match state.on_close(&reason, &policy) {
                ReconnectDecision::Restart { attempt, .. } => assert_eq!(attempt, expected),
                other => panic!("attempt {expected}: unexpected {other:?}"),
            }
        }

        assert_eq!(
            state.on_close(&reason, &policy),
            ReconnectDecision::Terminate { attempts: 11 }
        );
    }

    #[test]
    fn open_resets_attempts() {
        let policy = ReconnectPolicy::default();
        let mut state = ReconnectState::new();

        state.on_close(&CloseReason::TimedOut, &policy);
        state.on_close(&CloseReason::TimedOut, &policy);
        assert_eq!(state.attempts(), 2);

        state.on_open();
        assert_eq!(state.attempts(), 0);
        assert_eq!(
            state.on_close(&CloseReason::TimedOut, &policy),
            ReconnectDecision::Restart {
                attempt: 1,
                delay: policy.base_delay
            }
        );
    }

    #[test]
    fn logout_resets_attempts_and_skips_backoff() {
        let policy = ReconnectPolicy::default();
        let mut state = ReconnectState::new();

        for _ in 0..5 {
            state.on_close(&CloseReason::BadSession, &policy);
        }
        assert_eq!(
            state.on_close(&CloseReason::LoggedOut, &policy),
            ReconnectDecision::RestartFresh
        );
        assert_eq!(state.attempts(), 0);
        assert!(state.logged_out());
    }
}
