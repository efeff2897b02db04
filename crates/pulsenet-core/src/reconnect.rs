//! Reconnect policy (§4.4): attempt counter and exponential backoff
//! scheduler with a cap, plus the §7 rule that certain errors disable
//! reconnection entirely.

use crate::state::{ConnectionError, ConnectionState};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 1.5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the `attempt`-th reconnect (0-indexed), per §4.4:
    /// `min(initialDelay * backoffFactor^attempt, maxDelay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Whether the error allows a reconnect attempt at all (§7: disabled
    /// for authentication and version-mismatch failures — the peer is not
    /// going to accept the same credentials or protocol version next time).
    pub fn permits(&self, error: ConnectionError) -> bool {
        !matches!(
            error,
            ConnectionError::AuthenticationFailed | ConnectionError::VersionMismatch
        )
    }

    /// True iff `state` is eligible to begin reconnecting and the attempt
    /// budget is not exhausted.
    pub fn should_attempt(&self, state: ConnectionState, attempts_so_far: u32) -> bool {
        matches!(state, ConnectionState::Error | ConnectionState::Disconnected)
            && attempts_so_far < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_sequence_matches_spec_scenario() {
        let policy = ReconnectPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(800),
            backoff_factor: 2.0,
        };
        let delays: Vec<u128> = (0..5)
            .map(|n| policy.delay_for_attempt(n).as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 800]);
    }

    #[test]
    fn delay_is_always_within_bounds() {
        let policy = ReconnectPolicy::default();
        for n in 0..20 {
            let d = policy.delay_for_attempt(n);
            assert!(d >= policy.initial_delay || n == 0);
            assert!(d <= policy.max_delay);
        }
    }

    #[test]
    fn auth_and_version_errors_disable_reconnect() {
        let policy = ReconnectPolicy::default();
        assert!(!policy.permits(ConnectionError::AuthenticationFailed));
        assert!(!policy.permits(ConnectionError::VersionMismatch));
        assert!(policy.permits(ConnectionError::Timeout));
        assert!(policy.permits(ConnectionError::Refused));
    }

    #[test]
    fn should_attempt_respects_state_and_budget() {
        let policy = ReconnectPolicy::default();
        assert!(policy.should_attempt(ConnectionState::Error, 0));
        assert!(!policy.should_attempt(ConnectionState::Error, 5));
        assert!(!policy.should_attempt(ConnectionState::Connected, 0));
    }
}
