//! Heartbeat engine (§4.5): schedules periodic probes and detects the
//! no-echo timeout that forces a transition into `Error`. Pure scheduling
//! state — the actual send/receive happens in the session's I/O task.

use std::time::{Duration, Instant};

pub struct HeartbeatEngine {
    interval: Duration,
    timeout: Duration,
    next_seq: u32,
    last_sent_at: Option<Instant>,
    outstanding: Option<(u32, Instant)>,
}

impl HeartbeatEngine {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        HeartbeatEngine {
            interval,
            timeout,
            next_seq: 0,
            last_sent_at: None,
            outstanding: None,
        }
    }

    /// Whether a new probe should be sent at `now`. A probe is never sent
    /// while one is still outstanding — the timeout check handles that case.
    pub fn due(&self, now: Instant) -> bool {
        if self.outstanding.is_some() {
            return false;
        }
        match self.last_sent_at {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        }
    }

    /// Marks a probe as sent, returning its sequence token.
    pub fn mark_sent(&mut self, now: Instant) -> u32 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.last_sent_at = Some(now);
        self.outstanding = Some((seq, now));
        seq
    }

    /// Resolves an echoed probe if `seq` matches the outstanding one,
    /// returning the observed round-trip time.
    pub fn on_echo(&mut self, seq: u32, now: Instant) -> Option<Duration> {
        let (outstanding_seq, sent_at) = self.outstanding?;
        if outstanding_seq != seq {
            return None;
        }
        self.outstanding = None;
        Some(now.saturating_duration_since(sent_at))
    }

    /// True once an outstanding probe has gone unanswered past `timeout`.
    pub fn timed_out(&self, now: Instant) -> bool {
        match self.outstanding {
            Some((_, sent_at)) => now.duration_since(sent_at) >= self.timeout,
            None => false,
        }
    }

    /// Clears scheduling state, e.g. on disconnect or reconnect.
    pub fn reset(&mut self) {
        self.last_sent_at = None;
        self.outstanding = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_probe_is_due_immediately() {
        let engine = HeartbeatEngine::new(Duration::from_secs(5), Duration::from_secs(10));
        assert!(engine.due(Instant::now()));
    }

    #[test]
    fn not_due_again_until_interval_elapses_and_not_while_outstanding() {
        let mut engine = HeartbeatEngine::new(Duration::from_millis(50), Duration::from_secs(10));
        let t0 = Instant::now();
        engine.mark_sent(t0);
        assert!(!engine.due(t0));
        assert!(!engine.due(t0 + Duration::from_millis(60)));
    }

    #[test]
    fn matching_echo_resolves_rtt_and_clears_outstanding() {
        let mut engine = HeartbeatEngine::new(Duration::from_secs(5), Duration::from_secs(10));
        let t0 = Instant::now();
        let seq = engine.mark_sent(t0);
        let rtt = engine
            .on_echo(seq, t0 + Duration::from_millis(30))
            .expect("matches outstanding");
        assert_eq!(rtt, Duration::from_millis(30));
        assert!(engine.due(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn mismatched_echo_is_ignored() {
        let mut engine = HeartbeatEngine::new(Duration::from_secs(5), Duration::from_secs(10));
        let t0 = Instant::now();
        engine.mark_sent(t0);
        assert!(engine.on_echo(999, t0).is_none());
    }

    #[test]
    fn timeout_fires_only_after_threshold_with_no_echo() {
        let mut engine = HeartbeatEngine::new(Duration::from_secs(5), Duration::from_millis(100));
        let t0 = Instant::now();
        engine.mark_sent(t0);
        assert!(!engine.timed_out(t0 + Duration::from_millis(50)));
        assert!(engine.timed_out(t0 + Duration::from_millis(150)));
    }
}
