//! Connection metrics (§3): a single mutex-guarded struct read as a
//! point-in-time snapshot.

use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct ConnectionMetrics {
    pub connect_time: Option<Instant>,
    pub latency_millis: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub connection_attempts: u32,
    pub reconnection_attempts: u32,
    pub packet_loss_percent: f64,
    pub bandwidth_bits_per_sec: f64,
    pub messages_dropped: u64,
}

impl Default for ConnectionMetrics {
    fn default() -> Self {
        ConnectionMetrics {
            connect_time: None,
            latency_millis: 0.0,
            bytes_sent: 0,
            bytes_received: 0,
            packets_sent: 0,
            packets_received: 0,
            connection_attempts: 0,
            reconnection_attempts: 0,
            packet_loss_percent: 0.0,
            bandwidth_bits_per_sec: 0.0,
            messages_dropped: 0,
        }
    }
}

impl ConnectionMetrics {
    /// §3 invariant 4: undefined when `packetsSent == 0`, reported as 0.0.
    fn recompute_loss(&mut self) {
        self.packet_loss_percent = if self.packets_sent == 0 {
            0.0
        } else {
            (self.packets_sent.saturating_sub(self.packets_received)) as f64 * 100.0
                / self.packets_sent as f64
        };
    }
}

/// Guards a [`ConnectionMetrics`] behind a single mutex, matching §5's rule
/// that no two of the session's locks are ever held at once.
pub struct MetricsStore {
    inner: Mutex<ConnectionMetrics>,
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore {
    pub fn new() -> Self {
        MetricsStore {
            inner: Mutex::new(ConnectionMetrics::default()),
        }
    }

    pub fn snapshot(&self) -> ConnectionMetrics {
        *self.inner.lock().expect("metrics mutex poisoned")
    }

    pub fn reset(&self) {
        *self.inner.lock().expect("metrics mutex poisoned") = ConnectionMetrics::default();
    }

    pub fn record_connect_attempt(&self) {
        self.inner.lock().expect("metrics mutex poisoned").connection_attempts += 1;
    }

    pub fn record_reconnect_attempt(&self) {
        self.inner
            .lock()
            .expect("metrics mutex poisoned")
            .reconnection_attempts += 1;
    }

    pub fn record_connected(&self, at: Instant) {
        self.inner.lock().expect("metrics mutex poisoned").connect_time = Some(at);
    }

    pub fn record_latency(&self, millis: f64) {
        self.inner.lock().expect("metrics mutex poisoned").latency_millis = millis;
    }

    pub fn record_bytes_sent(&self, n: u64) {
        self.inner.lock().expect("metrics mutex poisoned").bytes_sent += n;
    }

    pub fn record_bytes_received(&self, n: u64) {
        self.inner.lock().expect("metrics mutex poisoned").bytes_received += n;
    }

    pub fn record_packet_sent(&self) {
        let mut m = self.inner.lock().expect("metrics mutex poisoned");
        m.packets_sent += 1;
        m.recompute_loss();
    }

    pub fn record_packet_received(&self) {
        let mut m = self.inner.lock().expect("metrics mutex poisoned");
        m.packets_received += 1;
        m.recompute_loss();
    }

    pub fn record_message_dropped(&self) {
        self.inner.lock().expect("metrics mutex poisoned").messages_dropped += 1;
    }

    pub fn record_bandwidth(&self, bits_per_sec: f64) {
        self.inner.lock().expect("metrics mutex poisoned").bandwidth_bits_per_sec = bits_per_sec;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_is_zero_when_nothing_sent() {
        let store = MetricsStore::new();
        assert_eq!(store.snapshot().packet_loss_percent, 0.0);
    }

    #[test]
    fn loss_tracks_sent_vs_received() {
        let store = MetricsStore::new();
        for _ in 0..10 {
            store.record_packet_sent();
        }
        for _ in 0..8 {
            store.record_packet_received();
        }
        assert_eq!(store.snapshot().packet_loss_percent, 20.0);
    }
}
