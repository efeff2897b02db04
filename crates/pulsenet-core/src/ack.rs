//! Pending-ack table (§4.2/§4.5): tracks reliable records handed to the
//! transport until they are acknowledged, expired, retried, or failed.

use crate::record::{DeliveryOutcome, PendingRecord};
use std::collections::HashMap;
use std::time::Instant;

pub struct PendingAckTable {
    entries: HashMap<u32, PendingRecord>,
}

impl Default for PendingAckTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingAckTable {
    pub fn new() -> Self {
        PendingAckTable {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, record: PendingRecord) {
        self.entries.insert(record.sequence, record);
    }

    /// Resolves a record on ack receipt, firing its delivery callback with
    /// success and returning its round-trip time.
    pub fn resolve(&mut self, sequence: u32, now: Instant) -> Option<std::time::Duration> {
        let record = self.entries.remove(&sequence)?;
        let rtt = now.saturating_duration_since(record.sent_at);
        record.fire(DeliveryOutcome::Delivered);
        Some(rtt)
    }

    pub fn remove(&mut self, sequence: u32) -> Option<PendingRecord> {
        self.entries.remove(&sequence)
    }

    /// Scans for records past their deadline at `now`. Each is removed; a
    /// caller-chosen outcome follows from §4.5: retry (re-enqueue with
    /// `attempt + 1`, capped at `max_retries`) or final failure.
    pub fn take_expired(&mut self, now: Instant) -> Vec<PendingRecord> {
        let expired_keys: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, r)| r.deadline() <= now)
            .map(|(&seq, _)| seq)
            .collect();
        expired_keys
            .into_iter()
            .filter_map(|seq| self.entries.remove(&seq))
            .collect()
    }

    /// Drains every pending record (used on disconnect/reconnect transition).
    pub fn drain_all(&mut self) -> Vec<PendingRecord> {
        self.entries.drain().map(|(_, r)| r).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{QueuedRecord, SendOptions};
    use std::time::Duration;

    fn pending(seq: u32, timeout_ms: u64) -> PendingRecord {
        QueuedRecord::new(
            b"{}".to_vec(),
            SendOptions {
                timeout_millis: timeout_ms,
                ..Default::default()
            },
            seq,
        )
        .into_pending(Instant::now())
    }

    #[test]
    fn resolve_removes_and_reports_rtt() {
        let mut table = PendingAckTable::new();
        table.insert(pending(7, 5_000));
        std::thread::sleep(Duration::from_millis(5));
        let rtt = table.resolve(7, Instant::now()).expect("present");
        assert!(rtt.as_millis() >= 4);
        assert!(table.is_empty());
        assert!(table.resolve(7, Instant::now()).is_none());
    }

    #[test]
    fn take_expired_only_returns_past_deadline() {
        let mut table = PendingAckTable::new();
        table.insert(pending(1, 0));
        table.insert(pending(2, 60_000));
        std::thread::sleep(Duration::from_millis(5));

        let expired = table.take_expired(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].sequence, 1);
        assert_eq!(table.len(), 1);
    }
}
