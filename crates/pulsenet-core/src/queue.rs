//! Bounded priority send queue (§4.2): orders pending outbound records by
//! `(priority DESC, submissionTime ASC)` and enforces a capacity, dropping
//! the globally lowest-priority record on overflow.

use crate::record::QueuedRecord;

pub struct PrioritySendQueue {
    entries: Vec<QueuedRecord>,
    capacity: usize,
}

impl PrioritySendQueue {
    pub fn new(capacity: usize) -> Self {
        PrioritySendQueue {
            entries: Vec::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the record that should dequeue first: highest priority,
    /// earliest submission among ties.
    fn best_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.options
                    .priority
                    .cmp(&b.options.priority)
                    .then_with(|| b.submitted_at.cmp(&a.submitted_at))
            })
            .map(|(i, _)| i)
    }

    /// Index of the globally lowest-priority resident, breaking ties toward
    /// the most recently submitted (so the newest of equally-bad records is
    /// the one sacrificed).
    fn worst_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.options
                    .priority
                    .cmp(&b.options.priority)
                    .then_with(|| b.submitted_at.cmp(&a.submitted_at))
            })
            .map(|(i, _)| i)
    }

    /// Inserts `record`. Returns the record that was dropped due to
    /// overflow, if any — this may be `record` itself when it is not better
    /// than every current resident.
    pub fn enqueue(&mut self, record: QueuedRecord) -> Option<QueuedRecord> {
        if self.entries.len() < self.capacity {
            self.entries.push(record);
            return None;
        }

        let worst = self.worst_index().expect("queue at capacity is non-empty");
        if record.options.priority <= self.entries[worst].options.priority {
            return Some(record);
        }
        let evicted = self.entries.swap_remove(worst);
        self.entries.push(record);
        Some(evicted)
    }

    pub fn dequeue(&mut self) -> Option<QueuedRecord> {
        let idx = self.best_index()?;
        Some(self.entries.swap_remove(idx))
    }

    /// Removes a queued record by sequence number, if it is still present.
    /// Defensive support for an ack arriving before the record drains (§4.2).
    pub fn cancel_by_sequence(&mut self, sequence: u32) -> Option<QueuedRecord> {
        let idx = self.entries.iter().position(|r| r.sequence == sequence)?;
        Some(self.entries.swap_remove(idx))
    }

    /// Drains every resident record, highest priority first.
    pub fn drain_all(&mut self) -> Vec<QueuedRecord> {
        let mut out = Vec::with_capacity(self.entries.len());
        while let Some(r) = self.dequeue() {
            out.push(r);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SendOptions;

    fn record(priority: i32) -> QueuedRecord {
        QueuedRecord::new(
            b"{}".to_vec(),
            SendOptions {
                priority,
                ..Default::default()
            },
            0,
        )
    }

    #[test]
    fn dequeue_order_is_priority_desc_then_submission_asc() {
        let mut q = PrioritySendQueue::new(10);
        q.enqueue(record(1));
        q.enqueue(record(2));
        q.enqueue(record(0));
        q.enqueue(record(2));

        let mut out = Vec::new();
        while let Some(r) = q.dequeue() {
            out.push(r.options.priority);
        }
        assert_eq!(out, vec![2, 2, 1, 0]);
    }

    #[test]
    fn overflow_drops_globally_lowest_priority() {
        let mut q = PrioritySendQueue::new(3);
        assert!(q.enqueue(record(1)).is_none());
        assert!(q.enqueue(record(2)).is_none());
        assert!(q.enqueue(record(0)).is_none());

        let dropped = q.enqueue(record(3)).expect("must evict at capacity");
        assert_eq!(dropped.options.priority, 0);

        let mut out = Vec::new();
        while let Some(r) = q.dequeue() {
            out.push(r.options.priority);
        }
        assert_eq!(out, vec![3, 2, 1]);
    }

    #[test]
    fn overflow_drops_incoming_record_when_it_is_the_worst() {
        let mut q = PrioritySendQueue::new(2);
        q.enqueue(record(5));
        q.enqueue(record(5));

        let dropped = q.enqueue(record(1)).expect("must evict someone");
        assert_eq!(dropped.options.priority, 1);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn cancel_by_sequence_removes_matching_record() {
        let mut q = PrioritySendQueue::new(10);
        let mut r = record(1);
        r.sequence = 42;
        q.enqueue(r);
        q.enqueue(record(2));

        let cancelled = q.cancel_by_sequence(42).expect("present");
        assert_eq!(cancelled.sequence, 42);
        assert_eq!(q.len(), 1);
        assert!(q.cancel_by_sequence(42).is_none());
    }
}
