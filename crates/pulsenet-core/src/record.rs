//! Outbound record types: [`SendOptions`], [`QueuedRecord`] (in the send
//! queue) and [`PendingRecord`] (handed to the transport, awaiting ack).

use std::time::Instant;

/// Outcome reported to a record's delivery callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Dropped,
    TimedOut,
}

/// A delivery callback: invoked at most once per record, from the I/O task.
pub type DeliveryCallback = Box<dyn FnOnce(DeliveryOutcome) + Send + 'static>;

/// Per-send configuration (§3).
pub struct SendOptions {
    pub reliable: bool,
    pub ordered: bool,
    pub timeout_millis: u64,
    /// Higher priority wins; ties break on submission order.
    pub priority: i32,
    pub on_delivery: Option<DeliveryCallback>,
}

impl Default for SendOptions {
    fn default() -> Self {
        SendOptions {
            reliable: true,
            ordered: true,
            timeout_millis: 5_000,
            priority: 0,
            on_delivery: None,
        }
    }
}

impl std::fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendOptions")
            .field("reliable", &self.reliable)
            .field("ordered", &self.ordered)
            .field("timeout_millis", &self.timeout_millis)
            .field("priority", &self.priority)
            .field("on_delivery", &self.on_delivery.is_some())
            .finish()
    }
}

/// One outbound unit sitting in the priority send queue.
pub struct QueuedRecord {
    pub payload: Vec<u8>,
    pub options: SendOptions,
    pub submitted_at: Instant,
    pub attempt: u32,
    pub sequence: u32,
}

impl QueuedRecord {
    pub fn new(payload: Vec<u8>, options: SendOptions, sequence: u32) -> Self {
        QueuedRecord {
            payload,
            options,
            submitted_at: Instant::now(),
            attempt: 0,
            sequence,
        }
    }

    pub fn into_pending(self, sent_at: Instant) -> PendingRecord {
        PendingRecord {
            payload: self.payload,
            options: self.options,
            sent_at,
            sequence: self.sequence,
            attempt: self.attempt,
        }
    }

    /// Consumes the record, invoking its delivery callback with `outcome`.
    pub fn fire(self, outcome: DeliveryOutcome) {
        if let Some(cb) = self.options.on_delivery {
            cb(outcome);
        }
    }

    /// Consumes the record, invoking its delivery callback with `Dropped`.
    pub fn drop_with_failure(self) {
        self.fire(DeliveryOutcome::Dropped);
    }
}

impl std::fmt::Debug for QueuedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRecord")
            .field("sequence", &self.sequence)
            .field("priority", &self.options.priority)
            .field("len", &self.payload.len())
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// A reliable record handed to the transport, awaiting an ack.
pub struct PendingRecord {
    pub payload: Vec<u8>,
    pub options: SendOptions,
    pub sent_at: Instant,
    pub sequence: u32,
    pub attempt: u32,
}

impl PendingRecord {
    pub fn deadline(&self) -> Instant {
        self.sent_at + std::time::Duration::from_millis(self.options.timeout_millis)
    }

    /// Rewraps this pending record as a freshly (re-)queued one with
    /// `attempt` incremented, preserving its original priority.
    pub fn into_retry(mut self) -> QueuedRecord {
        self.attempt += 1;
        QueuedRecord {
            payload: self.payload,
            options: self.options,
            submitted_at: Instant::now(),
            attempt: self.attempt,
            sequence: self.sequence,
        }
    }

    /// Rewraps this pending record as a head-of-queue candidate after a
    /// connection drop, preserving its original priority and attempt count
    /// (a reconnect resend is not a delivery retry).
    pub fn into_requeued(self) -> QueuedRecord {
        QueuedRecord {
            payload: self.payload,
            options: self.options,
            submitted_at: Instant::now(),
            attempt: self.attempt,
            sequence: self.sequence,
        }
    }

    pub fn fire(self, outcome: DeliveryOutcome) {
        if let Some(cb) = self.options.on_delivery {
            cb(outcome);
        }
    }
}
