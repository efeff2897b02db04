//! Session orchestrator (§5): the public surface wiring the framer,
//! priority send queue, pending-ack table, state machine, reconnect
//! policy, quality monitor and dispatcher together around one TCP
//! connection at a time.

use crate::ack::PendingAckTable;
use crate::config::SessionConfig;
use crate::dispatch::{Dispatcher, Handler};
use crate::framer::{Framer, FramerError};
use crate::heartbeat::HeartbeatEngine;
use crate::message::{self, message_type};
use crate::metrics::{ConnectionMetrics, MetricsStore};
use crate::queue::PrioritySendQueue;
use crate::quality::{QualityMetrics, QualityMonitor, QualitySample};
use crate::reconnect::ReconnectPolicy;
use crate::record::{DeliveryOutcome, QueuedRecord, SendOptions};
use crate::state::{ConnectionError, ConnectionState, StateMachine};

use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("operation is not valid from state {0:?}")]
    InvalidState(ConnectionState),
    #[error("not connected")]
    NotConnected,
    #[error("connection attempt timed out")]
    ConnectTimeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Framing(#[from] FramerError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

enum Command {
    Disconnect,
}

fn connection_error_for(error: &SessionError) -> ConnectionError {
    match error {
        SessionError::ConnectTimeout => ConnectionError::Timeout,
        SessionError::Io(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            ConnectionError::Refused
        }
        SessionError::Io(_) => ConnectionError::NetworkUnavailable,
        _ => ConnectionError::Unknown,
    }
}

/// Why the I/O loop for one connection attempt ended.
enum LoopExit {
    Graceful,
    Failed(ConnectionError),
}

struct Inner {
    config: SessionConfig,
    state: StateMachine,
    queue: Mutex<PrioritySendQueue>,
    queue_notify: Notify,
    acks: Mutex<PendingAckTable>,
    dispatcher: Dispatcher,
    metrics: MetricsStore,
    quality: Mutex<QualityMonitor>,
    heartbeat: Mutex<HeartbeatEngine>,
    reconnect: ReconnectPolicy,
    next_sequence: AtomicU32,
    command_tx: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

/// A single client connection to a game server: one `Session` owns at most
/// one live TCP connection, reconnecting in place rather than handing the
/// caller a new handle each time (§5). Cloning shares the same underlying
/// connection state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let reconnect = config.reconnect_policy();
        let heartbeat = HeartbeatEngine::new(
            Duration::from_millis(config.heartbeat_interval_millis),
            Duration::from_millis(config.heartbeat_timeout_millis),
        );
        let queue = PrioritySendQueue::new(config.max_queue_size);
        Session {
            inner: Arc::new(Inner {
                config,
                state: StateMachine::new(),
                queue: Mutex::new(queue),
                queue_notify: Notify::new(),
                acks: Mutex::new(PendingAckTable::new()),
                dispatcher: Dispatcher::new(),
                metrics: MetricsStore::new(),
                quality: Mutex::new(QualityMonitor::new()),
                heartbeat: Mutex::new(heartbeat),
                reconnect,
                next_sequence: AtomicU32::new(1),
                command_tx: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.state()
    }

    pub fn last_error(&self) -> ConnectionError {
        self.inner.state.last_error()
    }

    pub fn metrics(&self) -> ConnectionMetrics {
        self.inner.metrics.snapshot()
    }

    pub fn quality(&self) -> QualityMetrics {
        self.inner.quality.lock().expect("quality mutex poisoned").metrics()
    }

    pub fn register_handler(&self, message_type: impl Into<String>, handler: Handler) {
        self.inner.dispatcher.register(message_type, handler);
    }

    pub fn unregister_handler(&self, message_type: &str) {
        self.inner.dispatcher.unregister(message_type);
    }

    /// Connects and blocks until the first attempt succeeds or fails.
    /// Reconnection after a later drop happens in the background and is
    /// observed through [`Session::state`], not through this future.
    pub async fn connect(&self, address: impl Into<String>) -> Result<(), SessionError> {
        let address = address.into();
        if !self.inner.state.can_transition_to(ConnectionState::Connecting) {
            return Err(SessionError::InvalidState(self.inner.state.state()));
        }
        self.inner
            .state
            .transition(ConnectionState::Connecting, ConnectionError::None);
        // §3 invariant 2: the sequence counter resets on a fresh Connect, not
        // on an in-place Reconnect to the same peer (that path never calls
        // back into this method).
        self.inner.next_sequence.store(1, Ordering::Release);

        let stream = match self.dial(&address).await {
            Ok(stream) => stream,
            Err(e) => {
                self.inner
                    .state
                    .transition(ConnectionState::Error, connection_error_for(&e));
                return Err(e);
            }
        };
        self.inner
            .state
            .transition(ConnectionState::Connected, ConnectionError::None);
        self.inner.metrics.record_connected(Instant::now());
        self.inner.quality.lock().expect("quality mutex poisoned").record_connection_event();

        self.spawn_supervised_loop(stream, address);
        Ok(())
    }

    /// Non-blocking variant: returns immediately; the outcome is visible via
    /// [`Session::state`] once the attempt resolves.
    pub fn connect_async(&self, address: impl Into<String> + Send + 'static) {
        let address = address.into();
        let session = self.clone();
        tokio::spawn(async move {
            if let Err(e) = session.connect(address).await {
                log::warn!("background connect failed: {e}");
            }
        });
    }

    async fn dial(&self, address: &str) -> Result<TcpStream, SessionError> {
        self.inner.metrics.record_connect_attempt();
        let timeout = Duration::from_millis(self.inner.config.connect_timeout_millis);
        match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(SessionError::Io(e)),
            Err(_) => Err(SessionError::ConnectTimeout),
        }
    }

    fn spawn_supervised_loop(&self, stream: TcpStream, address: String) {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.command_tx.lock().expect("command_tx mutex poisoned") = Some(tx);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_supervisor(inner, stream, address, rx).await;
        });
    }

    /// Requests disconnection; the I/O task drains its queue and the
    /// connection closes once the command is observed.
    pub async fn disconnect(&self) {
        if !self.inner.state.can_transition_to(ConnectionState::Disconnecting) {
            return;
        }
        self.inner
            .state
            .transition(ConnectionState::Disconnecting, ConnectionError::None);
        let tx = self.inner.command_tx.lock().expect("command_tx mutex poisoned").take();
        if let Some(tx) = tx {
            let _ = tx.send(Command::Disconnect);
        }
    }

    /// Enqueues `payload` for transmission under `options`. Reliable records
    /// are tagged with a sequence number the peer must echo back in an ack.
    pub fn send(&self, mut payload: Value, options: SendOptions) -> Result<(), SessionError> {
        if !self.inner.state.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::AcqRel);
        if options.reliable {
            if let Value::Object(ref mut map) = payload {
                map.insert("seq".to_string(), Value::from(sequence));
            }
        }
        let bytes = serde_json::to_vec(&payload)?;
        let record = QueuedRecord::new(bytes, options, sequence);

        let dropped = self
            .inner
            .queue
            .lock()
            .expect("queue mutex poisoned")
            .enqueue(record);
        if let Some(dropped) = dropped {
            self.inner.metrics.record_message_dropped();
            dropped.drop_with_failure();
        }
        self.inner.queue_notify.notify_one();
        Ok(())
    }

    /// Submits every message in order; a failure on one does not prevent the
    /// rest from being attempted.
    pub fn send_batch(
        &self,
        messages: Vec<(Value, SendOptions)>,
    ) -> Vec<Result<(), SessionError>> {
        messages
            .into_iter()
            .map(|(payload, options)| self.send(payload, options))
            .collect()
    }
}

async fn run_supervisor(
    inner: Arc<Inner>,
    mut stream: TcpStream,
    address: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    loop {
        let exit = run_io_loop(&inner, &mut stream, &mut commands).await;

        match exit {
            LoopExit::Graceful => {
                // §7: a user-initiated disconnect never schedules a reconnect,
                // so nothing is retained — every pending and queued record
                // fires its delivery callback with failure now.
                drain_all_with_failure(&inner);
                inner
                    .state
                    .transition(ConnectionState::Disconnected, ConnectionError::None);
                return;
            }
            LoopExit::Failed(error) => {
                log::warn!("connection to {address} dropped: {error:?}");
                inner.state.transition(ConnectionState::Error, error);
            }
        }

        // Retry the connect itself (not the io loop) until one succeeds or
        // the policy gives up; a refused/timed-out redial never touches the
        // dead `stream` from the previous attempt.
        let reconnected = loop {
            if !inner.reconnect.permits(inner.state.last_error()) {
                log::info!("reconnect disabled for error {:?}", inner.state.last_error());
                break None;
            }
            let attempts = inner.state.reconnect_attempts();
            if !inner.reconnect.should_attempt(inner.state.state(), attempts) {
                log::info!("reconnect attempts exhausted for {address}");
                break None;
            }
            if !inner
                .state
                .transition(ConnectionState::Reconnecting, ConnectionError::None)
            {
                break None;
            }
            inner.metrics.record_reconnect_attempt();
            inner.heartbeat.lock().expect("heartbeat mutex poisoned").reset();
            requeue_for_reconnect(&inner);

            let delay = inner.reconnect.delay_for_attempt(attempts);
            log::info!("reconnecting to {address} in {delay:?} (attempt {attempts})");
            tokio::time::sleep(delay).await;

            inner.metrics.record_connect_attempt();
            let timeout = Duration::from_millis(inner.config.connect_timeout_millis);
            match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
                Ok(Ok(new_stream)) => {
                    inner
                        .state
                        .transition(ConnectionState::Connected, ConnectionError::None);
                    inner.metrics.record_connected(Instant::now());
                    break Some(new_stream);
                }
                Ok(Err(_)) => {
                    inner
                        .state
                        .transition(ConnectionState::Error, ConnectionError::Refused);
                }
                Err(_) => {
                    inner
                        .state
                        .transition(ConnectionState::Error, ConnectionError::Timeout);
                }
            }
        };

        match reconnected {
            Some(new_stream) => stream = new_stream,
            None => return,
        }
    }
}

async fn run_io_loop(
    inner: &Arc<Inner>,
    stream: &mut TcpStream,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> LoopExit {
    let (mut read_half, mut write_half) = tokio::io::split(stream);
    let mut framer = Framer::new(inner.config.max_record_size);
    let mut read_buf = vec![0u8; 64 * 1024];
    let mut tick = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            biased;

            cmd = commands.recv() => {
                match cmd {
                    Some(Command::Disconnect) | None => return LoopExit::Graceful,
                }
            }

            read_result = read_half.read(&mut read_buf) => {
                match read_result {
                    Ok(0) => return LoopExit::Failed(ConnectionError::NetworkUnavailable),
                    Ok(n) => {
                        inner.metrics.record_bytes_received(n as u64);
                        framer.feed(&read_buf[..n]);
                        loop {
                            match framer.next_record() {
                                Ok(Some(record)) => {
                                    let value: Value = match serde_json::from_slice(&record) {
                                        Ok(value) => value,
                                        Err(e) => {
                                            inner.metrics.record_message_dropped();
                                            if inner.config.strict {
                                                log::error!("dropping malformed record (strict mode, closing): {e}");
                                                return LoopExit::Failed(ConnectionError::ProtocolError);
                                            }
                                            log::warn!("dropping record that failed to parse as JSON: {e}");
                                            continue;
                                        }
                                    };
                                    if let Err(e) = handle_inbound(inner, &value, &mut write_half).await {
                                        log::warn!("failed handling inbound record: {e}");
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    log::error!("framing error: {e}");
                                    return LoopExit::Failed(ConnectionError::ProtocolError);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        log::warn!("read error: {e}");
                        return LoopExit::Failed(ConnectionError::NetworkUnavailable);
                    }
                }
            }

            _ = inner.queue_notify.notified() => {
                if let Err(e) = drain_queue(inner, &mut write_half).await {
                    log::warn!("write error draining queue: {e}");
                    return LoopExit::Failed(ConnectionError::NetworkUnavailable);
                }
            }

            _ = tick.tick() => {
                if let Err(e) = on_tick(inner, &mut write_half).await {
                    log::warn!("write error on tick: {e}");
                    return LoopExit::Failed(ConnectionError::NetworkUnavailable);
                }
                if inner.heartbeat.lock().expect("heartbeat mutex poisoned").timed_out(Instant::now()) {
                    return LoopExit::Failed(ConnectionError::Timeout);
                }
            }
        }
    }
}

/// Called on transition into `Reconnecting` (§4.8): reliable records already
/// handed to the transport move back to the head of the priority queue at
/// their original priority so the next `Connected` transition resumes them;
/// unreliable records still sitting unsent are dropped and counted, since a
/// fire-and-forget payload from a dead connection is stale by the time a new
/// one is established.
fn requeue_for_reconnect(inner: &Arc<Inner>) {
    let pending = inner.acks.lock().expect("ack mutex poisoned").drain_all();
    let queued = inner.queue.lock().expect("queue mutex poisoned").drain_all();

    let mut to_requeue = Vec::with_capacity(pending.len() + queued.len());
    to_requeue.extend(pending.into_iter().map(|p| p.into_requeued()));

    for record in queued {
        if record.options.reliable {
            to_requeue.push(record);
        } else {
            inner.metrics.record_message_dropped();
            record.drop_with_failure();
        }
    }

    for record in to_requeue {
        let dropped = inner.queue.lock().expect("queue mutex poisoned").enqueue(record);
        if let Some(dropped) = dropped {
            inner.metrics.record_message_dropped();
            dropped.drop_with_failure();
        }
    }
}

/// Called when the I/O loop exits without a reconnect scheduled (§7): every
/// still-queued and still-pending record fires its delivery callback with
/// failure rather than being silently forgotten.
fn drain_all_with_failure(inner: &Arc<Inner>) {
    let pending = inner.acks.lock().expect("ack mutex poisoned").drain_all();
    for record in pending {
        inner.metrics.record_message_dropped();
        record.fire(DeliveryOutcome::Dropped);
    }

    let queued = inner.queue.lock().expect("queue mutex poisoned").drain_all();
    for record in queued {
        inner.metrics.record_message_dropped();
        record.drop_with_failure();
    }
}

async fn drain_queue(inner: &Arc<Inner>, write_half: &mut WriteHalf<&mut TcpStream>) -> Result<(), SessionError> {
    loop {
        let record = inner.queue.lock().expect("queue mutex poisoned").dequeue();
        let Some(record) = record else { break };
        write_half.write_all(&Framer::frame(&record.payload)).await?;
        inner.metrics.record_bytes_sent(record.payload.len() as u64 + 1);
        inner.metrics.record_packet_sent();

        if record.options.reliable {
            let pending = record.into_pending(Instant::now());
            inner.acks.lock().expect("ack mutex poisoned").insert(pending);
        } else {
            record.fire(DeliveryOutcome::Delivered);
        }
    }
    Ok(())
}

async fn on_tick(inner: &Arc<Inner>, write_half: &mut WriteHalf<&mut TcpStream>) -> Result<(), SessionError> {
    let now = Instant::now();

    let expired = inner.acks.lock().expect("ack mutex poisoned").take_expired(now);
    for pending in expired {
        // An unacked record past its deadline is an observed loss on the
        // wire regardless of whether it gets another attempt.
        record_quality_sample(inner, now, pending.sent_at.elapsed().as_secs_f64() * 1000.0, 0, true);
        if pending.attempt < inner.config.max_retries {
            let retry = pending.into_retry();
            let dropped = inner.queue.lock().expect("queue mutex poisoned").enqueue(retry);
            if let Some(dropped) = dropped {
                inner.metrics.record_message_dropped();
                dropped.drop_with_failure();
            }
            inner.queue_notify.notify_one();
        } else {
            inner.metrics.record_message_dropped();
            pending.fire(DeliveryOutcome::TimedOut);
        }
    }

    if inner.config.enable_heartbeat {
        let due = inner.heartbeat.lock().expect("heartbeat mutex poisoned").due(now);
        if due {
            let seq = inner.heartbeat.lock().expect("heartbeat mutex poisoned").mark_sent(now);
            let probe = message::build_heartbeat_message(seq, epoch_millis(now));
            let bytes = serde_json::to_vec(&probe)?;
            write_half.write_all(&Framer::frame(&bytes)).await?;
            inner.metrics.record_bytes_sent(bytes.len() as u64 + 1);
            inner.metrics.record_packet_sent();
        }
    }

    drain_queue(inner, write_half).await
}

async fn handle_inbound(
    inner: &Arc<Inner>,
    value: &Value,
    write_half: &mut WriteHalf<&mut TcpStream>,
) -> Result<(), SessionError> {
    inner.metrics.record_packet_received();
    let byte_len = serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0);

    let Some(kind) = message_type(value) else {
        log::warn!("dropping record with no 'type' field");
        return Ok(());
    };

    match kind {
        "heartbeat" => {
            if value.get("t_echo").is_some() {
                if let (Some(seq), Some(t_sent), Some(t_echo)) = (
                    value.get("seq").and_then(Value::as_u64),
                    value.get("t").and_then(Value::as_u64),
                    value.get("t_echo").and_then(Value::as_u64),
                ) {
                    let now = Instant::now();
                    if inner
                        .heartbeat
                        .lock()
                        .expect("heartbeat mutex poisoned")
                        .on_echo(seq as u32, now)
                        .is_some()
                    {
                        // The wire carries the peer's own clock, so the
                        // round trip is t_echo - t, not the local `Instant`
                        // delta between sending the probe and parsing the
                        // echo (which only measures this process's wakeup
                        // latency).
                        let rtt_millis = t_echo.saturating_sub(t_sent) as f64;
                        record_quality_sample(inner, now, rtt_millis, byte_len, false);
                    }
                }
            } else if let (Some(seq), Some(t)) = (
                value.get("seq").and_then(Value::as_u64),
                value.get("t").and_then(Value::as_u64),
            ) {
                let echo = message::build_heartbeat_echo(seq as u32, t, epoch_millis(Instant::now()));
                let bytes = serde_json::to_vec(&echo)?;
                write_half.write_all(&Framer::frame(&bytes)).await?;
                inner.metrics.record_bytes_sent(bytes.len() as u64 + 1);
                inner.metrics.record_packet_sent();
            }
        }
        "ack" => {
            if let Some(seq) = value.get("seq").and_then(Value::as_u64) {
                let now = Instant::now();
                if let Some(rtt) = inner.acks.lock().expect("ack mutex poisoned").resolve(seq as u32, now) {
                    record_quality_sample(inner, now, rtt.as_secs_f64() * 1000.0, byte_len, false);
                }
            }
        }
        other => {
            if let Some(seq) = value.get("seq").and_then(Value::as_u64) {
                let ack = message::build_ack_message(seq as u32);
                let bytes = serde_json::to_vec(&ack)?;
                write_half.write_all(&Framer::frame(&bytes)).await?;
                inner.metrics.record_bytes_sent(bytes.len() as u64 + 1);
                inner.metrics.record_packet_sent();
            }
            record_quality_sample(inner, Instant::now(), inner.metrics.snapshot().latency_millis, byte_len, false);
            use crate::dispatch::DispatchOutcome;
            if inner.dispatcher.dispatch(other, value) == DispatchOutcome::Unhandled {
                log::debug!("no handler registered for message type '{other}'");
            }
        }
    }
    Ok(())
}

fn record_quality_sample(inner: &Arc<Inner>, now: Instant, latency_millis: f64, bytes: usize, lost: bool) {
    inner.metrics.record_latency(latency_millis);
    inner.quality.lock().expect("quality mutex poisoned").record_sample(
        now,
        QualitySample {
            at: now,
            latency_millis,
            bytes_sent: 0,
            bytes_received: bytes as u64,
            packet_lost: lost,
        },
    );
}

fn epoch_millis(_now: Instant) -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
