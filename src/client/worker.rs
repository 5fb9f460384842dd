//! The worker task.
//!
//! One task owns the outbound queue, the pending table, the session and
//! the metrics. API calls, connect results, socket events and timer
//! firings all arrive as [`Command`]s on one channel and are handled one
//! at a time, so none of them can interleave.
//!
//! Connect attempts, the socket reader and timers run as separate tasks
//! that post back with the epoch they were started under. Anything
//! carrying a stale epoch is discarded.

// ============================================================================
// Imports
// ============================================================================

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::protocol::frame::{ping_frame, pong_frame};
use crate::protocol::{InboundFrame, Message, OutboundMessage, validate};
use crate::transport::metrics::{ConnectionEventKind, ErrorCategory, Metrics, TransportSnapshot};
use crate::transport::socket::{Connector, NORMAL_CLOSURE, Socket, SocketEvent, SocketSink};
use crate::transport::{
    ConnectionState, MetricsSnapshot, OutboundQueue, PendingTable, RateLimiter, ReconnectPolicy,
    Session,
};

use super::handlers::HandlerRegistry;
use super::options::ClientOptions;
use super::status::{Status, StatusNotifier};

// ============================================================================
// Constants
// ============================================================================

/// Close reason sent on teardown.
pub(crate) const DESTROY_REASON: &str = "Manager destroyed";

/// Close reason sent on an intentional close.
const CLOSE_REASON: &str = "Client closed";

/// Bound on writing the teardown close frame.
const TEARDOWN_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Command
// ============================================================================

/// Input to the worker.
pub(crate) enum Command {
    /// Submit a validated message.
    Send {
        message: Message,
        reply: oneshot::Sender<Result<MessageId>>,
    },
    /// Explicit connect.
    Connect { reply: oneshot::Sender<Result<()>> },
    /// Intentional close.
    Close { reply: oneshot::Sender<()> },
    /// Drop a queued or pending message.
    Cancel {
        id: MessageId,
        reply: oneshot::Sender<bool>,
    },
    /// Rewrite a pending message.
    Retry {
        id: MessageId,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Read a metrics snapshot.
    Metrics {
        reply: oneshot::Sender<MetricsSnapshot>,
    },
    /// Terminal teardown.
    Destroy { ack: Option<oneshot::Sender<()>> },
    /// A connect attempt opened a socket.
    Opened { epoch: u64, socket: Socket },
    /// A connect attempt failed.
    ConnectFailed { epoch: u64, error: Error },
    /// Socket read half produced an event; `None` when the stream ended.
    Inbound {
        epoch: u64,
        event: Option<SocketEvent>,
    },
    /// A timer fired.
    Timer { epoch: u64, kind: TimerKind },
}

/// Timers owned by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Backoff delay elapsed.
    Reconnect,
    /// Time to send a ping.
    Heartbeat,
    /// No pong in time.
    HeartbeatTimeout,
    /// Peer did not finish the close handshake.
    CloseTimeout,
    /// Sweep the pending table for timed-out entries.
    AckSweep,
}

/// Why a message was not written.
enum WriteFailure {
    /// The message cannot be encoded; it is dropped.
    Unserializable(Error),
    /// The socket rejected the write; the message is handed back.
    Socket(OutboundMessage, Error),
}

// ============================================================================
// Timers
// ============================================================================

/// Handles of every spawned helper task.
#[derive(Default)]
struct Tasks {
    connect: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    heartbeat_deadline: Option<JoinHandle<()>>,
    close: Option<JoinHandle<()>>,
    ack_sweep: Option<JoinHandle<()>>,
}

fn abort(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}

fn replace(slot: &mut Option<JoinHandle<()>>, handle: JoinHandle<()>) {
    abort(slot);
    *slot = Some(handle);
}

impl Tasks {
    /// Stops everything tied to the current socket.
    fn abort_socket(&mut self) {
        abort(&mut self.reader);
        abort(&mut self.heartbeat);
        abort(&mut self.heartbeat_deadline);
        abort(&mut self.close);
    }

    fn abort_all(&mut self) {
        self.abort_socket();
        abort(&mut self.connect);
        abort(&mut self.reconnect);
        abort(&mut self.ack_sweep);
    }
}

// ============================================================================
// Worker
// ============================================================================

/// State shared with the [`Client`](super::Client) handle.
pub(crate) struct Shared {
    pub(crate) handlers: Arc<HandlerRegistry>,
    pub(crate) status: Arc<StatusNotifier>,
}

/// The serialization unit.
pub(crate) struct Worker {
    connector: Arc<dyn Connector>,
    options: ClientOptions,
    policy: ReconnectPolicy,
    commands: mpsc::UnboundedReceiver<Command>,
    command_tx: mpsc::UnboundedSender<Command>,
    shared: Shared,
    state_tx: watch::Sender<ConnectionState>,
    session: Session,
    queue: OutboundQueue,
    pending: PendingTable,
    metrics: Metrics,
    rate_limiter: Option<RateLimiter>,
    sink: Option<Box<dyn SocketSink>>,
    tasks: Tasks,
    last_timestamp: u64,
}

impl Worker {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        options: ClientOptions,
        commands: mpsc::UnboundedReceiver<Command>,
        command_tx: mpsc::UnboundedSender<Command>,
        shared: Shared,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let rate_limiter = options
            .rate_limit
            .map(|limit| RateLimiter::new(limit.max_per_second, limit.burst, Instant::now()));

        Self {
            connector,
            policy: options.reconnect_policy(),
            queue: OutboundQueue::new(options.max_queue_depth),
            metrics: Metrics::new(options.metrics_retention()),
            options,
            commands,
            command_tx,
            shared,
            state_tx,
            session: Session::new(),
            pending: PendingTable::new(),
            rate_limiter,
            sink: None,
            tasks: Tasks::default(),
            last_timestamp: 0,
        }
    }

    /// Runs until teardown.
    pub(crate) async fn run(mut self, connect_on_start: bool) {
        self.start_ack_sweep();
        if connect_on_start {
            self.begin_connect();
        }

        while let Some(command) = self.commands.recv().await {
            if self.handle(command).await.is_break() {
                break;
            }
        }

        debug!("Worker terminated");
    }

    async fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Send { message, reply } => {
                let result = self.handle_send(message).await;
                let _ = reply.send(result);
            }

            Command::Connect { reply } => {
                let _ = reply.send(self.handle_connect());
            }

            Command::Close { reply } => {
                self.handle_close().await;
                let _ = reply.send(());
            }

            Command::Cancel { id, reply } => {
                let cancelled = self.queue.remove(id) || self.pending.remove(&id);
                debug!(%id, cancelled, "Cancel requested");
                let _ = reply.send(cancelled);
            }

            Command::Retry { id, reply } => {
                let result = self.handle_retry(id).await;
                let _ = reply.send(result);
            }

            Command::Metrics { reply } => {
                let _ = reply.send(self.snapshot());
            }

            Command::Destroy { ack } => {
                self.destroy().await;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                return ControlFlow::Break(());
            }

            Command::Opened { epoch, socket } => {
                if self.session.is_current(epoch) {
                    self.on_open(epoch, socket).await;
                } else {
                    debug!(epoch, "Discarding socket from stale connect attempt");
                    let mut sink = socket.sink;
                    let _ = sink.close(NORMAL_CLOSURE, CLOSE_REASON).await;
                }
            }

            Command::ConnectFailed { epoch, error } => {
                if self.session.is_current(epoch) {
                    self.on_connect_failed(error);
                } else {
                    trace!(epoch, "Ignoring stale connect failure");
                }
            }

            Command::Inbound { epoch, event } => {
                if self.session.is_current(epoch) {
                    self.on_socket_event(event).await;
                } else {
                    trace!(epoch, "Ignoring event from stale socket");
                }
            }

            Command::Timer { epoch, kind } => {
                // The sweep outlives individual connections.
                let live = match kind {
                    TimerKind::AckSweep => !self.session.is_destroyed(),
                    _ => self.session.is_current(epoch),
                };
                if live {
                    self.on_timer(kind).await;
                } else {
                    trace!(epoch, ?kind, "Ignoring stale timer");
                }
            }
        }

        ControlFlow::Continue(())
    }

    // ========================================================================
    // Send Path
    // ========================================================================

    async fn handle_send(&mut self, message: Message) -> Result<MessageId> {
        let outbound = OutboundMessage::new(MessageId::generate(), self.next_timestamp(), message);
        let id = outbound.id;

        if self.queue.is_full() {
            let capacity = self.queue.capacity();
            warn!(%id, capacity, "Outbound queue full, rejecting message");
            self.notify(&Status::QueueFull { capacity });
            return Err(Error::queue_full(capacity));
        }

        if let Some(limiter) = self.rate_limiter.as_mut()
            && let Err(wait) = limiter.try_acquire(Instant::now())
        {
            let retry_after_ms = millis(wait).max(1);
            debug!(%id, retry_after_ms, "Send rate limited");
            return Err(Error::RateLimited { retry_after_ms });
        }

        let state = self.session.state();
        if !state.is_healthy() {
            self.queue.push(outbound)?;
            debug!(%id, %state, queued = self.queue.len(), "Queued message until healthy");
            if state == ConnectionState::Disconnected && !self.session.is_exhausted() {
                self.begin_connect();
            }
            return Ok(id);
        }

        let written = self.write_message(outbound).await;
        self.settle_send(id, written)
    }

    /// Maps a direct write to the caller's result.
    ///
    /// A socket failure keeps the message: it goes back to the queue head
    /// and the send still succeeds.
    fn settle_send(
        &mut self,
        id: MessageId,
        written: std::result::Result<(), WriteFailure>,
    ) -> Result<MessageId> {
        match written {
            Ok(()) => Ok(id),
            Err(WriteFailure::Unserializable(error)) => Err(error),
            Err(WriteFailure::Socket(outbound, error)) => {
                self.queue.requeue_front(outbound);
                self.handle_loss(error.to_string());
                Ok(id)
            }
        }
    }

    /// Writes one message and records it as pending.
    async fn write_message(
        &mut self,
        outbound: OutboundMessage,
    ) -> std::result::Result<(), WriteFailure> {
        let frame = match outbound.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(id = %outbound.id, error = %e, "Dropping unserializable message");
                self.metrics.record_error(ErrorCategory::Message);
                return Err(WriteFailure::Unserializable(e));
            }
        };

        let Some(sink) = self.sink.as_mut() else {
            return Err(WriteFailure::Socket(outbound, Error::NotConnected));
        };
        if let Err(e) = sink.send_text(frame.clone()).await {
            warn!(id = %outbound.id, error = %e, "Socket write failed");
            return Err(WriteFailure::Socket(outbound, e));
        }

        self.pending
            .insert(outbound.id, Arc::from(frame), Instant::now());
        self.metrics.record_sent();
        trace!(id = %outbound.id, kind = outbound.message.kind(), "Message sent");
        Ok(())
    }

    /// Flushes the queue in FIFO order while the connection stays healthy.
    async fn drain_queue(&mut self) {
        let mut drained = 0usize;

        while self.session.state().is_healthy() {
            let Some(outbound) = self.queue.pop_front() else {
                break;
            };

            if let Err(e) = validate(&outbound.message, self.options.max_message_bytes) {
                warn!(id = %outbound.id, error = %e, "Dropping queued message that no longer validates");
                self.metrics.record_error(ErrorCategory::Message);
                continue;
            }

            match self.write_message(outbound).await {
                Ok(()) => drained += 1,
                Err(WriteFailure::Unserializable(_)) => {}
                Err(WriteFailure::Socket(outbound, error)) => {
                    self.queue.requeue_front(outbound);
                    debug!(drained, remaining = self.queue.len(), "Drain interrupted");
                    self.handle_loss(error.to_string());
                    return;
                }
            }
        }

        if drained > 0 {
            debug!(drained, "Drained outbound queue");
        }
    }

    async fn handle_retry(&mut self, id: MessageId) -> Result<()> {
        if !self.pending.contains(&id) {
            return Err(Error::UnknownMessage { message_id: id });
        }
        if !self.session.state().is_healthy() {
            return Err(Error::NotConnected);
        }

        let frame = self
            .pending
            .mark_resent(&id, Instant::now())
            .ok_or(Error::UnknownMessage { message_id: id })?;
        let written = match self.sink.as_mut() {
            Some(sink) => sink.send_text(frame.to_string()).await,
            None => return Err(Error::NotConnected),
        };

        if let Err(e) = written {
            let message = e.to_string();
            self.handle_loss(message.clone());
            return Err(Error::connection(message));
        }

        self.metrics.record_sent();
        debug!(%id, retries = self.pending.get(&id).map_or(0, |e| e.retry_count), "Message resent");
        Ok(())
    }

    // ========================================================================
    // Connection Lifecycle
    // ========================================================================

    fn handle_connect(&mut self) -> Result<()> {
        let state = self.session.state();
        if state == ConnectionState::Draining {
            return Err(Error::connection("close in progress"));
        }
        if state.can_connect() {
            abort(&mut self.tasks.reconnect);
            self.session.reset_attempts();
            self.begin_connect();
        }
        Ok(())
    }

    /// Starts a connect attempt under a fresh epoch.
    fn begin_connect(&mut self) {
        if !self.set_state(ConnectionState::Connecting) {
            return;
        }
        let epoch = self.session.advance_epoch();
        self.session.connect_started_at = Some(Instant::now());

        info!(
            epoch,
            attempt = self.session.reconnect_attempts,
            "Connecting"
        );
        self.notify(&Status::Connecting);

        let connector = Arc::clone(&self.connector);
        let tx = self.command_tx.clone();
        let timeout = self.options.connect_timeout();
        let timeout_ms = self.options.connect_timeout_ms;

        let handle = tokio::spawn(async move {
            let command = match tokio::time::timeout(timeout, connector.connect()).await {
                Ok(Ok(socket)) => Command::Opened { epoch, socket },
                Ok(Err(error)) => Command::ConnectFailed { epoch, error },
                Err(_) => Command::ConnectFailed {
                    epoch,
                    error: Error::connection_timeout(timeout_ms),
                },
            };
            let _ = tx.send(command);
        });
        replace(&mut self.tasks.connect, handle);
    }

    async fn on_open(&mut self, epoch: u64, socket: Socket) {
        self.tasks.connect = None;
        if !self.set_state(ConnectionState::Connected) {
            return;
        }

        let Socket { sink, events } = socket;
        self.sink = Some(sink);
        self.spawn_reader(epoch, events);

        let now = Instant::now();
        let elapsed = self
            .session
            .connect_started_at
            .take()
            .map(|started| now.saturating_duration_since(started));
        self.session.connected_at = Some(now);
        self.session.reset_attempts();

        self.metrics.reset_errors();
        if let Some(elapsed) = elapsed {
            self.metrics.set_connection_time(elapsed);
        }
        self.metrics
            .record_connection(ConnectionEventKind::Connected, elapsed, unix_millis());

        self.start_heartbeat(epoch);

        info!(
            epoch,
            connect_ms = elapsed.map(millis),
            queued = self.queue.len(),
            "Connected"
        );
        self.notify(&Status::Connected);

        self.drain_queue().await;
    }

    fn on_connect_failed(&mut self, error: Error) {
        self.tasks.connect = None;
        self.metrics.record_error(ErrorCategory::Connection);
        self.session.last_error = Some(error.to_string());
        warn!(
            error = %error,
            attempts = self.session.reconnect_attempts,
            "Connect attempt failed"
        );

        if self.set_state(ConnectionState::Reconnecting) {
            self.schedule_reconnect();
        }
    }

    /// Handles an unexpected loss of the open socket.
    fn handle_loss(&mut self, reason: String) {
        match self.session.state() {
            ConnectionState::Connected => {}
            ConnectionState::Draining => {
                self.finish_close();
                return;
            }
            _ => return,
        }

        self.release_socket();
        self.session.advance_epoch();

        let lifetime = self.connection_lifetime();
        self.metrics.record_error(ErrorCategory::Connection);
        self.metrics
            .record_connection(ConnectionEventKind::Lost, lifetime, unix_millis());
        self.session.last_error = Some(reason.clone());

        self.set_state(ConnectionState::Reconnecting);
        warn!(reason = %reason, pending = self.pending.len(), "Connection lost");
        self.notify(&Status::ConnectionLost { reason });

        self.schedule_reconnect();
    }

    /// Schedules the next attempt, or gives up once the policy is spent.
    fn schedule_reconnect(&mut self) {
        let attempts = self.session.reconnect_attempts;

        if !self.policy.allows(attempts) {
            let exhausted = Error::ConnectionExhausted { attempts };
            self.session.mark_exhausted();
            self.session.last_error = Some(exhausted.to_string());
            self.set_state(ConnectionState::Disconnected);
            self.metrics
                .record_connection(ConnectionEventKind::Exhausted, None, unix_millis());
            error!(error = %exhausted, queued = self.queue.len(), "Reconnect attempts exhausted");
            self.notify(&Status::ConnectionExhausted { attempts });
            return;
        }

        let delay = self.policy.delay_for(attempts);
        self.session.reconnect_attempts += 1;
        let attempt = self.session.reconnect_attempts;

        info!(
            attempt,
            max_attempts = self.policy.max_attempts,
            delay_ms = millis(delay),
            "Scheduling reconnect"
        );
        self.notify(&Status::Reconnecting {
            attempt,
            max_attempts: self.policy.max_attempts,
            delay_ms: millis(delay),
        });

        let handle = self.schedule(TimerKind::Reconnect, delay);
        replace(&mut self.tasks.reconnect, handle);
    }

    async fn handle_close(&mut self) {
        match self.session.state() {
            ConnectionState::Connected => {
                abort(&mut self.tasks.heartbeat);
                abort(&mut self.tasks.heartbeat_deadline);
                self.set_state(ConnectionState::Draining);
                info!("Closing connection");
                self.notify(&Status::Closing);

                let written = match self.sink.as_mut() {
                    Some(sink) => sink.close(NORMAL_CLOSURE, CLOSE_REASON).await,
                    None => Err(Error::NotConnected),
                };
                if let Err(e) = written {
                    debug!(error = %e, "Close frame not delivered");
                    self.finish_close();
                    return;
                }

                let handle = self.schedule(TimerKind::CloseTimeout, self.options.heartbeat_timeout());
                replace(&mut self.tasks.close, handle);
            }

            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                abort(&mut self.tasks.connect);
                abort(&mut self.tasks.reconnect);
                self.session.advance_epoch();
                self.session.connect_started_at = None;
                self.set_state(ConnectionState::Disconnected);
                info!("Connect attempt cancelled");
                self.notify(&Status::Disconnected);
            }

            ConnectionState::Disconnected | ConnectionState::Draining => {}
        }
    }

    /// Completes an intentional close.
    fn finish_close(&mut self) {
        self.release_socket();
        self.session.advance_epoch();

        let lifetime = self.connection_lifetime();
        self.metrics
            .record_connection(ConnectionEventKind::Closed, lifetime, unix_millis());

        self.set_state(ConnectionState::Disconnected);
        info!("Connection closed");
        self.notify(&Status::Disconnected);
    }

    /// Terminal teardown. Idempotent.
    async fn destroy(&mut self) {
        if self.session.is_destroyed() {
            return;
        }

        self.tasks.abort_all();

        if let Some(mut sink) = self.sink.take() {
            let close = sink.close(NORMAL_CLOSURE, DESTROY_REASON);
            match tokio::time::timeout(TEARDOWN_CLOSE_TIMEOUT, close).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Close frame not delivered on teardown"),
                Err(_) => debug!("Close frame timed out on teardown"),
            }
        }

        if let Some(lifetime) = self.connection_lifetime() {
            self.metrics.record_connection(
                ConnectionEventKind::Closed,
                Some(lifetime),
                unix_millis(),
            );
        }

        self.session.destroy();
        self.state_tx.send_replace(ConnectionState::Disconnected);

        let dropped_queued = self.queue.clear();
        let dropped_pending = self.pending.purge();
        info!(dropped_queued, dropped_pending, "Transport destroyed");
        self.notify(&Status::Destroyed);
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    async fn on_socket_event(&mut self, event: Option<SocketEvent>) {
        match event {
            Some(SocketEvent::Text(text)) => self.handle_text(&text).await,
            Some(SocketEvent::Closed { code, reason }) => {
                let reason = match code {
                    Some(code) => format!("closed by remote (code {code}) {reason}"),
                    None => format!("closed by remote {reason}"),
                };
                self.handle_loss(reason.trim_end().to_string());
            }
            Some(SocketEvent::Error(message)) => self.handle_loss(message),
            None => self.handle_loss("stream ended".to_string()),
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.record_error(ErrorCategory::Message);
                self.metrics.record_received();
                warn!(error = %e, len = text.len(), "Dropping malformed inbound frame");
                return;
            }
        };

        match frame {
            InboundFrame::Pong => {
                abort(&mut self.tasks.heartbeat_deadline);
                trace!("Heartbeat acknowledged");
            }

            InboundFrame::Ping => {
                self.metrics.record_received();
                let pong = pong_frame(self.next_timestamp());
                let written = match self.sink.as_mut() {
                    Some(sink) => sink.send_text(pong).await,
                    None => Ok(()),
                };
                if let Err(e) = written {
                    self.handle_loss(e.to_string());
                }
            }

            InboundFrame::Ack { message_id } => {
                self.metrics.record_received();
                match self.pending.acknowledge(&message_id, Instant::now()) {
                    Some(latency) => {
                        self.metrics.record_ack(latency);
                        trace!(%message_id, latency_ms = millis(latency), "Message acknowledged");
                    }
                    None => warn!(%message_id, "Acknowledgment for unknown message"),
                }
            }

            InboundFrame::Message(message) => {
                self.metrics.record_received();
                self.shared.handlers.dispatch(message);
            }
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    async fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Reconnect => {
                self.tasks.reconnect = None;
                if self.session.state() == ConnectionState::Reconnecting {
                    self.begin_connect();
                }
            }

            TimerKind::Heartbeat => {
                if self.session.state() != ConnectionState::Connected {
                    return;
                }
                let ping = ping_frame(self.next_timestamp());
                let written = match self.sink.as_mut() {
                    Some(sink) => sink.send_text(ping).await,
                    None => return,
                };
                if let Err(e) = written {
                    self.handle_loss(e.to_string());
                    return;
                }
                trace!("Heartbeat sent");
                if self.tasks.heartbeat_deadline.is_none() {
                    let handle =
                        self.schedule(TimerKind::HeartbeatTimeout, self.options.heartbeat_timeout());
                    self.tasks.heartbeat_deadline = Some(handle);
                }
            }

            TimerKind::HeartbeatTimeout => {
                // Cleared by a pong that raced this timer.
                if self.tasks.heartbeat_deadline.take().is_none() {
                    return;
                }
                self.metrics.record_error(ErrorCategory::Heartbeat);
                warn!(
                    timeout_ms = self.options.heartbeat_timeout_ms,
                    "Heartbeat timed out"
                );
                self.handle_loss("heartbeat timeout".to_string());
            }

            TimerKind::CloseTimeout => {
                self.tasks.close = None;
                if self.session.state() == ConnectionState::Draining {
                    debug!("Close handshake timed out");
                    self.finish_close();
                }
            }

            TimerKind::AckSweep => {
                let expired = self
                    .pending
                    .collect_expired(Instant::now(), self.options.ack_timeout());
                if expired.is_empty() {
                    return;
                }
                self.metrics
                    .record_errors(ErrorCategory::Timeout, expired.len() as u64);
                for id in expired {
                    let error = Error::ack_timeout(id, self.options.ack_timeout_ms);
                    warn!(%id, error = %error, "Message not acknowledged");
                }
            }
        }
    }

    /// Posts `kind` back to the worker after `delay`.
    fn schedule(&self, kind: TimerKind, delay: Duration) -> JoinHandle<()> {
        let tx = self.command_tx.clone();
        let epoch = self.session.epoch();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Command::Timer { epoch, kind });
        })
    }

    fn start_heartbeat(&mut self, epoch: u64) {
        let Some(interval) = self.options.heartbeat_interval() else {
            return;
        };
        let tx = self.command_tx.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let command = Command::Timer {
                    epoch,
                    kind: TimerKind::Heartbeat,
                };
                if tx.send(command).is_err() {
                    break;
                }
            }
        });
        replace(&mut self.tasks.heartbeat, handle);
    }

    fn start_ack_sweep(&mut self) {
        let tx = self.command_tx.clone();
        let period = self.options.ack_sweep_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let command = Command::Timer {
                    epoch: 0,
                    kind: TimerKind::AckSweep,
                };
                if tx.send(command).is_err() {
                    break;
                }
            }
        });
        replace(&mut self.tasks.ack_sweep, handle);
    }

    fn spawn_reader(&mut self, epoch: u64, mut events: BoxStream<'static, SocketEvent>) {
        let tx = self.command_tx.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let terminal = !matches!(event, SocketEvent::Text(_));
                if tx.send(Command::Inbound { epoch, event: Some(event) }).is_err() || terminal {
                    return;
                }
            }
            let _ = tx.send(Command::Inbound { epoch, event: None });
        });
        replace(&mut self.tasks.reader, handle);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Drops the socket and every task tied to it.
    fn release_socket(&mut self) {
        self.tasks.abort_socket();
        self.sink = None;
    }

    fn connection_lifetime(&mut self) -> Option<Duration> {
        self.session
            .connected_at
            .take()
            .map(|at| Instant::now().saturating_duration_since(at))
    }

    /// Transitions and publishes the new state.
    fn set_state(&mut self, to: ConnectionState) -> bool {
        let from = self.session.state();
        if !self.session.transition(to) {
            debug!(%from, %to, "Rejected state transition");
            return false;
        }
        debug!(%from, %to, "State transition");
        self.state_tx.send_replace(to);
        true
    }

    fn notify(&self, status: &Status) {
        self.shared
            .status
            .notify(status, self.session.state().is_healthy());
    }

    fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(TransportSnapshot {
            state: self.session.state(),
            queued: self.queue.len(),
            pending: self.pending.len(),
            reconnect_attempts: self.session.reconnect_attempts,
            last_error: self.session.last_error.clone(),
        })
    }

    /// Wall-clock milliseconds, never below the previous stamp.
    fn next_timestamp(&mut self) -> u64 {
        self.last_timestamp = unix_millis().max(self.last_timestamp);
        self.last_timestamp
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(millis)
        .unwrap_or_default()
}

#[inline]
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
