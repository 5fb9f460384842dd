//! Client handle.
//!
//! [`Client`] is a cheap, cloneable handle to the worker task. Sends are
//! validated on the caller's side, then handed to the worker which queues
//! or writes them.
//!
//! # Example
//!
//! ```no_run
//! use resilient_ws::{Client, Message};
//!
//! # async fn example() -> resilient_ws::Result<()> {
//! let client = Client::builder().url("ws://127.0.0.1:9000/ws").build()?;
//!
//! client.register_handler("chat", |msg| {
//!     println!("chat: {}", msg.get_str("text"));
//! })?;
//! client.set_status_callback(|status, healthy| {
//!     println!("{status} (healthy: {healthy})");
//! });
//!
//! let id = client.send(Message::new("chat").with_field("text", "hello")).await?;
//! println!("accepted as {id}");
//!
//! client.destroy().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::protocol::{InboundMessage, Message, validate, validate_value};
use crate::transport::socket::Connector;
use crate::transport::{ConnectionState, MetricsSnapshot};

use super::builder::ClientBuilder;
use super::handlers::HandlerRegistry;
use super::options::ClientOptions;
use super::status::{Status, StatusNotifier};
use super::worker::{Command, Shared, Worker};

// ============================================================================
// Client
// ============================================================================

/// Handle to a reliable WebSocket transport.
///
/// Clones share the same worker. The transport is torn down when
/// [`Client::destroy`] is called or the last clone is dropped.
///
/// # Thread Safety
///
/// `Client` is `Send + Sync`; every method may be called from any task.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// Channel to the worker.
    command_tx: mpsc::UnboundedSender<Command>,
    /// Published connection state.
    state_rx: watch::Receiver<ConnectionState>,
    /// Inbound handlers (shared with the worker).
    handlers: Arc<HandlerRegistry>,
    /// Status callback (shared with the worker).
    status: Arc<StatusNotifier>,
    /// Serialized size cap applied before a send reaches the worker.
    max_message_bytes: usize,
    /// Set once teardown was requested.
    destroyed: AtomicBool,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if !self.destroyed.load(Ordering::Acquire) {
            let _ = self.command_tx.send(Command::Destroy { ack: None });
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Client {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Builds a client for `url` with default options and starts
    /// connecting.
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::build`].
    pub fn connect_to(url: impl Into<String>) -> Result<Self> {
        ClientBuilder::new().url(url).build()
    }

    /// Spawns the worker. Must run inside a Tokio runtime.
    pub(crate) fn spawn(
        connector: Arc<dyn Connector>,
        options: ClientOptions,
        connect_on_start: bool,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let handlers = Arc::new(HandlerRegistry::default());
        let status = Arc::new(StatusNotifier::default());
        let max_message_bytes = options.max_message_bytes;

        let shared = Shared {
            handlers: Arc::clone(&handlers),
            status: Arc::clone(&status),
        };
        let worker = Worker::new(
            connector,
            options,
            command_rx,
            command_tx.clone(),
            shared,
            state_tx,
        );
        tokio::spawn(worker.run(connect_on_start));

        Self {
            inner: Arc::new(ClientInner {
                command_tx,
                state_rx,
                handlers,
                status,
                max_message_bytes,
                destroyed: AtomicBool::new(false),
            }),
        }
    }
}

// ============================================================================
// Sending
// ============================================================================

impl Client {
    /// Submits a message.
    ///
    /// Returns the assigned id once the message is written or queued.
    /// Delivery while disconnected is deferred, not an error.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedMessage`] / [`Error::MessageTooLarge`] from validation
    /// - [`Error::QueueFull`] if the outbound queue is at capacity
    /// - [`Error::RateLimited`] if the send limit is exceeded
    /// - [`Error::Json`] if the message cannot be encoded
    /// - [`Error::Destroyed`] after teardown
    pub async fn send(&self, message: Message) -> Result<MessageId> {
        self.ensure_alive()?;
        validate(&message, self.inner.max_message_bytes)?;
        self.request(|reply| Command::Send { message, reply })
            .await?
    }

    /// Submits an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// As [`Client::send`]; non-objects and values without a string
    /// `type` fail with [`Error::MalformedMessage`].
    pub async fn send_value(&self, value: Value) -> Result<MessageId> {
        self.ensure_alive()?;
        let message = validate_value(value, self.inner.max_message_bytes)?;
        self.request(|reply| Command::Send { message, reply })
            .await?
    }

    /// Drops a queued or pending message.
    ///
    /// Returns `false` if the id is neither queued nor pending.
    ///
    /// # Errors
    ///
    /// [`Error::Destroyed`] after teardown.
    pub async fn cancel(&self, id: MessageId) -> Result<bool> {
        self.request(|reply| Command::Cancel { id, reply }).await
    }

    /// Writes a pending message again with its original frame.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownMessage`] if the id is not pending
    /// - [`Error::NotConnected`] if the connection is not healthy
    /// - [`Error::Connection`] if the write failed
    /// - [`Error::Destroyed`] after teardown
    pub async fn retry(&self, id: MessageId) -> Result<()> {
        self.request(|reply| Command::Retry { id, reply }).await?
    }
}

// ============================================================================
// Connection Control
// ============================================================================

impl Client {
    /// Starts connecting, clearing an exhausted reconnect condition.
    ///
    /// Returns once the attempt is started; use
    /// [`Client::wait_until_healthy`] to wait for the open.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if an intentional close is in progress
    /// - [`Error::Destroyed`] after teardown
    pub async fn connect(&self) -> Result<()> {
        self.request(|reply| Command::Connect { reply }).await?
    }

    /// Closes the connection intentionally. No reconnect follows.
    ///
    /// # Errors
    ///
    /// [`Error::Destroyed`] after teardown.
    pub async fn close(&self) -> Result<()> {
        self.request(|reply| Command::Close { reply }).await
    }

    /// Terminal teardown.
    ///
    /// Cancels all timers, closes the socket with code 1000 and drops the
    /// queue and pending table. Safe to call any number of times.
    ///
    /// # Errors
    ///
    /// Never fails; the signature leaves room for future teardown work.
    pub async fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .inner
            .command_tx
            .send(Command::Destroy { ack: Some(ack_tx) })
            .is_err()
        {
            return Ok(());
        }

        let _ = ack_rx.await;
        debug!("Client destroyed");
        Ok(())
    }

    /// Returns `true` after teardown.
    #[inline]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire) || self.inner.command_tx.is_closed()
    }
}

// ============================================================================
// State Observation
// ============================================================================

impl Client {
    /// Returns `true` only while connected.
    #[inline]
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state().is_healthy()
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Returns a receiver notified on every state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Waits until the connection is healthy.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if `timeout` elapses first
    /// - [`Error::Destroyed`] if the client is torn down while waiting
    pub async fn wait_until_healthy(&self, timeout: Duration) -> Result<()> {
        let mut state_rx = self.subscribe_state();
        let waited = tokio::time::timeout(timeout, async move {
            state_rx
                .wait_for(|state| state.is_healthy())
                .await
                .map(|_| ())
        })
        .await;

        match waited {
            Ok(Ok(())) if !self.is_destroyed() => Ok(()),
            Ok(_) => Err(Error::Destroyed),
            Err(_) => Err(Error::connection_timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    /// Returns a metrics snapshot.
    ///
    /// # Errors
    ///
    /// [`Error::Destroyed`] after teardown.
    pub async fn metrics(&self) -> Result<MetricsSnapshot> {
        self.request(|reply| Command::Metrics { reply }).await
    }
}

// ============================================================================
// Callbacks
// ============================================================================

impl Client {
    /// Registers the handler for inbound messages of type `kind`.
    ///
    /// Replaces any previous handler for the same type.
    ///
    /// # Errors
    ///
    /// [`Error::ReservedType`] for `ping`, `pong` and `ack`.
    pub fn register_handler<F>(&self, kind: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(InboundMessage) + Send + Sync + 'static,
    {
        self.inner.handlers.register(kind.into(), Arc::new(handler))
    }

    /// Removes the handler for `kind`.
    pub fn remove_handler(&self, kind: &str) -> bool {
        self.inner.handlers.remove(kind)
    }

    /// Sets the callback invoked on every status change.
    pub fn set_status_callback<F>(&self, callback: F)
    where
        F: Fn(&Status, bool) + Send + Sync + 'static,
    {
        self.inner.status.set(Arc::new(callback));
    }

    /// Removes the status callback.
    pub fn clear_status_callback(&self) {
        self.inner.status.clear();
    }
}

// ============================================================================
// Internal
// ============================================================================

impl Client {
    fn ensure_alive(&self) -> Result<()> {
        if self.inner.destroyed.load(Ordering::Acquire) {
            return Err(Error::Destroyed);
        }
        Ok(())
    }

    /// Sends a command and waits for the worker's reply.
    ///
    /// A command queued behind teardown loses its reply sender; that also
    /// reports [`Error::Destroyed`].
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        self.ensure_alive()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(make(reply_tx))
            .map_err(|_| Error::Destroyed)?;
        reply_rx.await.map_err(|_| Error::Destroyed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};
    use tracing_subscriber::EnvFilter;

    use crate::transport::mock::{MockConnector, Outcome};
    use crate::transport::socket::NORMAL_CLOSURE;

    type StatusLog = Arc<Mutex<Vec<(Status, bool)>>>;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn client_with(connector: &MockConnector, options: ClientOptions) -> Client {
        init_tracing();
        Client::builder()
            .connector(connector.clone())
            .options(options)
            .connect_on_start(false)
            .build()
            .expect("build client")
    }

    fn record_status(client: &Client) -> StatusLog {
        let log: StatusLog = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        client.set_status_callback(move |status, healthy| {
            sink.lock().push((status.clone(), healthy));
        });
        log
    }

    /// Lets every ready task run; with paused time nothing is due yet.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn connected(connector: &MockConnector, options: ClientOptions) -> Client {
        let client = client_with(connector, options);
        assert_ok!(client.connect().await);
        assert_ok!(client.wait_until_healthy(Duration::from_secs(1)).await);
        client
    }

    fn numbered(n: u64) -> Message {
        Message::new("chat").with_field("seq", n)
    }

    // ------------------------------------------------------------------------
    // Send path
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_send_while_healthy_writes_one_frame() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;

        let id = client
            .send(Message::new("chat").with_field("text", "hi"))
            .await
            .expect("send");
        settle().await;

        let written = connector.written_messages();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["type"], "chat");
        assert_eq!(written[0]["text"], "hi");
        assert_eq!(written[0]["messageId"], id.to_string());
        assert!(written[0]["timestamp"].as_u64().is_some());

        let metrics = client.metrics().await.expect("metrics");
        assert_eq!(metrics.pending, 1);
        assert_eq!(metrics.sent, 1);
        assert_eq!(metrics.queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_unique_and_timestamps_non_decreasing() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;

        let mut ids = Vec::new();
        for n in 0..10 {
            ids.push(client.send(numbered(n)).await.expect("send"));
        }
        settle().await;

        let written = connector.written_messages();
        let stamps: Vec<u64> = written
            .iter()
            .map(|m| m["timestamp"].as_u64().expect("timestamp"))
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_after_reconnect() {
        let connector = MockConnector::accepting();
        connector.script([Outcome::Refuse]);
        let client = client_with(&connector, ClientOptions::default());

        let mut ids = Vec::new();
        for n in 0..3 {
            ids.push(client.send(numbered(n)).await.expect("send"));
        }
        settle().await;

        assert_eq!(client.state(), ConnectionState::Reconnecting);
        assert!(connector.written_messages().is_empty());
        assert_eq!(client.metrics().await.expect("metrics").queued, 3);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(client.is_healthy());

        let written = connector.written_messages();
        let seqs: Vec<u64> = written.iter().map(|m| m["seq"].as_u64().unwrap_or(99)).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        let written_ids: Vec<String> = written
            .iter()
            .map(|m| m["messageId"].as_str().unwrap_or_default().to_string())
            .collect();
        let expected: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(written_ids, expected);

        let metrics = client.metrics().await.expect("metrics");
        assert_eq!(metrics.pending, 3);
        assert_eq!(metrics.queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_full_leaves_queue_unchanged() {
        let connector = MockConnector::refusing();
        let client = client_with(&connector, ClientOptions::default());
        let statuses = record_status(&client);

        for n in 0..100 {
            assert_ok!(client.send(numbered(n)).await);
        }
        let err = client.send(numbered(100)).await.unwrap_err();
        assert!(matches!(err, Error::QueueFull { capacity: 100 }));

        assert_eq!(client.metrics().await.expect("metrics").queued, 100);
        assert!(
            statuses
                .lock()
                .iter()
                .any(|(s, _)| *s == Status::QueueFull { capacity: 100 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_message_rejected() {
        let connector = MockConnector::accepting();
        let client = client_with(&connector, ClientOptions::default());

        let big = "x".repeat(2 * 1024 * 1024);
        let err = client
            .send(Message::new("upload").with_field("data", big))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { .. }));
        settle().await;

        let metrics = client.metrics().await.expect("metrics");
        assert_eq!(metrics.queued, 0);
        assert_eq!(metrics.pending, 0);
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_values_rejected() {
        let connector = MockConnector::accepting();
        let client = client_with(&connector, ClientOptions::default());

        for value in [json!({ "text": "no type" }), json!([1, 2]), json!({ "type": 7 })] {
            let err = client.send_value(value).await.unwrap_err();
            assert!(matches!(err, Error::MalformedMessage { .. }));
        }
        let err = client.send(Message::new("ping")).await.unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_requeues_message() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;

        connector.fail_writes(true);
        assert_ok!(client.send(numbered(1)).await);
        settle().await;

        assert_eq!(client.state(), ConnectionState::Reconnecting);
        assert_eq!(client.metrics().await.expect("metrics").queued, 1);

        connector.fail_writes(false);
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        assert!(client.is_healthy());
        assert_eq!(connector.written_messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::new().with_rate_limit(1, 2)).await;

        assert_ok!(client.send(numbered(1)).await);
        assert_ok!(client.send(numbered(2)).await);
        let err = client.send(numbered(3)).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_ok!(client.send(numbered(4)).await);
        assert_eq!(connector.written_messages().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_queued_message() {
        let connector = MockConnector::refusing();
        let client = client_with(&connector, ClientOptions::default());

        let id = client.send(numbered(1)).await.expect("send");
        assert!(client.cancel(id).await.expect("cancel"));
        assert!(!client.cancel(id).await.expect("cancel"));
        assert_eq!(client.metrics().await.expect("metrics").queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_pending_message() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;

        let id = client.send(numbered(1)).await.expect("send");
        assert_ok!(client.retry(id).await);

        let copies = connector
            .written_messages()
            .iter()
            .filter(|m| m["messageId"] == id.to_string())
            .count();
        assert_eq!(copies, 2);

        let err = client.retry(MessageId::generate()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownMessage { .. }));
    }

    // ------------------------------------------------------------------------
    // Reconnection
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_exhaustion() {
        let connector = MockConnector::refusing();
        let client = client_with(&connector, ClientOptions::default());
        let statuses = record_status(&client);

        assert_ok!(client.connect().await);
        tokio::time::sleep(Duration::from_secs(120)).await;

        // Initial attempt plus five reconnects.
        assert_eq!(connector.attempts(), 6);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let log = statuses.lock().clone();
        let reconnects = log
            .iter()
            .filter(|(s, _)| matches!(s, Status::Reconnecting { .. }))
            .count();
        assert_eq!(reconnects, 5);
        assert_eq!(
            log.last(),
            Some(&(Status::ConnectionExhausted { attempts: 5 }, false))
        );

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.attempts(), 6);

        // Sends keep queuing without reconnecting.
        assert_ok!(client.send(numbered(1)).await);
        settle().await;
        assert_eq!(connector.attempts(), 6);

        // An explicit connect resumes.
        connector.set_fallback(Outcome::Accept);
        assert_ok!(client.connect().await);
        assert_ok!(client.wait_until_healthy(Duration::from_secs(1)).await);
        assert_eq!(connector.attempts(), 7);
        assert_eq!(connector.written_messages().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule() {
        let connector = MockConnector::refusing();
        let client = client_with(&connector, ClientOptions::default());

        assert_ok!(client.connect().await);
        settle().await;
        assert_eq!(connector.attempts(), 1);

        tokio::time::sleep(Duration::from_millis(990)).await;
        assert_eq!(connector.attempts(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(connector.attempts(), 2);

        // Second delay doubles.
        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert_eq!(connector.attempts(), 2);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_loss_reconnects() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;
        let statuses = record_status(&client);

        connector.drop_connection();
        settle().await;
        assert_eq!(client.state(), ConnectionState::Reconnecting);
        assert!(
            statuses
                .lock()
                .iter()
                .any(|(s, healthy)| matches!(s, Status::ConnectionLost { .. }) && !healthy)
        );

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(client.is_healthy());
        assert_eq!(connector.attempts(), 2);

        let history = client.metrics().await.expect("metrics").connection_history;
        let events: Vec<_> = history.iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![
                crate::transport::ConnectionEventKind::Connected,
                crate::transport::ConnectionEventKind::Lost,
                crate::transport::ConnectionEventKind::Connected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let connector = MockConnector::accepting();
        connector.script([Outcome::Hang]);
        let client = client_with(&connector, ClientOptions::new().with_connect_timeout(5_000));

        assert_ok!(client.connect().await);
        tokio::time::sleep(Duration::from_millis(5_100)).await;

        assert_eq!(client.state(), ConnectionState::Reconnecting);
        let metrics = client.metrics().await.expect("metrics");
        assert!(metrics.last_error.unwrap_or_default().contains("timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_counters_reset_only_on_connect() {
        let connector = MockConnector::accepting();
        connector.script([Outcome::Refuse]);
        let client = client_with(&connector, ClientOptions::default());

        assert_ok!(client.connect().await);
        settle().await;
        let metrics = client.metrics().await.expect("metrics");
        assert_eq!(metrics.errors.connection, 1);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(client.is_healthy());
        assert_eq!(client.metrics().await.expect("metrics").errors.total(), 0);

        connector.push_text("not json");
        settle().await;
        assert_ok!(client.send(numbered(1)).await);
        assert_eq!(client.metrics().await.expect("metrics").errors.message, 1);

        connector.drop_connection();
        settle().await;
        let errors = client.metrics().await.expect("metrics").errors;
        assert_eq!(errors.message, 1);
        assert_eq!(errors.connection, 1);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(client.is_healthy());
        assert_eq!(client.metrics().await.expect("metrics").errors.total(), 0);
    }

    // ------------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_timeout_forces_reconnect() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::new().with_heartbeat(1_000, 500)).await;
        let statuses = record_status(&client);

        tokio::time::sleep(Duration::from_millis(1_600)).await;

        assert_eq!(connector.written_of_type("ping").len(), 1);
        assert_eq!(client.state(), ConnectionState::Reconnecting);
        assert_eq!(client.metrics().await.expect("metrics").errors.heartbeat, 1);
        assert!(statuses.lock().iter().any(|(s, _)| *s
            == Status::ConnectionLost {
                reason: "heartbeat timeout".to_string()
            }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_keeps_connection_alive() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::new().with_heartbeat(1_000, 500)).await;

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(1_100)).await;
            connector.push_json(&json!({ "type": "pong" }));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert!(client.is_healthy());
        assert_eq!(connector.written_of_type("ping").len(), 3);
        let metrics = client.metrics().await.expect("metrics");
        assert_eq!(metrics.errors.heartbeat, 0);
        // Pongs are not application traffic.
        assert_eq!(metrics.received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_ping_answered() {
        let connector = MockConnector::accepting();
        let _client = connected(&connector, ClientOptions::default()).await;

        connector.push_json(&json!({ "type": "ping", "timestamp": 1 }));
        settle().await;

        assert_eq!(connector.written_of_type("pong").len(), 1);
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_ack_retires_pending_entry() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;

        let id = client.send(numbered(1)).await.expect("send");
        tokio::time::sleep(Duration::from_millis(40)).await;

        connector.push_json(&json!({ "type": "ack", "messageId": MessageId::generate() }));
        settle().await;
        let metrics = client.metrics().await.expect("metrics");
        assert_eq!(metrics.pending, 1);
        assert_eq!(metrics.acknowledged, 0);

        connector.push_json(&json!({ "type": "ack", "messageId": id }));
        settle().await;
        let metrics = client.metrics().await.expect("metrics");
        assert_eq!(metrics.pending, 0);
        assert_eq!(metrics.acknowledged, 1);
        assert!(metrics.average_latency_ms >= 40.0);
        assert!(client.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_timeout_counts_without_resend() {
        let connector = MockConnector::accepting();
        let options = ClientOptions::new().without_heartbeat().with_ack_timeout(2_000);
        let client = connected(&connector, options).await;

        assert_ok!(client.send(numbered(1)).await);
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let metrics = client.metrics().await.expect("metrics");
        assert_eq!(metrics.errors.timeout, 1);
        assert_eq!(metrics.pending, 1);
        assert_eq!(connector.written_messages().len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(client.metrics().await.expect("metrics").errors.timeout, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_to_registered_handler() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client
            .register_handler("chat", move |msg| sink.lock().push(msg.get_str("text").to_string()))
            .expect("register");
        assert_err!(client.register_handler("ack", |_| {}));

        connector.push_json(&json!({ "type": "chat", "text": "hello" }));
        connector.push_json(&json!({ "type": "unknown", "text": "dropped" }));
        settle().await;

        assert_eq!(*seen.lock(), vec!["hello".to_string()]);
        let metrics = client.metrics().await.expect("metrics");
        assert_eq!(metrics.received, 2);
        assert_eq!(metrics.success_rate, 100.0);

        assert!(client.remove_handler("chat"));
        connector.push_json(&json!({ "type": "chat", "text": "again" }));
        settle().await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_inbound_counted() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;

        connector.push_text("{not json");
        connector.push_json(&json!({ "no_type": true }));
        settle().await;

        let metrics = client.metrics().await.expect("metrics");
        assert_eq!(metrics.errors.message, 2);
        assert!(client.is_healthy());
    }

    // ------------------------------------------------------------------------
    // Close and teardown
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_close_goes_through_draining() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;
        let statuses = record_status(&client);

        assert_ok!(client.close().await);
        settle().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(
            connector.closes(),
            vec![(NORMAL_CLOSURE, "Client closed".to_string())]
        );
        let log: Vec<Status> = statuses.lock().iter().map(|(s, _)| s.clone()).collect();
        assert_eq!(log, vec![Status::Closing, Status::Disconnected]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_reconnect() {
        let connector = MockConnector::refusing();
        let client = client_with(&connector, ClientOptions::default());

        assert_ok!(client.connect().await);
        settle().await;
        assert_eq!(client.state(), ConnectionState::Reconnecting);

        assert_ok!(client.close().await);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_is_idempotent() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;
        let statuses = record_status(&client);
        assert_ok!(client.send(numbered(1)).await);

        assert_ok!(client.destroy().await);
        assert_ok!(client.destroy().await);
        settle().await;

        assert!(client.is_destroyed());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(
            connector.closes(),
            vec![(NORMAL_CLOSURE, "Manager destroyed".to_string())]
        );
        let destroyed = statuses
            .lock()
            .iter()
            .filter(|(s, _)| *s == Status::Destroyed)
            .count();
        assert_eq!(destroyed, 1);

        assert!(matches!(
            client.send(numbered(2)).await,
            Err(Error::Destroyed)
        ));
        assert!(matches!(client.metrics().await, Err(Error::Destroyed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_operation_after_destroy_fails_destroyed() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;
        assert_ok!(client.destroy().await);

        let id = MessageId::generate();
        assert!(matches!(client.cancel(id).await, Err(Error::Destroyed)));
        assert!(matches!(client.retry(id).await, Err(Error::Destroyed)));
        assert!(matches!(client.connect().await, Err(Error::Destroyed)));
        assert!(matches!(client.close().await, Err(Error::Destroyed)));
        assert!(matches!(client.metrics().await, Err(Error::Destroyed)));
    }

    #[tokio::test]
    async fn test_command_queued_behind_teardown_fails_destroyed() {
        let connector = MockConnector::accepting();
        let client = client_with(&connector, ClientOptions::default());

        // Teardown reaches the worker without setting the handle's flag.
        client
            .inner
            .command_tx
            .send(Command::Destroy { ack: None })
            .expect("queue teardown");

        let cancelled = client.cancel(MessageId::generate()).await;
        assert!(matches!(cancelled, Err(Error::Destroyed)));
        let metrics = client.metrics().await;
        assert!(matches!(metrics, Err(Error::Destroyed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reconnect_timer_after_destroy() {
        let connector = MockConnector::refusing();
        let client = client_with(&connector, ClientOptions::default());

        assert_ok!(client.connect().await);
        settle().await;
        assert_eq!(client.state(), ConnectionState::Reconnecting);

        assert_ok!(client.destroy().await);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(connector.attempts(), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_tears_down() {
        let connector = MockConnector::accepting();
        let client = connected(&connector, ClientOptions::default()).await;
        let clone = client.clone();

        drop(client);
        settle().await;
        assert!(connector.closes().is_empty());

        drop(clone);
        settle().await;
        assert_eq!(
            connector.closes(),
            vec![(NORMAL_CLOSURE, "Manager destroyed".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_healthy_times_out() {
        let connector = MockConnector::refusing();
        let client = client_with(&connector, ClientOptions::default());

        let err = client
            .wait_until_healthy(Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 500 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_callback_reports_health() {
        let connector = MockConnector::accepting();
        let client = client_with(&connector, ClientOptions::default());
        let statuses = record_status(&client);

        assert_ok!(client.connect().await);
        assert_ok!(client.wait_until_healthy(Duration::from_secs(1)).await);

        assert_eq!(
            *statuses.lock(),
            vec![(Status::Connecting, false), (Status::Connected, true)]
        );
    }

    // ------------------------------------------------------------------------
    // Real WebSocket
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_end_to_end_over_websocket() -> anyhow::Result<()> {
        use futures_util::{SinkExt, StreamExt};
        use tokio::net::TcpListener;
        use tokio_tungstenite::tungstenite::Message as WsMessage;

        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await?;
            let mut ws = tokio_tungstenite::accept_async(stream).await?;

            while let Some(frame) = ws.next().await {
                let WsMessage::Text(text) = frame? else {
                    continue;
                };
                let value: Value = serde_json::from_str(text.as_str())?;
                if value["type"] != "chat" {
                    continue;
                }
                let ack = json!({ "type": "ack", "messageId": value["messageId"] });
                ws.send(WsMessage::Text(ack.to_string().into())).await?;
                let reply = json!({ "type": "chat", "text": "pong from server" });
                ws.send(WsMessage::Text(reply.to_string().into())).await?;
                break;
            }
            anyhow::Ok(())
        });

        let client = Client::builder()
            .url(format!("ws://127.0.0.1:{port}"))
            .build()?;
        let replies = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&replies);
        client.register_handler("chat", move |msg| {
            sink.lock().push(msg.get_str("text").to_string());
        })?;

        client.wait_until_healthy(Duration::from_secs(5)).await?;
        client.send(Message::new("chat").with_field("text", "hi")).await?;

        tokio::time::timeout(Duration::from_secs(5), async {
            while replies.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await?;

        assert_eq!(*replies.lock(), vec!["pong from server".to_string()]);
        let metrics = client.metrics().await?;
        assert_eq!(metrics.acknowledged, 1);
        assert_eq!(metrics.pending, 0);

        client.destroy().await?;
        server.await??;
        Ok(())
    }
}
