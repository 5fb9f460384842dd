//! In-memory connector for state machine tests.
//!
//! Scripts connect outcomes, records every frame the client writes and lets
//! a test play the remote end of the latest connection.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::socket::{Connector, Socket, SocketEvent, SocketSink};

// ============================================================================
// Types
// ============================================================================

/// Outcome of one connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Open a socket.
    Accept,
    /// Fail immediately.
    Refuse,
    /// Never complete.
    Hang,
}

#[derive(Debug)]
struct MockState {
    script: VecDeque<Outcome>,
    fallback: Outcome,
    attempts: u32,
    written: Vec<String>,
    closes: Vec<(u16, String)>,
    peer: Option<mpsc::UnboundedSender<SocketEvent>>,
    fail_writes: bool,
}

/// Scriptable in-memory [`Connector`].
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

// ============================================================================
// MockConnector
// ============================================================================

impl MockConnector {
    /// Creates a connector that accepts every attempt.
    #[must_use]
    pub fn accepting() -> Self {
        Self::with_fallback(Outcome::Accept)
    }

    /// Creates a connector that refuses every attempt.
    #[must_use]
    pub fn refusing() -> Self {
        Self::with_fallback(Outcome::Refuse)
    }

    fn with_fallback(fallback: Outcome) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                fallback,
                attempts: 0,
                written: Vec::new(),
                closes: Vec::new(),
                peer: None,
                fail_writes: false,
            })),
        }
    }

    /// Queues outcomes for the next attempts, ahead of the fallback.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.state.lock().script.extend(outcomes);
    }

    /// Changes the outcome used once the script runs out.
    pub fn set_fallback(&self, outcome: Outcome) {
        self.state.lock().fallback = outcome;
    }

    /// Makes every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Number of connect attempts so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }

    /// All frames written, across connections.
    #[must_use]
    pub fn written(&self) -> Vec<String> {
        self.state.lock().written.clone()
    }

    /// Written frames parsed as JSON, excluding heartbeat traffic.
    #[must_use]
    pub fn written_messages(&self) -> Vec<Value> {
        self.written()
            .iter()
            .filter_map(|frame| serde_json::from_str::<Value>(frame).ok())
            .filter(|value| !matches!(value["type"].as_str(), Some("ping" | "pong")))
            .collect()
    }

    /// Written frames of the given type.
    #[must_use]
    pub fn written_of_type(&self, kind: &str) -> Vec<Value> {
        self.written()
            .iter()
            .filter_map(|frame| serde_json::from_str::<Value>(frame).ok())
            .filter(|value| value["type"].as_str() == Some(kind))
            .collect()
    }

    /// Close frames sent by the client.
    #[must_use]
    pub fn closes(&self) -> Vec<(u16, String)> {
        self.state.lock().closes.clone()
    }

    /// Delivers a text frame on the latest connection.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push(SocketEvent::Text(text.into()));
    }

    /// Delivers a JSON frame on the latest connection.
    pub fn push_json(&self, value: &Value) {
        self.push_text(value.to_string());
    }

    /// Simulates an abnormal drop of the latest connection.
    pub fn drop_connection(&self) {
        self.push(SocketEvent::Closed {
            code: Some(1006),
            reason: "abnormal closure".to_string(),
        });
    }

    fn push(&self, event: SocketEvent) {
        if let Some(peer) = &self.state.lock().peer {
            let _ = peer.send(event);
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Socket> {
        let outcome = {
            let mut state = self.state.lock();
            state.attempts += 1;
            state.script.pop_front().unwrap_or(state.fallback)
        };

        match outcome {
            Outcome::Accept => {}
            Outcome::Refuse => return Err(Error::connection("connection refused")),
            Outcome::Hang => std::future::pending::<()>().await,
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().peer = Some(tx.clone());

        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed();

        Ok(Socket {
            sink: Box::new(MockSink {
                state: Arc::clone(&self.state),
                peer: tx,
            }),
            events,
        })
    }
}

// ============================================================================
// MockSink
// ============================================================================

struct MockSink {
    state: Arc<Mutex<MockState>>,
    peer: mpsc::UnboundedSender<SocketEvent>,
}

#[async_trait]
impl SocketSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(Error::ConnectionClosed);
        }
        state.written.push(text);
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.state.lock().closes.push((code, reason.to_string()));
        // The remote end answers the close handshake.
        let _ = self.peer.send(SocketEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
        Ok(())
    }
}
