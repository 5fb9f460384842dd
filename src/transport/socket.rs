//! Socket abstraction and the WebSocket implementation.
//!
//! The worker only sees a [`Socket`]: a write half that sends text frames
//! and a stream of [`SocketEvent`]s. [`WsConnector`] produces sockets over
//! `tokio-tungstenite`; tests plug in an in-memory connector.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, SplitSink};
use futures_util::{SinkExt, StreamExt, future};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// WebSocket normal closure code.
pub const NORMAL_CLOSURE: u16 = 1000;

// ============================================================================
// Types
// ============================================================================

/// Event observed on the read half of a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame.
    Text(String),
    /// The remote end closed the socket.
    Closed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
    /// Transport error; the socket is unusable afterwards.
    Error(String),
}

/// Write half of a socket.
#[async_trait]
pub trait SocketSink: Send {
    /// Writes one text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Starts the close handshake.
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// An open socket.
pub struct Socket {
    /// Write half.
    pub sink: Box<dyn SocketSink>,
    /// Read half. Ends when the socket is gone.
    pub events: BoxStream<'static, SocketEvent>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket").finish_non_exhaustive()
    }
}

/// Opens sockets to the remote endpoint.
///
/// Called once per connect attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a new socket.
    async fn connect(&self) -> Result<Socket>;
}

// ============================================================================
// WsConnector
// ============================================================================

/// Connector over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    /// Endpoint URL (`ws://` or `wss://`).
    url: Url,
}

impl WsConnector {
    /// Creates a connector for the given endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the URL does not parse
    /// - [`Error::Config`] if the scheme is not `ws` or `wss`
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            scheme => Err(Error::config(format!(
                "Unsupported URL scheme '{scheme}', expected ws or wss"
            ))),
        }
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Socket> {
        let (stream, _response) = connect_async(self.url.as_str()).await?;
        debug!(url = %self.url, "WebSocket connected");

        let (write, read) = stream.split();
        let events = read
            .filter_map(|frame| future::ready(into_event(frame)))
            .boxed();

        Ok(Socket {
            sink: Box::new(WsSink { write }),
            events,
        })
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a tungstenite socket.
struct WsSink {
    write: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl SocketSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.write.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.write.send(WsMessage::Close(Some(frame))).await?;
        Ok(())
    }
}

/// Maps a tungstenite frame to a socket event.
///
/// Ping/Pong control frames are answered by tungstenite and skipped here.
fn into_event(frame: std::result::Result<WsMessage, WsError>) -> Option<SocketEvent> {
    match frame {
        Ok(WsMessage::Text(text)) => Some(SocketEvent::Text(text.as_str().to_owned())),
        Ok(WsMessage::Binary(data)) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Some(SocketEvent::Text(text)),
            Err(_) => {
                trace!(len = data.len(), "Ignoring non UTF-8 binary frame");
                None
            }
        },
        Ok(WsMessage::Close(frame)) => Some(match frame {
            Some(frame) => SocketEvent::Closed {
                code: Some(u16::from(frame.code)),
                reason: frame.reason.as_str().to_owned(),
            },
            None => SocketEvent::Closed {
                code: None,
                reason: String::new(),
            },
        }),
        Ok(_) => None,
        Err(e) => Some(SocketEvent::Error(e.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================
