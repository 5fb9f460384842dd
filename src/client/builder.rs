//! Builder for [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use resilient_ws::{Client, ClientOptions};
//!
//! # async fn example() -> resilient_ws::Result<()> {
//! let client = Client::builder()
//!     .url("wss://example.com/socket")
//!     .options(ClientOptions::new().with_max_queue_depth(50))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::transport::socket::{Connector, WsConnector};

use super::core::Client;
use super::options::ClientOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`].
///
/// Use [`Client::builder()`] to create a new builder.
pub struct ClientBuilder {
    /// Endpoint URL for the default WebSocket connector.
    url: Option<String>,
    /// Custom connector; takes precedence over `url`.
    connector: Option<Arc<dyn Connector>>,
    /// Transport configuration.
    options: ClientOptions,
    /// Start connecting as soon as the client is built.
    connect_on_start: bool,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            url: None,
            connector: None,
            options: ClientOptions::default(),
            connect_on_start: true,
        }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("url", &self.url)
            .field("custom_connector", &self.connector.is_some())
            .field("options", &self.options)
            .field("connect_on_start", &self.connect_on_start)
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket endpoint (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Uses a custom connector instead of a URL.
    #[inline]
    #[must_use]
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Sets the transport options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Controls whether the client connects immediately (default `true`).
    ///
    /// When disabled, the first send or an explicit
    /// [`Client::connect`] starts the connection.
    #[inline]
    #[must_use]
    pub fn connect_on_start(mut self, enabled: bool) -> Self {
        self.connect_on_start = enabled;
        self
    }

    /// Builds the client and spawns its worker task.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if options are invalid, no endpoint is set, or
    ///   no Tokio runtime is running
    /// - [`Error::InvalidUrl`] if the URL does not parse
    pub fn build(self) -> Result<Client> {
        self.options.validate()?;

        let connector = match (self.connector, self.url) {
            (Some(connector), _) => connector,
            (None, Some(url)) => Arc::new(WsConnector::new(&url)?),
            (None, None) => {
                return Err(Error::config(
                    "An endpoint is required. Use .url() or .connector() to set it.\n\
                     Example: Client::builder().url(\"wss://example.com/socket\")",
                ));
            }
        };

        if Handle::try_current().is_err() {
            return Err(Error::config(
                "Client must be built inside a Tokio runtime",
            ));
        }

        Ok(Client::spawn(connector, self.options, self.connect_on_start))
    }
}

// ============================================================================
// Tests
// ============================================================================
