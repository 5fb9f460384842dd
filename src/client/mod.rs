//! Client module.
//!
//! The public entry point of the transport.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Handle for sending, callbacks and connection control |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Queue, backoff, heartbeat and limit settings |
//! | [`Status`] | Notifications passed to the status callback |
//!
//! # Example
//!
//! ```no_run
//! use resilient_ws::{Client, ClientOptions, Message, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = Client::builder()
//!     .url("wss://example.com/socket")
//!     .options(ClientOptions::new().with_heartbeat(15_000, 5_000))
//!     .build()?;
//!
//! client.send(Message::new("get_stats")).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for clients.
pub mod builder;

/// Client handle.
pub mod core;

/// Inbound message handlers.
pub mod handlers;

/// Client configuration.
pub mod options;

/// Status notifications.
pub mod status;

/// The task that owns all transport state.
mod worker;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
pub use handlers::MessageHandler;
pub use options::{ClientOptions, RateLimitOptions};
pub use status::{Status, StatusCallback};
