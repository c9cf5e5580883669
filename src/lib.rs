//! Multi-client TCP chat relay
//!
//! A learning-oriented chat relay over plain TCP built with tokio.
//!
//! # Features
//! - Nickname handshake (`APELIDO` prompt)
//! - Join and departure announcements
//! - Relay of every message to all other participants
//! - Optional length-prefixed framing
//! - Optional cap on concurrent connections
//! - Duplex client with concurrent receive and send tasks
//!
//! # Architecture
//! - `Registry` is an actor owning the roster; handlers talk to it through
//!   `mpsc` commands with `oneshot` replies, so no locks are held anywhere
//! - Each connection has a handler task (reads) and a writer task (drains
//!   its outbox)
//! - Broadcasts take a registry snapshot and queue onto outboxes without
//!   blocking, so a slow peer never stalls the others
//!
//! # Example
//! ```ignore
//! use chat_relay::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::bind(ServerConfig::default()).await.unwrap();
//!     server.run_until_ctrl_c().await;
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use broadcast::{broadcast, Delivery};
pub use client::ChatClient;
pub use codec::{ChatCodec, Framing};
pub use config::{ClientConfig, ServerConfig};
pub use connection::{Connection, Outbox};
pub use error::{AppError, ConfigError, DeliveryError, RegistryError};
pub use handler::{handle_connection, CloseReason, ConnectionHandler, HandlerState};
pub use message::Message;
pub use registry::{EntryHandle, Participant, Registry};
pub use server::Server;
pub use types::ConnectionId;
