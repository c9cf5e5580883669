//! Error types for the chat relay
//!
//! Defines application-level errors, registry contract errors and
//! per-target delivery errors. Uses thiserror for ergonomic error definitions.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::ConnectionId;

/// Application-level errors
///
/// Startup failures (`Bind`, `ConnectionRefused`, `Config`) are fatal to the
/// process. Everything else is contained within a single connection.
#[derive(Debug, Error)]
pub enum AppError {
    /// Listening socket could not be bound (fatal at server startup)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Client could not reach the server (fatal to that client run)
    #[error("connection to {addr} refused: {source}")]
    ConnectionRefused {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Network error while reading from a peer
    #[error("read failure: {0}")]
    ReadFailure(#[source] io::Error),

    /// Network error while writing to a peer
    #[error("write failure: {0}")]
    WriteFailure(#[source] io::Error),

    /// Peer performed an orderly close
    #[error("peer closed the connection")]
    EmptyRead,

    /// Handshake reply was empty after trimming
    #[error("invalid nickname")]
    InvalidNickname,

    /// Own outbox rejected a message (writer task gone)
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Registry contract violation
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Registry errors
///
/// `DuplicateIdentity` and `NotFound` do not occur under correct sequencing;
/// seeing one means a handler broke the register/unregister discipline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The connection is already registered
    #[error("connection {0} is already registered")]
    DuplicateIdentity(ConnectionId),

    /// The connection is not registered
    #[error("connection {0} is not registered")]
    NotFound(ConnectionId),

    /// Entries visible to broadcast must carry a nickname
    #[error("nickname must not be empty")]
    EmptyNickname,

    /// The registry actor has stopped
    #[error("registry closed")]
    Closed,
}

/// Delivery errors
///
/// Occurs when a message cannot be queued on a connection's outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The outbox is full (slow peer); the message is dropped
    #[error("outbox full")]
    Full,

    /// The writer task has ended
    #[error("outbox closed")]
    Closed,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A field holds a value the server cannot run with
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
