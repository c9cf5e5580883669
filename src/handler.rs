//! Connection handler
//!
//! Per-connection control loop, moving through three states:
//!
//! ```text
//! AwaitingNickname --nickname--> Active --EOF / error--> Closed
//!        |                                                 ^
//!        +-------------- read failure / bad nickname -----+
//! ```
//!
//! Cleanup on `Closed` runs once: unregister, close the stream, announce
//! the departure. A second call does nothing.

use std::fmt;
use std::io;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::broadcast::broadcast;
use crate::codec::ChatCodec;
use crate::config::ServerConfig;
use crate::connection::{Connection, Inbound};
use crate::error::{AppError, DeliveryError, RegistryError};
use crate::message::{parse_nickname, Message};
use crate::registry::Registry;

/// Handler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Prompt sent, waiting for the nickname reply
    AwaitingNickname,
    /// Registered and relaying
    Active,
    /// Terminal
    Closed,
}

/// Why a handler stopped
#[derive(Debug)]
pub enum CloseReason {
    /// Handshake did not complete; the connection was never registered
    HandshakeFailed(AppError),
    /// Peer performed an orderly close
    PeerClosed,
    /// Network error while reading
    ReadFailure(io::Error),
    /// Writer task ended, usually after a write error
    WriteFailure,
    /// Registry stopped answering
    Registry(RegistryError),
}

impl CloseReason {
    /// Whether this departure should be reported as an error
    pub fn is_error(&self) -> bool {
        !matches!(self, CloseReason::PeerClosed)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::HandshakeFailed(e) => write!(f, "handshake failed: {}", e),
            CloseReason::PeerClosed => write!(f, "peer closed the connection"),
            CloseReason::ReadFailure(e) => write!(f, "read failure: {}", e),
            CloseReason::WriteFailure => write!(f, "write failure"),
            CloseReason::Registry(e) => write!(f, "registry error: {}", e),
        }
    }
}

impl From<CloseReason> for AppError {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::HandshakeFailed(e) => e,
            CloseReason::PeerClosed => AppError::EmptyRead,
            CloseReason::ReadFailure(e) => AppError::ReadFailure(e),
            CloseReason::WriteFailure => AppError::Delivery(DeliveryError::Closed),
            CloseReason::Registry(e) => AppError::Registry(e),
        }
    }
}

/// Handle one accepted stream until it leaves the chat
///
/// Returns `Ok` for an orderly departure and the close reason otherwise.
pub async fn handle_connection<S>(
    stream: S,
    peer: String,
    registry: Registry,
    config: &ServerConfig,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let reason = ConnectionHandler::new(stream, peer, registry, config)
        .run()
        .await;
    if reason.is_error() {
        Err(reason.into())
    } else {
        Ok(())
    }
}

/// Per-connection state machine
pub struct ConnectionHandler<S> {
    connection: Connection,
    inbound: Option<Inbound<S>>,
    registry: Registry,
    state: HandlerState,
    max_unit_size: usize,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, peer: String, registry: Registry, config: &ServerConfig) -> Self {
        let codec = ChatCodec::new(config.framing, config.max_unit_size);
        let (connection, inbound) = Connection::open(stream, peer, codec, config.outbox_capacity);
        info!("Connection {} opened from {}", connection.id, connection.peer);

        Self {
            connection,
            inbound: Some(inbound),
            registry,
            state: HandlerState::AwaitingNickname,
            max_unit_size: config.max_unit_size,
        }
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Drive the connection through handshake, relay and cleanup
    pub async fn run(mut self) -> CloseReason {
        let reason = match self.handshake().await {
            Ok(()) => self.relay().await,
            Err(reason) => reason,
        };

        if reason.is_error() {
            warn!("{} closing: {}", self.connection.display_name(), reason);
        } else {
            debug!("{} closing: {}", self.connection.display_name(), reason);
        }
        self.close().await;
        reason
    }

    async fn handshake(&mut self) -> Result<(), CloseReason> {
        let failed = |e: AppError| CloseReason::HandshakeFailed(e);

        self.connection
            .send(Message::nickname_prompt())
            .map_err(|e| failed(e.into()))?;

        let reply = self.next_unit().await.map_err(|r| failed(r.into()))?;
        let nickname = parse_nickname(&reply)
            .filter(|nickname| self.announcements_fit(nickname))
            .ok_or_else(|| failed(AppError::InvalidNickname))?;
        let outbox = self
            .connection
            .outbox()
            .ok_or_else(|| failed(DeliveryError::Closed.into()))?;

        let entry = self
            .registry
            .register(self.connection.id, nickname.clone(), outbox)
            .await
            .map_err(|e| failed(e.into()))?;
        self.connection.set_nickname(nickname);
        self.state = HandlerState::Active;
        info!(
            "Connection {} is now '{}' (join #{})",
            entry.id, entry.nickname, entry.seq
        );

        match broadcast(&self.registry, &Message::joined(&entry.nickname), Some(entry.id)).await {
            Ok(delivery) => debug!("Join of '{}' announced to {}", entry.nickname, delivery.delivered),
            Err(e) => error!("Failed to announce join of '{}': {}", entry.nickname, e),
        }

        // A dead writer surfaces in the relay loop
        if let Err(e) = self.connection.send(Message::connected()) {
            debug!("Confirmation to '{}' not queued: {}", entry.nickname, e);
        }
        Ok(())
    }

    /// Join and departure announcements must fit in one unit
    fn announcements_fit(&self, nickname: &str) -> bool {
        let longest = Message::joined(nickname)
            .len()
            .max(Message::left(nickname).len());
        longest <= self.max_unit_size
    }

    async fn relay(&mut self) -> CloseReason {
        loop {
            let unit = match self.next_unit().await {
                Ok(unit) => unit,
                Err(reason) => return reason,
            };
            debug!(
                "{} bytes from '{}'",
                unit.len(),
                self.connection.display_name()
            );

            if let Err(e) = broadcast(&self.registry, &unit, Some(self.connection.id)).await {
                return CloseReason::Registry(e);
            }
        }
    }

    /// Next non-empty unit, or why there will be none
    async fn next_unit(&mut self) -> Result<Message, CloseReason> {
        let writer_stopped = self.connection.writer_stopped();
        let Some(inbound) = self.inbound.as_mut() else {
            return Err(CloseReason::PeerClosed);
        };

        loop {
            tokio::select! {
                frame = inbound.next() => match frame {
                    Some(Ok(unit)) if unit.is_empty() => continue,
                    Some(Ok(unit)) => return Ok(unit),
                    Some(Err(e)) => return Err(CloseReason::ReadFailure(e)),
                    None => return Err(CloseReason::PeerClosed),
                },
                _ = writer_stopped.cancelled() => return Err(CloseReason::WriteFailure),
            }
        }
    }

    /// Leave the chat; runs at most once
    pub async fn close(&mut self) {
        if self.state == HandlerState::Closed {
            return;
        }
        self.state = HandlerState::Closed;

        let departed = if self.connection.has_nickname() {
            match self.registry.unregister(self.connection.id).await {
                Ok(nickname) => Some(nickname),
                Err(RegistryError::NotFound(id)) => {
                    debug!("Connection {} was already unregistered", id);
                    None
                }
                Err(e) => {
                    error!("Failed to unregister {}: {}", self.connection.id, e);
                    None
                }
            }
        } else {
            None
        };

        self.inbound.take();
        self.connection.close().await;

        if let Some(nickname) = departed {
            match broadcast(&self.registry, &Message::left(&nickname), None).await {
                Ok(delivery) => debug!("Departure of '{}' announced to {}", nickname, delivery.delivered),
                Err(e) => error!("Failed to announce departure of '{}': {}", nickname, e),
            }
        }

        info!("Connection {} closed", self.connection.id);
    }
}
