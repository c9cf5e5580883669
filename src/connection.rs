//! Connection struct definition
//!
//! Represents one accepted byte stream: its identity, its nickname once the
//! handshake completes, and the outbound queue drained by a writer task.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::ChatCodec;
use crate::error::DeliveryError;
use crate::message::Message;
use crate::types::ConnectionId;

/// How long `close` waits for queued messages to flush
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Inbound half of a connection, yielding one `Message` per unit
pub type Inbound<S> = FramedRead<ReadHalf<S>, ChatCodec>;

/// Sending side of a connection's outbound queue
///
/// Cloned into the registry so broadcasts can reach the connection without
/// touching its stream.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: mpsc::Sender<Message>,
}

impl Outbox {
    /// Create an outbox and the receiver its writer drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queue a message without waiting
    ///
    /// A full queue drops the message rather than stalling the caller.
    pub fn deliver(&self, msg: Message) -> Result<(), DeliveryError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Connected participant as seen by its handler
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Remote address, for logging
    pub peer: String,
    /// Nickname (None before handshake)
    pub nickname: Option<String>,
    outbox: Option<Outbox>,
    writer: Option<JoinHandle<()>>,
    writer_stopped: CancellationToken,
}

impl Connection {
    /// Split `stream`, start its writer task and return the inbound half
    pub fn open<S>(
        stream: S,
        peer: impl Into<String>,
        codec: ChatCodec,
        outbox_capacity: usize,
    ) -> (Self, Inbound<S>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let id = ConnectionId::new();
        let (reader, writer) = tokio::io::split(stream);
        let (outbox, queue) = Outbox::channel(outbox_capacity);
        let writer_stopped = CancellationToken::new();

        let sink = FramedWrite::new(writer, codec);
        let writer = tokio::spawn(write_loop(id, sink, queue, writer_stopped.clone()));

        let connection = Self {
            id,
            peer: peer.into(),
            nickname: None,
            outbox: Some(outbox),
            writer: Some(writer),
            writer_stopped,
        };
        (connection, FramedRead::new(reader, codec))
    }

    /// Queue a message for this connection
    pub fn send(&self, msg: Message) -> Result<(), DeliveryError> {
        match &self.outbox {
            Some(outbox) => outbox.deliver(msg),
            None => Err(DeliveryError::Closed),
        }
    }

    /// Handle for the registry; `None` once closed
    pub fn outbox(&self) -> Option<Outbox> {
        self.outbox.clone()
    }

    /// Cancelled when the writer task ends
    pub fn writer_stopped(&self) -> CancellationToken {
        self.writer_stopped.clone()
    }

    /// Get the display name for this connection
    ///
    /// Returns the nickname if set, otherwise the peer address.
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.peer)
    }

    /// Check if this connection has completed the handshake
    pub fn has_nickname(&self) -> bool {
        self.nickname.is_some()
    }

    pub fn set_nickname(&mut self, nickname: String) {
        self.nickname = Some(nickname);
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_none()
    }

    /// Stop accepting messages, flush what is queued and shut the stream down
    ///
    /// Calling it again is a no-op.
    pub async fn close(&mut self) {
        if self.outbox.take().is_none() {
            return;
        }
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            warn!("Writer for {} did not drain in time, aborting", self.id);
            writer.abort();
        }
    }
}

async fn write_loop<W>(
    id: ConnectionId,
    mut sink: FramedWrite<W, ChatCodec>,
    mut queue: mpsc::Receiver<Message>,
    stopped: CancellationToken,
) where
    W: AsyncWrite + Send + Unpin,
{
    while let Some(msg) = queue.recv().await {
        if !sink.encoder().can_encode(&msg) {
            warn!("Dropping {} byte message for {}: exceeds unit size", msg.len(), id);
            continue;
        }
        if let Err(e) = sink.send(msg).await {
            warn!("Write to {} failed: {}", id, e);
            break;
        }
    }
    debug!("Writer for {} ended", id);

    let _ = sink.close().await;
    stopped.cancel();
}
