//! Chat client
//!
//! Two tasks share one connection: the receiver prints whatever the server
//! sends (answering the first nickname prompt), the sender turns input
//! lines into `<nickname>: <text>` units. Either side ending cancels the
//! other.

use std::io;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::ChatCodec;
use crate::config::ClientConfig;
use crate::connection::Inbound;
use crate::error::AppError;
use crate::message::Message;

type Outbound<S> = Arc<Mutex<FramedWrite<WriteHalf<S>, ChatCodec>>>;

/// Client side of one chat session
pub struct ChatClient<S> {
    stream: S,
    nickname: String,
    codec: ChatCodec,
}

impl ChatClient<TcpStream> {
    /// Connect to the configured server
    pub async fn connect(config: &ClientConfig, nickname: String) -> Result<Self, AppError> {
        let stream = TcpStream::connect(&config.addr)
            .await
            .map_err(|source| AppError::ConnectionRefused {
                addr: config.addr.clone(),
                source,
            })?;
        info!("Connected to {}", config.addr);

        let codec = ChatCodec::new(config.framing, config.max_unit_size);
        Ok(Self::new(stream, nickname, codec))
    }
}

impl<S> ChatClient<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, nickname: String, codec: ChatCodec) -> Self {
        Self {
            stream,
            nickname,
            codec,
        }
    }

    /// Run the session until either side closes
    ///
    /// `input` supplies lines to send, `output` receives one line per unit
    /// from the server.
    pub async fn run<I, O>(self, input: I, output: O) -> Result<(), AppError>
    where
        I: AsyncBufRead + Send + Unpin + 'static,
        O: AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(self.stream);
        let inbound = FramedRead::new(reader, self.codec);
        let outbound: Outbound<S> = Arc::new(Mutex::new(FramedWrite::new(writer, self.codec)));
        let nickname: Arc<str> = Arc::from(self.nickname);
        let shutdown = CancellationToken::new();

        let receiver = tokio::spawn(receive_loop(
            inbound,
            Arc::clone(&outbound),
            Arc::clone(&nickname),
            output,
            shutdown.clone(),
        ));
        // Known limitation: the sender does not wait for the prompt to be
        // answered. A line sent before the server reads the nickname can
        // arrive in the same unit and become part of it.
        let sender = tokio::spawn(send_loop(
            input,
            Arc::clone(&outbound),
            nickname,
            self.codec.max_unit_size(),
            shutdown.clone(),
        ));

        let (received, sent) = tokio::join!(receiver, sender);

        if let Err(e) = outbound.lock().await.close().await {
            debug!("Closing connection: {}", e);
        }

        received.map_err(|e| AppError::Io(io::Error::other(e)))??;
        sent.map_err(|e| AppError::Io(io::Error::other(e)))??;
        Ok(())
    }
}

async fn receive_loop<S, O>(
    mut inbound: Inbound<S>,
    outbound: Outbound<S>,
    nickname: Arc<str>,
    mut output: O,
    shutdown: CancellationToken,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send,
    O: AsyncWrite + Unpin,
{
    // Cancel the sender however this task ends
    let _guard = shutdown.clone().drop_guard();
    let mut answered = false;

    loop {
        let unit = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = inbound.next() => match frame {
                Some(Ok(unit)) => unit,
                Some(Err(e)) => {
                    warn!("Failed to receive message: {}", e);
                    return Err(AppError::ReadFailure(e));
                }
                None => {
                    info!("Server closed the connection");
                    return Ok(());
                }
            },
        };

        if !answered && unit.is_nickname_prompt() {
            answered = true;
            debug!("Answering nickname prompt as '{}'", nickname);
            outbound
                .lock()
                .await
                .send(Message::text(nickname.as_ref()))
                .await
                .map_err(AppError::WriteFailure)?;
            continue;
        }

        output.write_all(unit.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
}

async fn send_loop<S, I>(
    input: I,
    outbound: Outbound<S>,
    nickname: Arc<str>,
    max_unit_size: usize,
    shutdown: CancellationToken,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send,
    I: AsyncBufRead + Unpin,
{
    let _guard = shutdown.clone().drop_guard();
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => {
                    debug!("Input closed");
                    return Ok(());
                }
            },
        };

        if line.trim().is_empty() {
            continue;
        }

        let msg = Message::chat(&nickname, &line);
        if msg.len() > max_unit_size {
            warn!(
                "Message of {} bytes exceeds the {} byte limit, not sent",
                msg.len(),
                max_unit_size
            );
            continue;
        }

        if let Err(e) = outbound.lock().await.send(msg).await {
            warn!("Failed to send message: {}", e);
            return Err(AppError::WriteFailure(e));
        }
    }
}
