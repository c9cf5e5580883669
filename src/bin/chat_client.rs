//! Chat client - Entry Point
//!
//! Asks for a nickname, connects, then chats over stdin/stdout.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::error;
use tracing_subscriber::EnvFilter;

use chat_relay::{AppError, ChatClient, ClientConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they do not interleave with the chat
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=warn")),
        )
        .init();

    let config = ClientConfig::load()?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Escolha seu apelido: ").await?;
    stdout.flush().await?;

    let mut nickname = String::new();
    stdin.read_line(&mut nickname).await?;
    let nickname = nickname.trim().to_string();
    if nickname.is_empty() {
        return Err(AppError::InvalidNickname.into());
    }

    let client = ChatClient::connect(&config, nickname).await?;
    let result = client.run(stdin, stdout).await;

    // The blocking stdin reader can keep the runtime alive after the
    // session ends, so leave explicitly.
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("Chat session ended: {}", e);
            std::process::exit(1);
        }
    }
}
