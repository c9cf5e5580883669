//! Chat relay server - Entry Point
//!
//! Binds the configured address and relays messages between participants
//! until Ctrl-C.

use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let config = ServerConfig::load()?;
    let server = Server::bind(config.clone()).await?;
    info!(
        "Chat server listening on {} ({:?} framing)",
        server.local_addr()?,
        config.framing
    );

    server.run_until_ctrl_c().await;
    info!("Chat server stopped");

    Ok(())
}
