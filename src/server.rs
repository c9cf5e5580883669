//! Chat server
//!
//! Owns the listening socket and the registry, and spawns one handler task
//! per accepted connection.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::registry::Registry;

/// Listening chat relay
pub struct Server {
    listener: TcpListener,
    registry: Registry,
    config: Arc<ServerConfig>,
    /// Present when `max_connections` is set
    limiter: Option<Arc<Semaphore>>,
}

impl Server {
    /// Bind the configured address and start the registry
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let listener = TcpListener::bind(&config.addr)
            .await
            .map_err(|source| AppError::Bind {
                addr: config.addr.clone(),
                source,
            })?;

        let limiter = config
            .max_connections
            .map(|max| Arc::new(Semaphore::new(max)));

        Ok(Self {
            listener,
            registry: Registry::spawn(),
            config: Arc::new(config),
            limiter,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the roster shared with every handler
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// Handlers already running are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let permit = match &self.limiter {
                Some(limiter) => tokio::select! {
                    _ = &mut shutdown => break,
                    permit = Arc::clone(limiter).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                },
                None => None,
            };

            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_handler(stream, addr, permit),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }

        info!("Accept loop stopped");
    }

    /// Accept connections until Ctrl-C
    pub async fn run_until_ctrl_c(self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    fn spawn_handler(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        info!("New connection from {}", addr);
        let registry = self.registry.clone();
        let config = Arc::clone(&self.config);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr.to_string(), registry, &config).await {
                warn!("Connection from {} ended: {}", addr, e);
            }
            drop(permit);
        });
    }
}
