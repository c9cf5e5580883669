//! Registry actor implementation
//!
//! The single source of truth for who is currently in the chat. One actor
//! task owns the ordered entry list; every handler talks to it through a
//! cloneable `Registry` handle over an `mpsc` channel, with `oneshot`
//! replies. Operations are therefore serialized and never interleave.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::REGISTRY_CHANNEL_SIZE;
use crate::connection::Outbox;
use crate::error::RegistryError;
use crate::types::ConnectionId;

/// One registered connection
///
/// Identity, nickname and outbox live in one record, so the roster can
/// never hold a nickname without its connection or the reverse.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ConnectionId,
    pub nickname: String,
    pub outbox: Outbox,
}

/// Receipt for a successful registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHandle {
    pub id: ConnectionId,
    pub nickname: String,
    /// Join order, increasing across the registry's lifetime
    pub seq: u64,
}

/// Commands sent from handlers to the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Add a connection that completed its handshake
    Register {
        id: ConnectionId,
        nickname: String,
        outbox: Outbox,
        reply: oneshot::Sender<Result<EntryHandle, RegistryError>>,
    },
    /// Remove a departing connection
    Unregister {
        id: ConnectionId,
        reply: oneshot::Sender<Result<String, RegistryError>>,
    },
    /// Copy the current roster
    Snapshot {
        reply: oneshot::Sender<Vec<Participant>>,
    },
}

/// The registry actor
///
/// Processes commands one at a time until every `Registry` handle is dropped.
pub struct RegistryActor {
    /// Active connections in join order
    entries: Vec<Participant>,
    /// Next join sequence number
    next_seq: u64,
    /// Command receiver channel
    receiver: mpsc::Receiver<RegistryCommand>,
}

impl RegistryActor {
    /// Create a new actor with the given command receiver
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
            receiver,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        debug!("Registry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        debug!("Registry shutting down with {} entries", self.entries.len());
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                id,
                nickname,
                outbox,
                reply,
            } => {
                let result = self.register(id, nickname, outbox);
                let _ = reply.send(result);
            }
            RegistryCommand::Unregister { id, reply } => {
                let result = self.unregister(id);
                let _ = reply.send(result);
            }
            RegistryCommand::Snapshot { reply } => {
                let _ = reply.send(self.entries.clone());
            }
        }
    }

    fn register(
        &mut self,
        id: ConnectionId,
        nickname: String,
        outbox: Outbox,
    ) -> Result<EntryHandle, RegistryError> {
        if nickname.is_empty() {
            return Err(RegistryError::EmptyNickname);
        }
        if self.entries.iter().any(|p| p.id == id) {
            warn!("Connection {} registered twice", id);
            return Err(RegistryError::DuplicateIdentity(id));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Participant {
            id,
            nickname: nickname.clone(),
            outbox,
        });

        info!("{} joined as '{}' ({} active)", id, nickname, self.entries.len());
        Ok(EntryHandle { id, nickname, seq })
    }

    fn unregister(&mut self, id: ConnectionId) -> Result<String, RegistryError> {
        let Some(index) = self.entries.iter().position(|p| p.id == id) else {
            return Err(RegistryError::NotFound(id));
        };
        let removed = self.entries.remove(index);

        info!("{} ('{}') left ({} active)", id, removed.nickname, self.entries.len());
        Ok(removed.nickname)
    }
}

/// Handle to the registry actor
#[derive(Debug, Clone)]
pub struct Registry {
    sender: mpsc::Sender<RegistryCommand>,
}

impl Registry {
    /// Start a registry actor and return a handle to it
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_SIZE);
        tokio::spawn(RegistryActor::new(receiver).run());
        Self { sender }
    }

    /// Wrap an existing command channel
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Add a connection; fails if its identity is already present
    pub async fn register(
        &self,
        id: ConnectionId,
        nickname: String,
        outbox: Outbox,
    ) -> Result<EntryHandle, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.request(RegistryCommand::Register {
            id,
            nickname,
            outbox,
            reply,
        })
        .await?;
        rx.await.map_err(|_| RegistryError::Closed)?
    }

    /// Remove a connection and return its nickname
    pub async fn unregister(&self, id: ConnectionId) -> Result<String, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.request(RegistryCommand::Unregister { id, reply }).await?;
        rx.await.map_err(|_| RegistryError::Closed)?
    }

    /// Point-in-time copy of the roster, in join order
    ///
    /// Safe to iterate while doing I/O; later joins and departures do not
    /// affect it.
    pub async fn snapshot(&self) -> Result<Vec<Participant>, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.request(RegistryCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| RegistryError::Closed)
    }

    /// Number of active entries
    pub async fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.snapshot().await?.len())
    }

    /// Nicknames in join order
    pub async fn nicknames(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .snapshot()
            .await?
            .into_iter()
            .map(|p| p.nickname)
            .collect())
    }

    async fn request(&self, cmd: RegistryCommand) -> Result<(), RegistryError> {
        self.sender.send(cmd).await.map_err(|_| RegistryError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn outbox() -> Outbox {
        let (outbox, _queue) = Outbox::channel(4);
        outbox
    }

    #[tokio::test]
    async fn test_register_and_snapshot_order() {
        let registry = Registry::spawn();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();

        let a = registry.register(alice, "alice".into(), outbox()).await.unwrap();
        let b = registry.register(bob, "bob".into(), outbox()).await.unwrap();

        assert!(a.seq < b.seq);
        let snapshot = registry.snapshot().await.unwrap();
        let ids: Vec<_> = snapshot.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![alice, bob]);
        assert_eq!(registry.nicknames().await.unwrap(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let registry = Registry::spawn();
        let id = ConnectionId::new();

        registry.register(id, "alice".into(), outbox()).await.unwrap();
        let err = registry
            .register(id, "alice-again".into(), outbox())
            .await
            .unwrap_err();

        assert_eq!(err, RegistryError::DuplicateIdentity(id));
        assert_eq!(registry.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_nickname_different_connections() {
        let registry = Registry::spawn();

        registry.register(ConnectionId::new(), "sam".into(), outbox()).await.unwrap();
        registry.register(ConnectionId::new(), "sam".into(), outbox()).await.unwrap();

        assert_eq!(registry.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_nickname_rejected() {
        let registry = Registry::spawn();
        let err = registry
            .register(ConnectionId::new(), String::new(), outbox())
            .await
            .unwrap_err();

        assert_eq!(err, RegistryError::EmptyNickname);
        assert_eq!(registry.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unregister_twice() {
        let registry = Registry::spawn();
        let id = ConnectionId::new();
        registry.register(id, "alice".into(), outbox()).await.unwrap();

        assert_eq!(registry.unregister(id).await.unwrap(), "alice");
        assert_eq!(
            registry.unregister(id).await.unwrap_err(),
            RegistryError::NotFound(id)
        );
        assert_eq!(registry.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unregister_returns_matching_nickname() {
        let registry = Registry::spawn();
        let ids: Vec<_> = (0..3).map(|_| ConnectionId::new()).collect();
        for (i, id) in ids.iter().enumerate() {
            registry.register(*id, format!("user{}", i), outbox()).await.unwrap();
        }

        assert_eq!(registry.unregister(ids[1]).await.unwrap(), "user1");
        assert_eq!(registry.nicknames().await.unwrap(), vec!["user0", "user2"]);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let registry = Registry::spawn();
        let id = ConnectionId::new();
        registry.register(id, "alice".into(), outbox()).await.unwrap();

        let snapshot = registry.snapshot().await.unwrap();
        registry.unregister(id).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_register_unregister() {
        let registry = Registry::spawn();
        let mut tasks = Vec::new();

        for i in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let id = ConnectionId::new();
                registry.register(id, format!("user{}", i), outbox()).await.unwrap();
                // Odd users leave again, some of them twice
                if i % 2 == 1 {
                    registry.unregister(id).await.unwrap();
                    if i % 3 == 0 {
                        assert!(registry.unregister(id).await.is_err());
                    }
                }
                id
            }));
        }

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }

        let snapshot = registry.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 32);

        let unique: HashSet<_> = snapshot.iter().map(|p| p.id).collect();
        assert_eq!(unique.len(), snapshot.len());
        assert!(snapshot.iter().all(|p| !p.nickname.is_empty()));

        let expected: HashSet<_> = ids.iter().step_by(2).copied().collect();
        assert_eq!(unique, expected);
    }

    #[tokio::test]
    async fn test_closed_registry() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let registry = Registry::new(sender);

        assert_eq!(registry.snapshot().await.unwrap_err(), RegistryError::Closed);
        assert_eq!(
            registry.unregister(ConnectionId::new()).await.unwrap_err(),
            RegistryError::Closed
        );
    }
}
