//! Broadcast engine
//!
//! Fans one message out to a registry snapshot. Delivery only queues the
//! message on each target's outbox, so no registry operation ever waits on a
//! slow socket, and one failing target cannot hold up the rest.

use tracing::{debug, warn};

use crate::error::{DeliveryError, RegistryError};
use crate::message::Message;
use crate::registry::{Participant, Registry};
use crate::types::ConnectionId;

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Targets the message was queued for
    pub delivered: usize,
    /// Targets that could not take the message
    pub failed: Vec<(ConnectionId, DeliveryError)>,
}

impl Delivery {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// Deliver `msg` to every registered connection except `excluded`
///
/// The registry is left untouched on failure; a connection whose writer
/// died is cleaned up by its own handler.
pub async fn broadcast(
    registry: &Registry,
    msg: &Message,
    excluded: Option<ConnectionId>,
) -> Result<Delivery, RegistryError> {
    let snapshot = registry.snapshot().await?;
    Ok(deliver_all(&snapshot, msg, excluded))
}

/// Deliver `msg` to each participant in `targets` except `excluded`
pub fn deliver_all(
    targets: &[Participant],
    msg: &Message,
    excluded: Option<ConnectionId>,
) -> Delivery {
    let mut delivery = Delivery::default();

    for target in targets.iter().filter(|p| Some(p.id) != excluded) {
        match target.outbox.deliver(msg.clone()) {
            Ok(()) => delivery.delivered += 1,
            Err(e) => {
                warn!("Delivery to {} ('{}') failed: {}", target.id, target.nickname, e);
                delivery.failed.push((target.id, e));
            }
        }
    }

    debug!(
        "Broadcast of {} bytes: {} delivered, {} failed",
        msg.len(),
        delivery.delivered,
        delivery.failed.len()
    );
    delivery
}
