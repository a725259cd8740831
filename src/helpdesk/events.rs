//! Domain events published after each committed ticket transition.
//!
//! Events are serialized once and fanned out over a tokio broadcast
//! channel; the WebSocket endpoint forwards them verbatim.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use super::models::Ticket;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum HelpdeskEvent {
    TicketCreated {
        ticket: Ticket,
    },
    TicketUpdated {
        before: Box<Ticket>,
        after: Box<Ticket>,
    },
    TicketDeleted {
        ticket_id: i64,
        subject: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<String>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Serialize and broadcast an event. Having no subscribers is fine.
    pub fn publish(&self, event: &HelpdeskEvent) {
        match serde_json::to_string(event) {
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(e) => warn!("failed to serialize event: {}", e),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
