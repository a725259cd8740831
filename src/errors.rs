//! Typed error hierarchy for the helpdesk.
//!
//! Repository code returns `anyhow::Result` and raises `HelpdeskError`
//! values where the caller needs to branch on the failure (not-found,
//! permission, bad input). The HTTP layer downcasts back to this enum to
//! pick a status code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelpdeskError {
    #[error("Ticket {id} not found")]
    TicketNotFound { id: i64 },

    #[error("Attachment {id} not found")]
    AttachmentNotFound { id: i64 },

    #[error("Priority {id} not found")]
    PriorityNotFound { id: i64 },

    #[error("Agent {id} not found")]
    AgentNotFound { id: i64 },

    #[error("Category {id} not found")]
    CategoryNotFound { id: i64 },

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Attachment storage error at {path}: {source}")]
    Storage {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl HelpdeskError {
    /// True for the variants that map to a 404 response.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TicketNotFound { .. }
                | Self::AttachmentNotFound { .. }
                | Self::PriorityNotFound { .. }
                | Self::AgentNotFound { .. }
                | Self::CategoryNotFound { .. }
        )
    }
}
