//! Domain-specific errors for reconciliation

use tend_schema::{EntityId, RegistrationError};
use thiserror::Error;

/// A failed call into an apply-backend.
///
/// Recorded on the resource as `ERROR` plus message; the group is retried
/// on every following cycle.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Apply failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{context}: {message}")]
    Context {
        context: &'static str,
        message: String,
    },
}

impl ApplyError {
    /// Create an error with context for better debugging.
    pub fn context(ctx: &'static str, msg: impl std::fmt::Display) -> Self {
        Self::Context {
            context: ctx,
            message: msg.to_string(),
        }
    }
}

/// Planning one group failed; the group is skipped for this cycle.
#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("Failed to observe {entity}: {source}")]
    Observe {
        entity: EntityId,
        #[source]
        source: ApplyError,
    },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Coordinator is not running")]
    WorkerGone,

    #[error("Invalid registration: {0}")]
    Registration(#[from] RegistrationError),
}
