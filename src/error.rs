//! Error types for the ingest path.

use thiserror::Error;

use crate::filename::ParseError;

/// Ingest operation result type.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors raised while handling a notification or a catalog query.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Filename could not be parsed or violates level/extension rules.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Missing or invalid notification field, or unknown query parameter.
    #[error("{0}")]
    Validation(String),

    /// Notification source/detail-type is not handled.
    #[error("Unknown event source")]
    UnknownSource,

    /// SQLx error (constraint violation, connectivity, etc.)
    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Outbound event could not be delivered.
    #[error("Event publish failed: {0}")]
    Publish(String),
}

impl IngestError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// HTTP-style status code for this error: 400 for caller-correctable
    /// problems, 500 for infrastructure faults.
    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::Parse(_) | IngestError::Validation(_) | IngestError::UnknownSource => 400,
            IngestError::Persistence(_) | IngestError::Publish(_) => 500,
        }
    }
}
