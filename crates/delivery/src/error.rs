use thiserror::Error;

/// Errors surfaced by the delivery engine to its callers.
///
/// The state of the push channel (no clients, slow clients) is never an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid delivery input: {0}")]
    InvalidInput(String),

    #[error("Delivery engine is not running")]
    Closed,
}

impl From<EngineError> for linkcast_common::error::AppError {
    fn from(err: EngineError) -> Self {
        match err {
            // The server builds delivery input itself, so bad input is a bug, not a client error.
            EngineError::InvalidInput(_) => Self::Internal(err.to_string()),
            EngineError::Closed => Self::Delivery(err.to_string()),
        }
    }
}
