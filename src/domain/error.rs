//! Error taxonomy of the negotiation workflow

use thiserror::Error;

use crate::agents::error::AgentError;
use crate::persistence::PersistenceError;

/// Errors surfaced by negotiation operations
///
/// Authorization and state errors are never retried automatically. Agent
/// and storage errors leave no partial state behind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    /// The actor lacks rights for the requested transition
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The message or item is not in the state the transition requires
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Violates positivity or minimum-price constraints
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// The item is already sold
    #[error("Item {0} is no longer available")]
    ItemNotAvailable(String),

    /// Negotiation is disabled or there is nothing to negotiate yet
    #[error("No active negotiation: {0}")]
    NoActiveNegotiation(String),

    /// The proposal capability failed or timed out
    #[error("Negotiation agent unavailable: {0}")]
    AgentUnavailable(String),

    /// A durable write or read failed; the whole operation may be retried
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl NegotiationError {
    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidPrice(_) => "invalid_price",
            Self::ItemNotAvailable(_) => "item_not_available",
            Self::NoActiveNegotiation(_) => "no_active_negotiation",
            Self::AgentUnavailable(_) => "agent_unavailable",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::ItemNotFound(_) => "item_not_found",
            Self::MessageNotFound(_) => "message_not_found",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    /// Convert to HTTP status code for API responses
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::InvalidPrice(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ItemNotAvailable(_) => StatusCode::CONFLICT,
            Self::NoActiveNegotiation(_) => StatusCode::CONFLICT,
            Self::AgentUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ItemNotFound(_) | Self::MessageNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether the caller may retry the whole operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AgentUnavailable(_) | Self::StorageUnavailable(_))
    }
}

impl From<PersistenceError> for NegotiationError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::StateConflict(reason) => NegotiationError::InvalidState(reason),
            PersistenceError::Duplicate {
                entity_type,
                identifier,
            } => NegotiationError::InvalidState(format!(
                "{} '{}' already exists",
                entity_type, identifier
            )),
            PersistenceError::NotFound {
                entity_type,
                identifier,
            } if entity_type == "message" => NegotiationError::MessageNotFound(identifier),
            PersistenceError::NotFound { identifier, .. } => {
                NegotiationError::ItemNotFound(identifier)
            }
            other =>NegotiationError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<AgentError> for NegotiationError {
    fn from(err: AgentError) -> Self {
        NegotiationError::AgentUnavailable(err.to_string())
    }
}

/// Result type alias for negotiation operations
pub type NegotiationResult<T> = Result<T, NegotiationError>;
