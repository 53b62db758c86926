//! Error types for the negotiation agents

use thiserror::Error;

/// Errors that can occur while producing a proposal
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// A single attempt exceeded its deadline
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The agent answered with something that is not a usable proposal
    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    /// Prompt rendering failed
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AgentError {
    /// Configuration problems will not heal by retrying
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AgentError::Configuration(_)
                | AgentError::Prompt(_)
                | AgentError::Llm(LlmError::Authentication(_))
                | AgentError::Llm(LlmError::InvalidRequest(_))
        )
    }
}

/// Errors specific to LLM provider operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// API error
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Content filtered
    #[error("Content filtered by safety system")]
    ContentFiltered,

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Timeout
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::Network(format!("Connection error: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}

impl From<tera::Error> for AgentError {
    fn from(err: tera::Error) -> Self {
        AgentError::Prompt(err.to_string())
    }
}

/// Result type alias for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
