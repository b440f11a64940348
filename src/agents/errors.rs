//! Agent registry error types.

use thiserror::Error;

use super::registry::AgentKey;

/// Errors that can occur while loading or querying the agent registry.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The persona document is not valid YAML or does not match the schema.
    #[error("failed to parse agent registry: {reason}")]
    ParseError { reason: String },

    /// A key appears more than once.
    #[error("agent '{key}' is defined more than once")]
    DuplicateAgent { key: AgentKey },

    /// A key from the fixed set has no definition.
    #[error("agent '{key}' is missing from the registry")]
    MissingAgent { key: AgentKey },

    /// A definition failed validation.
    #[error("agent '{key}' is invalid: {reason}")]
    InvalidAgent { key: AgentKey, reason: String },

    /// Lookup by slug found nothing.
    #[error("unknown agent: '{name}'")]
    UnknownAgent { name: String },
}

impl From<serde_yaml::Error> for AgentError {
    fn from(e: serde_yaml::Error) -> Self {
        AgentError::ParseError {
            reason: e.to_string(),
        }
    }
}
