//! Error types for AppForge.

use serde::Serialize;
use thiserror::Error;

/// A shared error type for the entire AppForge workspace.
///
/// Storage, runtime and engine failures are all expressed through these variants.
/// Adapters that wrap third-party errors (SQLite, the JS runtime, HTTP) convert
/// into this type at the crate boundary.
#[derive(Error, Debug, Clone, Serialize)]
pub enum ForgeError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Table or column definition rejected before reaching SQLite
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Column rename onto a name that is already taken
    #[error("Column already exists: {table}.{column}")]
    ColumnExists { table: String, column: String },

    /// Error reported by the SQLite driver, kept verbatim
    #[error("{0}")]
    Sql(String),

    /// Error raised while compiling or running workspace JavaScript
    #[error("Script error: {0}")]
    Script(String),

    /// Session or plan state machine rejected a transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A turn is already running on the session
    #[error("Session is busy: {0}")]
    SessionBusy(String),

    /// LLM provider failure
    #[error("LLM error: {message}")]
    Llm { message: String, retryable: bool },

    /// Operation exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Operation was cancelled by the caller
    #[error("Cancelled")]
    Cancelled,

    /// Caller is not permitted to perform the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Tool or task execution error
    #[error("Execution error: {0}")]
    Execution(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an InvalidSchema error
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema(message.into())
    }

    /// Creates an InvalidTransition error
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition(message.into())
    }

    /// Creates an Llm error
    pub fn llm(message: impl Into<String>, retryable: bool) -> Self {
        Self::Llm {
            message: message.into(),
            retryable,
        }
    }

    /// Creates an Execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a SQLite driver error
    pub fn is_sql(&self) -> bool {
        matches!(self, Self::Sql(_))
    }

    /// Returns true when retrying the same operation may succeed.
    ///
    /// Only LLM failures flagged by the provider as transient and timeouts qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Llm { retryable, .. } => *retryable,
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ForgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ForgeError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ForgeError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, ForgeError>`.
pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ForgeError::llm("rate limited", true).is_retryable());
        assert!(!ForgeError::llm("bad request", false).is_retryable());
        assert!(ForgeError::Timeout("llm".into()).is_retryable());
        assert!(!ForgeError::Cancelled.is_retryable());
    }

    #[test]
    fn test_sql_error_is_verbatim() {
        let err = ForgeError::Sql("no such table: nope".into());
        assert_eq!(err.to_string(), "no such table: nope");
        assert!(err.is_sql());
    }

    #[test]
    fn test_json_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{oops");
        let err: ForgeError = parse.unwrap_err().into();
        assert!(matches!(err, ForgeError::Serialization { ref format, .. } if format == "JSON"));
    }
}
