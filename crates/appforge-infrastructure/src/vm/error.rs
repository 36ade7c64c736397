//! Errors raised by the workspace VM layer.

use appforge_core::ForgeError;
use thiserror::Error;

/// Failure inside `VmStore`, `VmInstance` or `VmPool`.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("invalid workspace id: {0:?}")]
    InvalidWorkspaceId(String),

    #[error("{0}")]
    InvalidSchema(String),

    #[error("column {column:?} already exists in table {table:?}")]
    ColumnExists { table: String, column: String },

    /// Rejected before reaching SQLite (empty insert, missing WHERE, ...)
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Script(String),

    #[error("script timed out after {0} ms")]
    ScriptTimeout(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rquickjs::Error> for VmError {
    fn from(err: rquickjs::Error) -> Self {
        VmError::Script(err.to_string())
    }
}

impl From<VmError> for ForgeError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::InvalidWorkspaceId(id) => ForgeError::invalid_schema(format!(
                "invalid workspace id: {id:?}"
            )),
            VmError::InvalidSchema(msg) => ForgeError::InvalidSchema(msg),
            VmError::ColumnExists { table, column } => ForgeError::ColumnExists { table, column },
            VmError::InvalidRequest(msg) => ForgeError::Sql(msg),
            VmError::Sqlite(e) => ForgeError::Sql(e.to_string()),
            VmError::Script(msg) => ForgeError::Script(msg),
            VmError::ScriptTimeout(ms) => ForgeError::Timeout(format!("script exceeded {ms} ms")),
            VmError::Io(e) => ForgeError::from(e),
        }
    }
}

pub type VmResult<T> = std::result::Result<T, VmError>;
