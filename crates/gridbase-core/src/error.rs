//! Error types for gridbase-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gridbase-core
#[derive(Debug, Error)]
pub enum Error {
    /// Field not found by id
    #[error("Field {0} not found")]
    FieldNotFound(u64),

    /// Field not found by name
    #[error("No field named '{0}' in table {1}")]
    FieldNameNotFound(String, u64),

    /// Table not found
    #[error("Table {0} not found")]
    TableNotFound(u64),

    /// Duplicate field name within a table
    #[error("Table {table} already has a field named '{name}'")]
    DuplicateFieldName {
        /// Owning table id
        table: u64,
        /// Conflicting name
        name: String,
    },

    /// Field is not a link field but a relation was required
    #[error("Field '{0}' is not a link field")]
    NotARelation(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}
