//! Error types for the workspace facade

use thiserror::Error;

/// Errors surfaced by workspace operations
#[derive(Debug, Error)]
pub enum Error {
    /// Schema-level failure (unknown field, duplicate name, ...)
    #[error(transparent)]
    Schema(#[from] gridbase_core::Error),

    /// Formula rejected while the user was editing it
    #[error(transparent)]
    Formula(#[from] gridbase_formula::FormulaError),
}

/// Result type for workspace operations
pub type Result<T> = std::result::Result<T, Error>;
