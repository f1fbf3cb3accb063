//! Formula error types

use gridbase_core::FormulaType;
use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur while compiling a formula
///
/// Everything before the AST exists is [`FormulaError::Lex`]; everything the
/// parser rejects is [`FormulaError::Parse`]. The remaining variants come out
/// of type resolution, cycle detection, and code generation. Per-row value
/// errors (division by zero) are never represented here; they live inside
/// the compiled expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FormulaError {
    /// Unrecognized character in the source text
    #[error("Unexpected character '{raw_char}' at position {position}")]
    Lex {
        /// Byte offset of the offending character
        position: usize,
        /// The character itself
        raw_char: char,
    },

    /// The token stream did not match the grammar
    #[error("Parse error at position {position}: expected {expected}, found {found}")]
    Parse {
        /// Byte offset of the offending token
        position: usize,
        /// What the grammar wanted here
        expected: String,
        /// What was actually there
        found: String,
    },

    /// No function with this name is registered
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    /// Arguments did not match any overload of the function
    #[error("Invalid arguments to '{function}': {message}")]
    ArgumentTypeMismatch {
        /// The function being called
        function: String,
        /// Human-readable description of the mismatch
        message: String,
    },

    /// A referenced field does not exist (or was deleted)
    #[error("references the deleted or unknown field '{0}'")]
    UnknownFieldReference(String),

    /// The formula's dependency chain reaches its own field
    #[error("Circular reference detected")]
    CircularReference,

    /// Operand types cannot be combined by this operator
    #[error("Operator '{op}' cannot be applied to {left} and {right}")]
    UnsupportedCoercion {
        /// The operator's source form
        op: String,
        /// Left operand type
        left: FormulaType,
        /// Right operand type
        right: FormulaType,
    },

    /// Code generation failed
    #[error("Compile error: {0}")]
    Compile(String),
}
