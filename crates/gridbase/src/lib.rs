//! # gridbase
//!
//! Formula fields for database tables.
//!
//! Gridbase lets a table schema carry computed columns written in a small
//! spreadsheet-like formula language. Formulas are parsed, typed against
//! the schema, and compiled into a single PostgreSQL expression the storage
//! layer can run per row; the engine tracks dependencies between fields and
//! keeps every formula's state consistent as the schema changes.
//!
//! ## Features
//!
//! - Formula parsing with precise error positions
//! - Static typing with implicit coercions and function overloads
//! - Compilation to one PostgreSQL expression per formula
//! - Lookups through link fields, with aggregates pushed into the subquery
//! - Dependency tracking, cycle rejection, and ordered dependent refresh
//! - Broken-formula recovery when referenced fields are deleted or retyped
//!
//! ## Example
//!
//! ```rust
//! use gridbase::prelude::*;
//!
//! let mut ws = FormulaWorkspace::new();
//! let orders = ws.add_table();
//! ws.add_data_field(orders, "Price", FormulaType::number(2)).unwrap();
//!
//! let total = ws
//!     .create_formula_field(orders, "Total", "field('Price') * 1.2")
//!     .unwrap();
//!
//! let record = ws.formula(total).unwrap();
//! assert_eq!(record.state, FormulaState::Valid);
//! assert!(record.compiled.is_some());
//! ```

pub mod error;
pub mod prelude;
pub mod refresh;

pub use error::{Error, Result};
pub use refresh::{
    referenced_fields, FormulaField, FormulaSnapshot, FormulaState, FormulaWorkspace, RefreshStats,
};

// Re-export core types
pub use gridbase_core::{
    Field, FieldCatalog, FieldId, FormulaType, Relation, SchemaCatalog, TableId,
    MAX_DECIMAL_PLACES,
};

// Re-export the formula pipeline
pub use gridbase_formula::{
    compile, default_registry, parse, resolve, Expr, FormulaError, FunctionRegistry, Resolution,
};
