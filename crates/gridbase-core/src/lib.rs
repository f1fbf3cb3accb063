//! # gridbase-core
//!
//! Core data model for the gridbase formula engine: the [`FormulaType`]
//! system, field/table identifiers, and the [`FieldCatalog`] interface the
//! compiler consumes.

pub mod error;
pub mod field;
pub mod formula_type;

pub use error::{Error, Result};
pub use field::{Field, FieldCatalog, FieldId, Relation, SchemaCatalog, TableId};
pub use formula_type::{FormulaType, MAX_DECIMAL_PLACES};
