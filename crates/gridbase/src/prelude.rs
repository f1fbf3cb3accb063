//! Prelude module - common imports for gridbase users
//!
//! ```rust
//! use gridbase::prelude::*;
//! ```

pub use crate::{
    // Error types
    Error,
    // Schema types
    Field,
    FieldCatalog,
    FieldId,
    // Formula language
    FormulaError,
    // Workspace types
    FormulaField,
    FormulaSnapshot,
    FormulaState,
    FormulaType,
    FormulaWorkspace,
    FunctionRegistry,
    RefreshStats,
    Relation,
    Result,
    SchemaCatalog,
    TableId,
};
