//! Formula field lifecycle and dependent refresh
//!
//! A [`FormulaWorkspace`] owns the schema catalog, one formula record per
//! formula field, and the dependency graph between fields. Edits are
//! validated synchronously and rejected with an error; schema changes that
//! happen later (a referenced field deleted or retyped) never fail the
//! operation itself. Instead each affected formula is re-resolved in
//! dependency order and individually marked valid or broken.
//!
//! # Example
//!
//! ```rust,ignore
//! use gridbase::prelude::*;
//!
//! let mut ws = FormulaWorkspace::new();
//! let orders = ws.add_table();
//! let price = ws.add_data_field(orders, "Price", FormulaType::number(2))?;
//! let total = ws.create_formula_field(orders, "Total", "field('Price') * 1.2")?;
//!
//! let sql = ws.formula(total).unwrap().compiled.as_deref();
//! ```

use crate::error::{Error, Result};
use ahash::AHashMap;
use gridbase_core::{Field, FieldCatalog, FieldId, FormulaType, SchemaCatalog, TableId};
use gridbase_formula::{
    compile, default_registry, parse, resolve, Expr, FieldGraph, FormulaError, FunctionRegistry,
};

/// Lifecycle state of a formula field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormulaState {
    /// Stored but not yet re-validated against the current schema
    Unvalidated,
    /// Resolves and compiles against the current schema
    Valid,
    /// Failed re-validation after a schema change; `error` says why
    Broken,
}

/// A formula field's stored record
#[derive(Debug, Clone)]
pub struct FormulaField {
    /// Table owning the field
    pub table: TableId,
    /// Formula source, canonicalized by the pretty printer on rename
    pub raw_text: String,
    /// Parsed AST, kept so schema changes re-resolve without re-parsing
    pub ast: Expr,
    /// Resolved type; `None` while broken
    pub resolved_type: Option<FormulaType>,
    /// Compiled SQL expression; `None` while broken
    pub compiled: Option<String>,
    /// Why the formula is broken, in end-user terms
    pub error: Option<String>,
    /// Current lifecycle state
    pub state: FormulaState,
}

/// Persisted view of a formula field
///
/// What a host application stores per formula field and hands back on load.
/// The AST is not part of it; `raw_text` is re-parsed on restore.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FormulaSnapshot {
    /// Formula source text
    pub raw_text: String,
    /// Type at the time of the snapshot; `None` for a broken formula
    pub resolved_type: Option<FormulaType>,
    /// Fields the formula depended on, sorted for stable storage
    pub dependency_field_ids: Vec<FieldId>,
    /// Stored breakage message, if any
    pub error: Option<String>,
    /// Lifecycle state at the time of the snapshot
    pub state: FormulaState,
}

/// Outcome of a refresh pass over dependent formulas
#[derive(Debug, Clone, Default)]
pub struct RefreshStats {
    /// Formulas re-validated successfully
    pub refreshed: usize,
    /// Formulas that became (or stayed) broken
    pub broken: usize,
}

/// Schema catalog, formula records, and the dependency graph, kept in sync
#[derive(Debug)]
pub struct FormulaWorkspace {
    catalog: SchemaCatalog,
    formulas: AHashMap<FieldId, FormulaField>,
    graph: FieldGraph,
    registry: &'static FunctionRegistry,
}

impl Default for FormulaWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl FormulaWorkspace {
    /// Create an empty workspace using the built-in function registry
    pub fn new() -> Self {
        Self {
            catalog: SchemaCatalog::new(),
            formulas: AHashMap::new(),
            graph: FieldGraph::new(),
            registry: default_registry(),
        }
    }

    /// The schema catalog
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// The stored record of a formula field
    pub fn formula(&self, field: FieldId) -> Option<&FormulaField> {
        self.formulas.get(&field)
    }

    /// The dependency graph (read-only)
    pub(crate) fn graph(&self) -> &FieldGraph {
        &self.graph
    }

    /// Allocate a new table
    pub fn add_table(&mut self) -> TableId {
        self.catalog.add_table()
    }

    /// Add a plain data field
    pub fn add_data_field(
        &mut self,
        table: TableId,
        name: &str,
        formula_type: FormulaType,
    ) -> Result<FieldId> {
        Ok(self.catalog.add_field(table, name, formula_type)?)
    }

    /// Add a link field relating `table` to `related_table`
    pub fn add_link_field(
        &mut self,
        table: TableId,
        name: &str,
        related_table: TableId,
    ) -> Result<FieldId> {
        Ok(self.catalog.add_link_field(table, name, related_table)?)
    }

    /// Create a formula field, validating the formula synchronously
    ///
    /// A formula that does not parse, resolve, or compile is rejected and
    /// nothing is stored.
    pub fn create_formula_field(
        &mut self,
        table: TableId,
        name: &str,
        text: &str,
    ) -> Result<FieldId> {
        let (ast, resolved_type, dependencies, sql) = self.validate(table, text)?;

        let field = self.catalog.add_field(table, name, resolved_type.clone())?;
        self.graph.set_dependencies(field, dependencies);
        self.formulas.insert(
            field,
            FormulaField {
                table,
                raw_text: text.to_string(),
                ast,
                resolved_type: Some(resolved_type),
                compiled: Some(sql),
                error: None,
                state: FormulaState::Valid,
            },
        );

        log::debug!("created formula field {field} on {table}");
        Ok(field)
    }

    /// Replace a formula field's formula, validating it synchronously
    ///
    /// Dependent formulas are refreshed afterwards; the returned stats say
    /// how many were re-validated and how many broke.
    pub fn update_formula(&mut self, field: FieldId, text: &str) -> Result<RefreshStats> {
        let table = self
            .formulas
            .get(&field)
            .map(|f| f.table)
            .ok_or(gridbase_core::Error::FieldNotFound(field.0))?;

        let (ast, resolved_type, dependencies, sql) = self.validate(table, text)?;

        // Commit the new edges tentatively so the cycle check sees them
        let previous: Vec<FieldId> = self.graph.dependencies_of(field).collect();
        self.graph.set_dependencies(field, dependencies);
        if self.graph.has_circular_reference(field) {
            self.graph.set_dependencies(field, previous);
            return Err(FormulaError::CircularReference.into());
        }

        self.catalog.set_field_type(field, resolved_type.clone())?;
        if let Some(record) = self.formulas.get_mut(&field) {
            record.raw_text = text.to_string();
            record.ast = ast;
            record.resolved_type = Some(resolved_type);
            record.compiled = Some(sql);
            record.error = None;
            record.state = FormulaState::Valid;
        }

        let dependents: Vec<FieldId> = self
            .graph
            .recalc_order(&[field])
            .into_iter()
            .filter(|&f| f != field)
            .collect();
        Ok(self.refresh_fields(&dependents))
    }

    /// Change a data field's type and refresh everything depending on it
    pub fn set_field_type(&mut self, field: FieldId, formula_type: FormulaType) -> Result<RefreshStats> {
        self.catalog.set_field_type(field, formula_type)?;
        let order: Vec<FieldId> = self
            .graph
            .recalc_order(&[field])
            .into_iter()
            .filter(|&f| f != field)
            .collect();
        Ok(self.refresh_fields(&order))
    }

    /// Delete a field
    ///
    /// Formulas referencing it re-resolve against the shrunk schema and
    /// break individually; the deletion itself always succeeds.
    pub fn delete_field(&mut self, field: FieldId) -> Result<RefreshStats> {
        // Capture the refresh order before the edges disappear
        let order: Vec<FieldId> = self
            .graph
            .recalc_order(&[field])
            .into_iter()
            .filter(|&f| f != field)
            .collect();

        self.catalog
            .remove_field(field)
            .ok_or(gridbase_core::Error::FieldNotFound(field.0))?;
        self.formulas.remove(&field);
        self.graph.remove_field(field);

        log::debug!("deleted field {field}, refreshing {} dependents", order.len());
        Ok(self.refresh_fields(&order))
    }

    /// Rename a field, rewriting every formula that references it
    ///
    /// Rewritten formulas get new canonical source text from the pretty
    /// printer; their types and compiled SQL do not change.
    pub fn rename_field(&mut self, field: FieldId, new_name: &str) -> Result<()> {
        let renamed = self
            .catalog
            .field_by_id(field)
            .ok_or(gridbase_core::Error::FieldNotFound(field.0))?;
        let old_name = renamed.name.clone();
        let renamed_table = renamed.table;

        self.catalog.rename_field(field, new_name)?;

        let referencing: Vec<FieldId> = self
            .formulas
            .keys()
            .copied()
            .filter(|&f| self.graph.dependencies_of(f).any(|d| d == field))
            .collect();

        for fid in referencing {
            let Some(record) = self.formulas.get_mut(&fid) else {
                continue;
            };
            let formula_table = record.table;
            rewrite_references(
                &mut record.ast,
                &self.catalog,
                formula_table,
                renamed_table,
                &old_name,
                new_name,
            );
            record.raw_text = record.ast.to_string();
        }

        Ok(())
    }

    /// The persisted view of a formula field
    pub fn snapshot(&self, field: FieldId) -> Option<FormulaSnapshot> {
        let record = self.formulas.get(&field)?;
        let mut dependency_field_ids: Vec<FieldId> = self.graph.dependencies_of(field).collect();
        dependency_field_ids.sort();
        Some(FormulaSnapshot {
            raw_text: record.raw_text.clone(),
            resolved_type: record.resolved_type.clone(),
            dependency_field_ids,
            error: record.error.clone(),
            state: record.state,
        })
    }

    /// Re-create a formula field from its persisted snapshot
    ///
    /// The record enters as `Unvalidated` and is re-validated against the
    /// current schema immediately, so stored text referencing since-deleted
    /// fields comes back `Broken` instead of failing the load. Only text
    /// that no longer parses is rejected.
    pub fn restore_formula_field(
        &mut self,
        table: TableId,
        name: &str,
        snapshot: &FormulaSnapshot,
    ) -> Result<FieldId> {
        let ast = parse(&snapshot.raw_text).map_err(Error::from)?;
        let field_type = snapshot
            .resolved_type
            .clone()
            .unwrap_or(FormulaType::Invalid);
        let field = self.catalog.add_field(table, name, field_type)?;
        self.graph
            .set_dependencies(field, snapshot.dependency_field_ids.iter().copied());
        self.formulas.insert(
            field,
            FormulaField {
                table,
                raw_text: snapshot.raw_text.clone(),
                ast,
                resolved_type: snapshot.resolved_type.clone(),
                compiled: None,
                error: snapshot.error.clone(),
                state: FormulaState::Unvalidated,
            },
        );

        self.refresh_fields(&[field]);
        Ok(field)
    }

    /// Re-validate every broken formula and its dependents
    ///
    /// Useful after schema repairs, e.g. re-adding a field under the name a
    /// broken formula still references.
    pub fn refresh_broken(&mut self) -> RefreshStats {
        let broken: Vec<FieldId> = self
            .formulas
            .iter()
            .filter(|(_, f)| f.state == FormulaState::Broken)
            .map(|(&id, _)| id)
            .collect();
        let order = self.graph.recalc_order(&broken);
        self.refresh_fields(&order)
    }

    /// Parse, resolve, and compile a formula against the current schema
    fn validate(
        &self,
        table: TableId,
        text: &str,
    ) -> Result<(Expr, FormulaType, Vec<FieldId>, String)> {
        let ast = parse(text).map_err(Error::from)?;
        let resolution =
            resolve(&ast, table, &self.catalog, self.registry).map_err(Error::from)?;
        let sql = compile(&resolution.typed, &self.catalog).map_err(Error::from)?;
        let resolved_type = resolution.resolved_type().clone();
        let dependencies: Vec<FieldId> = resolution.dependencies.into_iter().collect();
        Ok((ast, resolved_type, dependencies, sql))
    }

    /// Re-validate formulas in dependency order, recovering errors locally
    fn refresh_fields(&mut self, order: &[FieldId]) -> RefreshStats {
        let mut stats = RefreshStats::default();

        for &fid in order {
            // Take the record out so the catalog can be borrowed alongside
            let Some(mut record) = self.formulas.remove(&fid) else {
                continue;
            };
            record.state = FormulaState::Unvalidated;

            // A broken dependency poisons its dependents with a message
            // naming the root cause, not a cascade of its own error
            let broken_dep = self.graph.dependencies_of(fid).find(|dep| {
                self.formulas
                    .get(dep)
                    .is_some_and(|f| f.state == FormulaState::Broken)
            });

            if let Some(dep) = broken_dep {
                let dep_name = self
                    .catalog
                    .field_by_id(dep)
                    .map(|f| f.name.clone())
                    .unwrap_or_default();
                self.mark_broken(
                    fid,
                    &mut record,
                    format!("references the broken field '{dep_name}'"),
                    &mut stats,
                );
                self.formulas.insert(fid, record);
                continue;
            }

            match resolve(&record.ast, record.table, &self.catalog, self.registry) {
                Ok(resolution) if *resolution.resolved_type() != FormulaType::Invalid => {
                    match compile(&resolution.typed, &self.catalog) {
                        Ok(sql) => {
                            let resolved_type = resolution.resolved_type().clone();
                            self.graph.set_dependencies(fid, resolution.dependencies);
                            // The field still exists; only its type moves
                            let _ = self.catalog.set_field_type(fid, resolved_type.clone());
                            record.resolved_type = Some(resolved_type);
                            record.compiled = Some(sql);
                            record.error = None;
                            record.state = FormulaState::Valid;
                            stats.refreshed += 1;
                        }
                        Err(e) => {
                            self.mark_broken(fid, &mut record, e.to_string(), &mut stats)
                        }
                    }
                }
                Ok(_) => self.mark_broken(
                    fid,
                    &mut record,
                    "references an invalid field".to_string(),
                    &mut stats,
                ),
                Err(e) => self.mark_broken(fid, &mut record, e.to_string(), &mut stats),
            }

            self.formulas.insert(fid, record);
        }

        stats
    }

    /// Mark a formula broken, keeping its graph edges for later recovery
    fn mark_broken(
        &mut self,
        fid: FieldId,
        record: &mut FormulaField,
        message: String,
        stats: &mut RefreshStats,
    ) {
        log::warn!("formula field {fid} broken: {message}");
        record.resolved_type = None;
        record.compiled = None;
        record.error = Some(message);
        record.state = FormulaState::Broken;
        let _ = self.catalog.set_field_type(fid, FormulaType::Invalid);
        stats.broken += 1;
    }
}

/// Rewrite name-based references to a renamed field
///
/// `field(...)` and the link side of `lookup(...)` resolve in the formula's
/// own table; the target side resolves in the linked table, which has to be
/// looked up through the link field.
fn rewrite_references(
    expr: &mut Expr,
    catalog: &SchemaCatalog,
    formula_table: TableId,
    renamed_table: TableId,
    old_name: &str,
    new_name: &str,
) {
    match expr {
        Expr::FieldRef(name) => {
            if renamed_table == formula_table && name == old_name {
                *name = new_name.to_string();
            }
        }
        Expr::LookupRef { through, target } => {
            if renamed_table == formula_table && through == old_name {
                *through = new_name.to_string();
            }
            if let Some(link) = catalog.field_by_name(formula_table, through) {
                if let Some(relation) = &link.relation {
                    if relation.related_table == renamed_table && target == old_name {
                        *target = new_name.to_string();
                    }
                }
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            rewrite_references(left, catalog, formula_table, renamed_table, old_name, new_name);
            rewrite_references(right, catalog, formula_table, renamed_table, old_name, new_name);
        }
        Expr::UnaryOp { operand, .. } => {
            rewrite_references(operand, catalog, formula_table, renamed_table, old_name, new_name);
        }
        Expr::Function { args, .. } => {
            for arg in args {
                rewrite_references(arg, catalog, formula_table, renamed_table, old_name, new_name);
            }
        }
        Expr::Number(_) | Expr::String(_) | Expr::Boolean(_) => {}
    }
}

/// Fields a formula field's compiled SQL reads, for callers scheduling a
/// row-level recompute
pub fn referenced_fields<'a>(
    workspace: &'a FormulaWorkspace,
    field: FieldId,
) -> impl Iterator<Item = &'a Field> + 'a {
    workspace
        .graph
        .dependencies_of(field)
        .filter_map(|dep| workspace.catalog.field_by_id(dep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_and_compile() {
        let mut ws = FormulaWorkspace::new();
        let orders = ws.add_table();
        ws.add_data_field(orders, "Price", FormulaType::number(2))
            .unwrap();

        let total = ws
            .create_formula_field(orders, "Total", "field('Price') * 1.2")
            .unwrap();

        let record = ws.formula(total).unwrap();
        assert_eq!(record.state, FormulaState::Valid);
        assert_eq!(record.resolved_type, Some(FormulaType::number(2)));
        assert!(record.compiled.is_some());
    }

    #[test]
    fn test_bad_edit_is_rejected_synchronously() {
        let mut ws = FormulaWorkspace::new();
        let orders = ws.add_table();

        let err = ws
            .create_formula_field(orders, "Total", "field('Missing') * 2")
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("references the deleted or unknown field "));
        // Nothing was stored
        assert!(ws.catalog().field_by_name(orders, "Total").is_none());
    }

    #[test]
    fn test_snapshot_restore_revalidates() {
        let mut ws = FormulaWorkspace::new();
        let orders = ws.add_table();
        ws.add_data_field(orders, "Price", FormulaType::number(2))
            .unwrap();
        let total = ws
            .create_formula_field(orders, "Total", "field('Price') * 2")
            .unwrap();
        let snapshot = ws.snapshot(total).unwrap();

        // Restore into a schema that still has the referenced field
        let mut fresh = FormulaWorkspace::new();
        let orders2 = fresh.add_table();
        fresh
            .add_data_field(orders2, "Price", FormulaType::number(2))
            .unwrap();
        let restored = fresh
            .restore_formula_field(orders2, "Total", &snapshot)
            .unwrap();
        let record = fresh.formula(restored).unwrap();
        assert_eq!(record.state, FormulaState::Valid);
        assert!(record.compiled.is_some());

        // Restore into a schema missing it comes back broken, not an error
        let mut empty = FormulaWorkspace::new();
        let bare = empty.add_table();
        let restored = empty
            .restore_formula_field(bare, "Total", &snapshot)
            .unwrap();
        let record = empty.formula(restored).unwrap();
        assert_eq!(record.state, FormulaState::Broken);
        assert_eq!(
            record.error.as_deref().unwrap(),
            "references the deleted or unknown field 'Price'"
        );
    }

    #[test]
    fn test_cycle_rejected_and_rolled_back() {
        let mut ws = FormulaWorkspace::new();
        let orders = ws.add_table();
        ws.add_data_field(orders, "Price", FormulaType::number(2))
            .unwrap();
        let a = ws
            .create_formula_field(orders, "A", "field('Price') + 1")
            .unwrap();
        let b = ws.create_formula_field(orders, "B", "field('A') + 1").unwrap();

        let err = ws.update_formula(a, "field('B') + 1").unwrap_err();
        assert!(matches!(
            err,
            Error::Formula(FormulaError::CircularReference)
        ));

        // The previous formula and edges survive the rejected edit
        assert_eq!(ws.formula(a).unwrap().state, FormulaState::Valid);
        assert_eq!(ws.formula(a).unwrap().raw_text, "field('Price') + 1");
        assert!(ws.graph().dependencies_of(b).any(|d| d == a));
    }
}
