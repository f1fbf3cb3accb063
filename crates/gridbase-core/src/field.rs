//! Fields, tables, and the catalog interface
//!
//! The formula engine never walks live object references between fields
//! (that would make mutually referencing formulas an ownership cycle).
//! Fields live in an arena keyed by integer ids and every cross-field
//! relationship goes through [`FieldId`].

use crate::error::{Error, Result};
use crate::formula_type::FormulaType;
use ahash::AHashMap;
use std::fmt;

/// Unique identifier of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldId(pub u64);

/// Unique identifier of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableId(pub u64);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field_{}", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table_{}", self.0)
    }
}

/// A link relationship to another table
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relation {
    /// The table the link points at (1:N or N:N)
    pub related_table: TableId,
}

/// A table field as the formula engine sees it
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Stable id, never reused
    pub id: FieldId,
    /// Owning table
    pub table: TableId,
    /// User-visible name, unique within the table
    pub name: String,
    /// The field's value type
    pub formula_type: FormulaType,
    /// Present iff this is a link field
    pub relation: Option<Relation>,
}

impl Field {
    /// Whether this field links to another table
    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }
}

/// Read-only view of the schema, consumed by the type resolver and compiler
///
/// Implementations must present a consistent snapshot for the duration of a
/// single resolve/compile run; the engine never mutates the catalog.
pub trait FieldCatalog {
    /// Look up a field by display name within a table
    fn field_by_name(&self, table: TableId, name: &str) -> Option<&Field>;

    /// Look up a field by id
    fn field_by_id(&self, id: FieldId) -> Option<&Field>;

    /// Message fragment stored on formulas whose dependency disappeared
    fn deleted_field_error(&self) -> &str {
        "references the deleted or unknown field"
    }
}

/// In-memory field catalog
///
/// Backs the refresh pipeline and tests; a production deployment would
/// implement [`FieldCatalog`] over its own schema snapshot instead.
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    fields: AHashMap<FieldId, Field>,
    next_field_id: u64,
    next_table_id: u64,
}

impl SchemaCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new table id
    pub fn add_table(&mut self) -> TableId {
        let id = TableId(self.next_table_id);
        self.next_table_id += 1;
        id
    }

    /// Add a field to a table
    pub fn add_field(
        &mut self,
        table: TableId,
        name: &str,
        formula_type: FormulaType,
    ) -> Result<FieldId> {
        self.insert_field(table, name, formula_type, None)
    }

    /// Add a link field relating `table` to `related_table`
    pub fn add_link_field(
        &mut self,
        table: TableId,
        name: &str,
        related_table: TableId,
    ) -> Result<FieldId> {
        self.insert_field(
            table,
            name,
            FormulaType::Text,
            Some(Relation { related_table }),
        )
    }

    fn insert_field(
        &mut self,
        table: TableId,
        name: &str,
        formula_type: FormulaType,
        relation: Option<Relation>,
    ) -> Result<FieldId> {
        if self.field_by_name(table, name).is_some() {
            return Err(Error::DuplicateFieldName {
                table: table.0,
                name: name.to_string(),
            });
        }
        let id = FieldId(self.next_field_id);
        self.next_field_id += 1;
        self.fields.insert(
            id,
            Field {
                id,
                table,
                name: name.to_string(),
                formula_type,
                relation,
            },
        );
        Ok(id)
    }

    /// Remove a field; returns the removed field if it existed
    pub fn remove_field(&mut self, id: FieldId) -> Option<Field> {
        self.fields.remove(&id)
    }

    /// Change a field's type
    pub fn set_field_type(&mut self, id: FieldId, formula_type: FormulaType) -> Result<()> {
        let field = self.fields.get_mut(&id).ok_or(Error::FieldNotFound(id.0))?;
        field.formula_type = formula_type;
        Ok(())
    }

    /// Rename a field, enforcing per-table uniqueness
    pub fn rename_field(&mut self, id: FieldId, new_name: &str) -> Result<()> {
        let table = self
            .fields
            .get(&id)
            .ok_or(Error::FieldNotFound(id.0))?
            .table;
        if let Some(existing) = self.field_by_name(table, new_name) {
            if existing.id != id {
                return Err(Error::DuplicateFieldName {
                    table: table.0,
                    name: new_name.to_string(),
                });
            }
        }
        if let Some(field) = self.fields.get_mut(&id) {
            field.name = new_name.to_string();
        }
        Ok(())
    }

    /// Iterate over every field in a table
    pub fn fields_in_table(&self, table: TableId) -> impl Iterator<Item = &Field> {
        self.fields.values().filter(move |f| f.table == table)
    }

    /// Iterate over every field in the catalog
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }
}

impl FieldCatalog for SchemaCatalog {
    fn field_by_name(&self, table: TableId, name: &str) -> Option<&Field> {
        self.fields
            .values()
            .find(|f| f.table == table && f.name == name)
    }

    fn field_by_id(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_and_look_up_fields() {
        let mut catalog = SchemaCatalog::new();
        let table = catalog.add_table();
        let price = catalog
            .add_field(table, "Price", FormulaType::number(2))
            .unwrap();

        let by_name = catalog.field_by_name(table, "Price").unwrap();
        assert_eq!(by_name.id, price);
        assert_eq!(by_name.formula_type, FormulaType::number(2));
        assert!(catalog.field_by_name(table, "Missing").is_none());
    }

    #[test]
    fn test_duplicate_names_rejected_per_table() {
        let mut catalog = SchemaCatalog::new();
        let t1 = catalog.add_table();
        let t2 = catalog.add_table();
        catalog.add_field(t1, "Name", FormulaType::Text).unwrap();

        assert!(catalog.add_field(t1, "Name", FormulaType::Text).is_err());
        // Same name in a different table is fine
        assert!(catalog.add_field(t2, "Name", FormulaType::Text).is_ok());
    }

    #[test]
    fn test_link_fields_carry_relation() {
        let mut catalog = SchemaCatalog::new();
        let orders = catalog.add_table();
        let items = catalog.add_table();
        let link = catalog.add_link_field(orders, "Items", items).unwrap();

        let field = catalog.field_by_id(link).unwrap();
        assert!(field.is_relation());
        assert_eq!(field.relation.as_ref().unwrap().related_table, items);
    }

    #[test]
    fn test_rename_keeps_uniqueness() {
        let mut catalog = SchemaCatalog::new();
        let table = catalog.add_table();
        let a = catalog.add_field(table, "A", FormulaType::Text).unwrap();
        catalog.add_field(table, "B", FormulaType::Text).unwrap();

        assert!(catalog.rename_field(a, "B").is_err());
        catalog.rename_field(a, "C").unwrap();
        assert_eq!(catalog.field_by_id(a).unwrap().name, "C");
    }
}
