//! SQL compilation
//!
//! Turns a typed AST into a single PostgreSQL expression over the owning
//! table's physical columns. Field columns are named after their field id
//! (`"field_7"`), lookups become correlated subqueries through the link
//! field's join table, and per-row failures (zero divisors, bad casts)
//! surface as a typed error value instead of aborting the whole query.

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::CodeGen;
use crate::typer::{TypedExpr, TypedExprKind};
use gridbase_core::{FieldCatalog, FieldId, FormulaType};

/// Compile a typed formula into a PostgreSQL expression
pub fn compile(typed: &TypedExpr, catalog: &dyn FieldCatalog) -> FormulaResult<String> {
    Compiler { catalog }.expr(typed)
}

/// Quote text as a SQL string literal
fn sql_string(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// The per-row error value for a result of the given type
///
/// Only numeric results have a typed error representation; any other result
/// type degrades to NULL so both branches of the guarding CASE share a type.
fn error_value(ty: &FormulaType) -> &'static str {
    match ty {
        FormulaType::Number { .. } => "'NaN'::numeric",
        _ => "NULL",
    }
}

struct Compiler<'a> {
    catalog: &'a dyn FieldCatalog,
}

impl<'a> Compiler<'a> {
    fn expr(&self, typed: &TypedExpr) -> FormulaResult<String> {
        match &typed.kind {
            TypedExprKind::Number(n) => Ok(n.to_string()),
            TypedExprKind::String(s) => Ok(sql_string(s)),
            TypedExprKind::Boolean(true) => Ok("TRUE".into()),
            TypedExprKind::Boolean(false) => Ok("FALSE".into()),

            TypedExprKind::FieldRef(id) => Ok(format!("\"{id}\"")),

            // A bare lookup materializes the related column as an array
            TypedExprKind::LookupRef { through, target } => {
                let (column, from_where) = self.lookup_parts(*through, *target)?;
                Ok(format!("ARRAY(SELECT {column} {from_where})"))
            }

            TypedExprKind::Function {
                name,
                codegen,
                args,
            } => self.function(name, codegen, args),

            TypedExprKind::BinaryOp { op, left, right } => {
                self.binary(*op, left, right, &typed.ty)
            }

            TypedExprKind::UnaryOp { op, operand } => {
                let inner = self.expr(operand)?;
                Ok(match op {
                    UnaryOperator::Negate => format!("(-({inner}))"),
                    UnaryOperator::Not => format!("(NOT ({inner}))"),
                })
            }

            TypedExprKind::Invalid => Err(FormulaError::Compile(
                "cannot compile an unresolved expression".into(),
            )),
        }
    }

    fn function(
        &self,
        name: &str,
        codegen: &CodeGen,
        args: &[TypedExpr],
    ) -> FormulaResult<String> {
        match codegen {
            CodeGen::Template(template) => {
                let mut sql = (*template).to_string();
                for (i, arg) in args.iter().enumerate() {
                    sql = sql.replace(&format!("{{{i}}}"), &self.expr(arg)?);
                }
                Ok(sql)
            }

            CodeGen::Custom(f) => {
                let compiled: Vec<String> =
                    args.iter().map(|a| self.expr(a)).collect::<FormulaResult<_>>()?;
                Ok(f(&compiled))
            }

            // The aggregate runs inside the lookup's own subquery, so the
            // whole call collapses to a scalar
            CodeGen::Aggregate { sql_fn, coalesce } => {
                let (through, target) = match &args.first().map(|a| &a.kind) {
                    Some(TypedExprKind::LookupRef { through, target }) => (*through, *target),
                    _ => {
                        return Err(FormulaError::Compile(format!(
                            "'{name}' requires a lookup argument"
                        )))
                    }
                };

                let (column, from_where) = self.lookup_parts(through, target)?;

                let mut call_args = vec![column];
                for extra in &args[1..] {
                    call_args.push(self.expr(extra)?);
                }
                let call = format!("{sql_fn}({})", call_args.join(", "));

                let subquery = format!("(SELECT {call} {from_where})");
                Ok(match coalesce {
                    Some(default) => format!("COALESCE({subquery}, {default})"),
                    None => subquery,
                })
            }
        }
    }

    /// The related column reference and the FROM/WHERE tail shared by bare
    /// lookups and pushed-down aggregates
    fn lookup_parts(&self, through: FieldId, target: FieldId) -> FormulaResult<(String, String)> {
        let link = self
            .catalog
            .field_by_id(through)
            .ok_or_else(|| FormulaError::Compile(format!("missing link field {through}")))?;
        let relation = link
            .relation
            .as_ref()
            .ok_or_else(|| FormulaError::Compile(format!("'{}' is not a link field", link.name)))?;

        let column = format!("r.\"{target}\"");
        let from_where = format!(
            "FROM \"{related}\" r JOIN \"jt_{link_id}\" j ON j.related_row_id = r.id \
             WHERE j.row_id = \"{owner}\".id",
            related = relation.related_table,
            link_id = through,
            owner = link.table,
        );
        Ok((column, from_where))
    }

    fn binary(
        &self,
        op: BinaryOperator,
        left: &TypedExpr,
        right: &TypedExpr,
        ty: &FormulaType,
    ) -> FormulaResult<String> {
        let l = self.expr(left)?;
        let r = self.expr(right)?;

        Ok(match op {
            // `+` on textual operands is concatenation
            BinaryOperator::Add if left.ty.is_textual() && right.ty.is_textual() => {
                format!("(({l}) || ({r}))")
            }
            BinaryOperator::Add => format!("(({l}) + ({r}))"),
            // Bare `date - date` is an integer day count in SQL; cast to
            // timestamps so the difference comes out as an interval
            BinaryOperator::Subtract
                if matches!(left.ty, FormulaType::Date { .. })
                    && matches!(right.ty, FormulaType::Date { .. }) =>
            {
                format!("(({l})::timestamp - ({r})::timestamp)")
            }
            BinaryOperator::Subtract => format!("(({l}) - ({r}))"),
            BinaryOperator::Multiply => format!("(({l}) * ({r}))"),
            // A zero divisor is a per-row error value, not a query failure
            BinaryOperator::Divide => {
                let sentinel = error_value(ty);
                format!("CASE WHEN ({r}) = 0 THEN {sentinel} ELSE ({l}) / ({r}) END")
            }
            BinaryOperator::Modulo => {
                let sentinel = error_value(ty);
                format!("CASE WHEN ({r}) = 0 THEN {sentinel} ELSE mod({l}, {r}) END")
            }
            BinaryOperator::Power => format!("power({l}, {r})"),
            BinaryOperator::Equal => format!("(({l}) = ({r}))"),
            BinaryOperator::NotEqual => format!("(({l}) <> ({r}))"),
            BinaryOperator::LessThan => format!("(({l}) < ({r}))"),
            BinaryOperator::LessEqual => format!("(({l}) <= ({r}))"),
            BinaryOperator::GreaterThan => format!("(({l}) > ({r}))"),
            BinaryOperator::GreaterEqual => format!("(({l}) >= ({r}))"),
            BinaryOperator::And => format!("(({l}) AND ({r}))"),
            BinaryOperator::Or => format!("(({l}) OR ({r}))"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::default_registry;
    use crate::parser::parse;
    use crate::typer::resolve;
    use gridbase_core::{FormulaType, SchemaCatalog, TableId};
    use pretty_assertions::assert_eq;

    fn catalog() -> (SchemaCatalog, TableId) {
        let mut catalog = SchemaCatalog::new();
        let orders = catalog.add_table();
        let items = catalog.add_table();
        catalog
            .add_field(orders, "Price", FormulaType::number(2))
            .unwrap();
        catalog
            .add_field(orders, "Count", FormulaType::integer())
            .unwrap();
        catalog.add_field(orders, "Name", FormulaType::Text).unwrap();
        catalog.add_link_field(orders, "Items", items).unwrap();
        catalog
            .add_field(items, "Amount", FormulaType::number(2))
            .unwrap();
        catalog
            .add_field(orders, "Elapsed", FormulaType::Duration)
            .unwrap();
        catalog
            .add_field(orders, "Start", FormulaType::date())
            .unwrap();
        catalog
            .add_field(orders, "Due", FormulaType::date())
            .unwrap();
        (catalog, orders)
    }

    fn compile_text(text: &str) -> String {
        let (catalog, orders) = catalog();
        let ast = parse(text).unwrap();
        let resolution = resolve(&ast, orders, &catalog, default_registry()).unwrap();
        compile(&resolution.typed, &catalog).unwrap()
    }

    fn column(name: &str) -> String {
        let (catalog, orders) = catalog();
        format!("\"{}\"", catalog.field_by_name(orders, name).unwrap().id)
    }

    #[test]
    fn test_field_arithmetic() {
        assert_eq!(
            compile_text("field('Price') * 2"),
            format!("(({}) * (2))", column("Price"))
        );
    }

    #[test]
    fn test_string_literal_quoting() {
        assert_eq!(compile_text(r"'it\'s'"), "'it''s'");
        assert_eq!(
            compile_text("field('Name') + '!'"),
            format!("(({}) || ('!'))", column("Name"))
        );
    }

    #[test]
    fn test_division_guard() {
        assert_eq!(
            compile_text("field('Price') / field('Count')"),
            format!(
                "CASE WHEN ({count}) = 0 THEN 'NaN'::numeric ELSE ({price}) / ({count}) END",
                price = column("Price"),
                count = column("Count"),
            )
        );
    }

    #[test]
    fn test_duration_division_error_branch_is_not_numeric() {
        // The quotient is an interval, so the error value must be NULL:
        // a 'NaN'::numeric branch would make the CASE untypable
        assert_eq!(
            compile_text("field('Elapsed') / 2"),
            format!(
                "CASE WHEN (2) = 0 THEN NULL ELSE ({elapsed}) / (2) END",
                elapsed = column("Elapsed"),
            )
        );
    }

    #[test]
    fn test_date_subtraction_produces_an_interval() {
        assert_eq!(
            compile_text("field('Due') - field('Start')"),
            format!(
                "(({due})::timestamp - ({start})::timestamp)",
                due = column("Due"),
                start = column("Start"),
            )
        );
    }

    #[test]
    fn test_tonumber_of_field_text_is_guarded() {
        let sql = compile_text("tonumber(field('Name'))");
        assert!(sql.starts_with("CASE WHEN "));
        assert!(sql.ends_with("ELSE 'NaN'::numeric END"));
    }

    #[test]
    fn test_todate_of_field_text_is_guarded() {
        let sql = compile_text("todate(field('Name'))");
        assert!(sql.starts_with("CASE WHEN "));
        assert!(sql.contains("::date"));
        assert!(sql.ends_with("ELSE NULL END"));
    }

    #[test]
    fn test_template_function() {
        assert_eq!(
            compile_text("upper(field('Name'))"),
            format!("upper({})", column("Name"))
        );
    }

    #[test]
    fn test_bare_lookup_is_array_subquery() {
        let sql = compile_text("lookup('Items', 'Amount')");
        assert!(sql.starts_with("ARRAY(SELECT r.\"field_"));
        assert!(sql.contains("JOIN \"jt_field_"));
        assert!(sql.contains("WHERE j.row_id = \"table_"));
    }

    #[test]
    fn test_aggregate_pushes_into_subquery() {
        let sql = compile_text("sum(lookup('Items', 'Amount'))");
        assert!(sql.starts_with("COALESCE((SELECT sum(r.\"field_"));
        assert!(sql.ends_with(", 0)"));
        // The aggregated lookup never materializes an array
        assert!(!sql.contains("ARRAY"));
    }

    #[test]
    fn test_join_separator_rides_inside_aggregate() {
        let mut catalog = SchemaCatalog::new();
        let orders = catalog.add_table();
        let items = catalog.add_table();
        catalog.add_link_field(orders, "Items", items).unwrap();
        catalog.add_field(items, "Label", FormulaType::Text).unwrap();

        let ast = parse("join(lookup('Items', 'Label'), ', ')").unwrap();
        let resolution = resolve(&ast, orders, &catalog, default_registry()).unwrap();
        let sql = compile(&resolution.typed, &catalog).unwrap();

        assert!(sql.starts_with("COALESCE((SELECT string_agg(r.\"field_"));
        assert!(sql.contains(", ', ')"));
    }

    #[test]
    fn test_if_compiles_to_case() {
        let sql = compile_text("if(field('Count') = 0, 'empty', field('Name'))");
        assert!(sql.starts_with("CASE WHEN "));
        assert!(sql.contains("THEN 'empty' ELSE "));
        assert!(sql.ends_with(" END"));
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(
            compile_text("-field('Price')"),
            format!("(-({}))", column("Price"))
        );
        assert_eq!(
            compile_text("not (field('Count') = 0)"),
            format!("(NOT ((({}) = (0))))", column("Count"))
        );
    }
}
