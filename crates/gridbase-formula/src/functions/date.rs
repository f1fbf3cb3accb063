//! Date functions

use super::{CodeGen, FunctionDef, FunctionRegistry, ParamType, ReturnRule, Signature};
use crate::ast::Expr;
use chrono::NaiveDate;
use gridbase_core::FormulaType;

impl FunctionRegistry {
    pub(super) fn register_date_functions(&mut self) {
        // TODATE: literal date text is validated while the user edits;
        // field text gets a format guard so a bad row becomes NULL instead
        // of aborting the query
        self.register(FunctionDef {
            name: "todate",
            signatures: vec![Signature {
                params: vec![ParamType::Exact(FormulaType::Text)],
                variadic: false,
                return_rule: ReturnRule::Fixed(FormulaType::date()),
                codegen: CodeGen::Template(
                    r"CASE WHEN ({0}) ~ '^[0-9][0-9][0-9][0-9]-(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])$' THEN ({0})::date ELSE NULL END",
                ),
                validate: Some(validate_date_literal),
            }],
        });

        // YEAR / MONTH / DAY
        self.register(FunctionDef {
            name: "year",
            signatures: vec![Signature::new(
                vec![ParamType::AnyDate],
                ReturnRule::Fixed(FormulaType::integer()),
                CodeGen::Template("EXTRACT(YEAR FROM {0})::numeric"),
            )],
        });

        self.register(FunctionDef {
            name: "month",
            signatures: vec![Signature::new(
                vec![ParamType::AnyDate],
                ReturnRule::Fixed(FormulaType::integer()),
                CodeGen::Template("EXTRACT(MONTH FROM {0})::numeric"),
            )],
        });

        self.register(FunctionDef {
            name: "day",
            signatures: vec![Signature::new(
                vec![ParamType::AnyDate],
                ReturnRule::Fixed(FormulaType::integer()),
                CodeGen::Template("EXTRACT(DAY FROM {0})::numeric"),
            )],
        });

        // DATEDIFF
        self.register(FunctionDef {
            name: "datediff",
            signatures: vec![Signature::new(
                vec![ParamType::AnyDate, ParamType::AnyDate],
                ReturnRule::Fixed(FormulaType::Duration),
                CodeGen::Template("(({0})::timestamp - ({1})::timestamp)"),
            )],
        });

        // NOW / TODAY: evaluated by the storage engine at read time
        self.register(FunctionDef {
            name: "now",
            signatures: vec![Signature::new(
                vec![],
                ReturnRule::Fixed(FormulaType::Date {
                    has_time: true,
                    timezone: None,
                }),
                CodeGen::Template("now()"),
            )],
        });

        self.register(FunctionDef {
            name: "today",
            signatures: vec![Signature::new(
                vec![],
                ReturnRule::Fixed(FormulaType::date()),
                CodeGen::Template("CURRENT_DATE"),
            )],
        });
    }
}

/// Reject literal date text that will not cast
fn validate_date_literal(args: &[Expr]) -> Result<(), String> {
    if let Some(Expr::String(text)) = args.first() {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|_| format!("'{text}' is not a valid date (expected YYYY-MM-DD)"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_date_validation() {
        assert!(validate_date_literal(&[Expr::String("2024-02-29".into())]).is_ok());
        assert!(validate_date_literal(&[Expr::String("2023-02-29".into())]).is_err());
        assert!(validate_date_literal(&[Expr::String("not a date".into())]).is_err());
        // Non-literal arguments can only be checked per row
        assert!(validate_date_literal(&[Expr::FieldRef("Text".into())]).is_ok());
    }
}
