//! Text functions

use super::{CodeGen, FunctionDef, FunctionRegistry, ParamType, ReturnRule, Signature};
use crate::ast::Expr;
use gridbase_core::FormulaType;

impl FunctionRegistry {
    pub(super) fn register_text_functions(&mut self) {
        // UPPER / LOWER / TRIM
        self.register(FunctionDef {
            name: "upper",
            signatures: vec![Signature::new(
                vec![ParamType::AnyText],
                ReturnRule::Fixed(FormulaType::Text),
                CodeGen::Template("upper({0})"),
            )],
        });

        self.register(FunctionDef {
            name: "lower",
            signatures: vec![Signature::new(
                vec![ParamType::AnyText],
                ReturnRule::Fixed(FormulaType::Text),
                CodeGen::Template("lower({0})"),
            )],
        });

        self.register(FunctionDef {
            name: "trim",
            signatures: vec![Signature::new(
                vec![ParamType::AnyText],
                ReturnRule::Fixed(FormulaType::Text),
                CodeGen::Template("btrim({0})"),
            )],
        });

        // CONCAT: variadic, accepts anything Postgres can cast to text
        self.register(FunctionDef {
            name: "concat",
            signatures: vec![Signature {
                params: vec![ParamType::Any],
                variadic: true,
                return_rule: ReturnRule::Fixed(FormulaType::Text),
                codegen: CodeGen::Custom(|args| format!("concat({})", args.join(", "))),
                validate: None,
            }],
        });

        // LENGTH
        self.register(FunctionDef {
            name: "length",
            signatures: vec![Signature::new(
                vec![ParamType::AnyText],
                ReturnRule::Fixed(FormulaType::integer()),
                CodeGen::Template("length({0})"),
            )],
        });

        // LEFT / RIGHT
        self.register(FunctionDef {
            name: "left",
            signatures: vec![Signature::new(
                vec![ParamType::AnyText, ParamType::AnyNumber],
                ReturnRule::Fixed(FormulaType::Text),
                CodeGen::Template("left({0}, ({1})::int)"),
            )],
        });

        self.register(FunctionDef {
            name: "right",
            signatures: vec![Signature::new(
                vec![ParamType::AnyText, ParamType::AnyNumber],
                ReturnRule::Fixed(FormulaType::Text),
                CodeGen::Template("right({0}, ({1})::int)"),
            )],
        });

        // REPLACE
        self.register(FunctionDef {
            name: "replace",
            signatures: vec![Signature::new(
                vec![ParamType::AnyText, ParamType::AnyText, ParamType::AnyText],
                ReturnRule::Fixed(FormulaType::Text),
                CodeGen::Template("replace({0}, {1}, {2})"),
            )],
        });

        // TOTEXT: the only route from non-text types into text
        self.register(FunctionDef {
            name: "totext",
            signatures: vec![
                Signature::new(
                    vec![ParamType::AnyText],
                    ReturnRule::Fixed(FormulaType::Text),
                    CodeGen::Template("({0})::text"),
                ),
                Signature::new(
                    vec![ParamType::AnyNumber],
                    ReturnRule::Fixed(FormulaType::Text),
                    CodeGen::Template("({0})::text"),
                ),
                Signature::new(
                    vec![ParamType::AnyDate],
                    ReturnRule::Fixed(FormulaType::Text),
                    CodeGen::Template("to_char({0}, 'YYYY-MM-DD')"),
                ),
                Signature::new(
                    vec![ParamType::Exact(FormulaType::Boolean)],
                    ReturnRule::Fixed(FormulaType::Text),
                    CodeGen::Template("CASE WHEN {0} THEN 'true' ELSE 'false' END"),
                ),
            ],
        });

        // REGEX_REPLACE: the pattern is validated while the user edits
        self.register(FunctionDef {
            name: "regex_replace",
            signatures: vec![Signature {
                params: vec![
                    ParamType::AnyText,
                    ParamType::Exact(FormulaType::Text),
                    ParamType::Exact(FormulaType::Text),
                ],
                variadic: false,
                return_rule: ReturnRule::Fixed(FormulaType::Text),
                codegen: CodeGen::Template("regexp_replace({0}, {1}, {2}, 'g')"),
                validate: Some(validate_regex_pattern),
            }],
        });

        // TOURL
        self.register(FunctionDef {
            name: "tourl",
            signatures: vec![Signature::new(
                vec![ParamType::AnyText],
                ReturnRule::Fixed(FormulaType::Url),
                CodeGen::Template("({0})::text"),
            )],
        });
    }
}

/// Reject literal regex patterns that will not compile
fn validate_regex_pattern(args: &[Expr]) -> Result<(), String> {
    if let Some(Expr::String(pattern)) = args.get(1) {
        regex::Regex::new(pattern).map_err(|e| format!("invalid regex pattern: {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_literal_pattern_rejected() {
        let args = vec![
            Expr::FieldRef("Name".into()),
            Expr::String("(unclosed".into()),
            Expr::String("x".into()),
        ];
        assert!(validate_regex_pattern(&args).is_err());

        let args = vec![
            Expr::FieldRef("Name".into()),
            Expr::String("[0-9]+".into()),
            Expr::String("#".into()),
        ];
        assert!(validate_regex_pattern(&args).is_ok());
    }

    #[test]
    fn test_non_literal_pattern_passes_validation() {
        // A pattern coming from another field can only be checked per row
        let args = vec![
            Expr::FieldRef("Name".into()),
            Expr::FieldRef("Pattern".into()),
            Expr::String("x".into()),
        ];
        assert!(validate_regex_pattern(&args).is_ok());
    }
}
