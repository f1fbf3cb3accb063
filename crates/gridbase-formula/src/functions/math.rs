//! Math functions

use super::{CodeGen, FunctionDef, FunctionRegistry, ParamType, ReturnRule, Signature};
use gridbase_core::{FormulaType, MAX_DECIMAL_PLACES};

impl FunctionRegistry {
    pub(super) fn register_math_functions(&mut self) {
        // ABS
        self.register(FunctionDef {
            name: "abs",
            signatures: vec![Signature::new(
                vec![ParamType::AnyNumber],
                ReturnRule::SameAsArg(0),
                CodeGen::Template("abs({0})"),
            )],
        });

        // ROUND
        self.register(FunctionDef {
            name: "round",
            signatures: vec![Signature::new(
                vec![ParamType::AnyNumber, ParamType::AnyNumber],
                ReturnRule::SameAsArg(0),
                CodeGen::Template("round({0}, ({1})::int)"),
            )],
        });

        // CEIL / FLOOR
        self.register(FunctionDef {
            name: "ceil",
            signatures: vec![Signature::new(
                vec![ParamType::AnyNumber],
                ReturnRule::Fixed(FormulaType::integer()),
                CodeGen::Template("ceil({0})"),
            )],
        });

        self.register(FunctionDef {
            name: "floor",
            signatures: vec![Signature::new(
                vec![ParamType::AnyNumber],
                ReturnRule::Fixed(FormulaType::integer()),
                CodeGen::Template("floor({0})"),
            )],
        });

        // SQRT: negative input yields the per-row error value
        self.register(FunctionDef {
            name: "sqrt",
            signatures: vec![Signature::new(
                vec![ParamType::AnyNumber],
                ReturnRule::Fixed(FormulaType::number(MAX_DECIMAL_PLACES)),
                CodeGen::Template(
                    "CASE WHEN ({0}) < 0 THEN 'NaN'::numeric ELSE sqrt({0}) END",
                ),
            )],
        });

        // MOD: same zero-divisor guard as the division operator
        self.register(FunctionDef {
            name: "mod",
            signatures: vec![Signature::new(
                vec![ParamType::AnyNumber, ParamType::AnyNumber],
                ReturnRule::WidestNumber,
                CodeGen::Template(
                    "CASE WHEN ({1}) = 0 THEN 'NaN'::numeric ELSE mod({0}, {1}) END",
                ),
            )],
        });

        // TONUMBER: the cast is format-guarded so a row holding
        // unconvertible text yields the error value instead of aborting
        // the query
        self.register(FunctionDef {
            name: "tonumber",
            signatures: vec![Signature::new(
                vec![ParamType::AnyText],
                ReturnRule::Fixed(FormulaType::number(MAX_DECIMAL_PLACES)),
                CodeGen::Template(
                    r"CASE WHEN ({0}) ~ '^\s*-?[0-9]+(\.[0-9]+)?\s*$' THEN ({0})::numeric ELSE 'NaN'::numeric END",
                ),
            )],
        });

        // GREATEST / LEAST
        self.register(FunctionDef {
            name: "greatest",
            signatures: vec![Signature {
                params: vec![ParamType::AnyNumber, ParamType::AnyNumber],
                variadic: true,
                return_rule: ReturnRule::WidestNumber,
                codegen: CodeGen::Custom(|args| format!("greatest({})", args.join(", "))),
                validate: None,
            }],
        });

        self.register(FunctionDef {
            name: "least",
            signatures: vec![Signature {
                params: vec![ParamType::AnyNumber, ParamType::AnyNumber],
                variadic: true,
                return_rule: ReturnRule::WidestNumber,
                codegen: CodeGen::Custom(|args| format!("least({})", args.join(", "))),
                validate: None,
            }],
        });
    }
}
