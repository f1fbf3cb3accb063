//! Logical functions

use super::{CodeGen, FunctionDef, FunctionRegistry, ParamType, ReturnRule, Signature};
use gridbase_core::FormulaType;

impl FunctionRegistry {
    pub(super) fn register_logical_functions(&mut self) {
        // IF: both branches must share a common type
        self.register(FunctionDef {
            name: "if",
            signatures: vec![Signature::new(
                vec![
                    ParamType::Exact(FormulaType::Boolean),
                    ParamType::Any,
                    ParamType::Any,
                ],
                ReturnRule::CommonType(1, 2),
                CodeGen::Template("CASE WHEN {0} THEN {1} ELSE {2} END"),
            )],
        });

        // AND / OR: function forms of the infix operators
        self.register(FunctionDef {
            name: "and",
            signatures: vec![Signature::new(
                vec![
                    ParamType::Exact(FormulaType::Boolean),
                    ParamType::Exact(FormulaType::Boolean),
                ],
                ReturnRule::Fixed(FormulaType::Boolean),
                CodeGen::Template("({0} AND {1})"),
            )],
        });

        self.register(FunctionDef {
            name: "or",
            signatures: vec![Signature::new(
                vec![
                    ParamType::Exact(FormulaType::Boolean),
                    ParamType::Exact(FormulaType::Boolean),
                ],
                ReturnRule::Fixed(FormulaType::Boolean),
                CodeGen::Template("({0} OR {1})"),
            )],
        });

        // No `not` entry: the parser consumes `not` as the unary operator
        // before call syntax applies, so `not(x)` is always a UnaryOp

        // ISBLANK
        self.register(FunctionDef {
            name: "isblank",
            signatures: vec![Signature::new(
                vec![ParamType::Any],
                ReturnRule::Fixed(FormulaType::Boolean),
                CodeGen::Template("(({0}) IS NULL)"),
            )],
        });

        // ISERROR: detects the per-row numeric error value
        self.register(FunctionDef {
            name: "iserror",
            signatures: vec![Signature::new(
                vec![ParamType::AnyNumber],
                ReturnRule::Fixed(FormulaType::Boolean),
                CodeGen::Template("(({0}) = 'NaN'::numeric)"),
            )],
        });
    }
}
