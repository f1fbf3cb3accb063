//! Aggregate functions over lookups
//!
//! These only accept array-typed arguments, which in this grammar can only
//! come from `lookup(...)`. The compiler pushes the SQL aggregate inside the
//! lookup's subquery, so an aggregated lookup is a scalar, never an array.

use super::{CodeGen, FunctionDef, FunctionRegistry, ParamType, ReturnRule, Signature};
use gridbase_core::{FormulaType, MAX_DECIMAL_PLACES};

fn number_array() -> ParamType {
    ParamType::ArrayOf(Box::new(ParamType::AnyNumber))
}

fn date_array() -> ParamType {
    ParamType::ArrayOf(Box::new(ParamType::AnyDate))
}

impl FunctionRegistry {
    pub(super) fn register_aggregate_functions(&mut self) {
        // SUM: empty relations sum to 0
        self.register(FunctionDef {
            name: "sum",
            signatures: vec![Signature::new(
                vec![number_array()],
                ReturnRule::ElementOfArg(0),
                CodeGen::Aggregate {
                    sql_fn: "sum",
                    coalesce: Some("0"),
                },
            )],
        });

        // AVG
        self.register(FunctionDef {
            name: "avg",
            signatures: vec![Signature::new(
                vec![number_array()],
                ReturnRule::Fixed(FormulaType::number(MAX_DECIMAL_PLACES)),
                CodeGen::Aggregate {
                    sql_fn: "avg",
                    coalesce: None,
                },
            )],
        });

        // MIN / MAX: numbers or dates
        self.register(FunctionDef {
            name: "min",
            signatures: vec![
                Signature::new(
                    vec![number_array()],
                    ReturnRule::ElementOfArg(0),
                    CodeGen::Aggregate {
                        sql_fn: "min",
                        coalesce: None,
                    },
                ),
                Signature::new(
                    vec![date_array()],
                    ReturnRule::ElementOfArg(0),
                    CodeGen::Aggregate {
                        sql_fn: "min",
                        coalesce: None,
                    },
                ),
            ],
        });

        self.register(FunctionDef {
            name: "max",
            signatures: vec![
                Signature::new(
                    vec![number_array()],
                    ReturnRule::ElementOfArg(0),
                    CodeGen::Aggregate {
                        sql_fn: "max",
                        coalesce: None,
                    },
                ),
                Signature::new(
                    vec![date_array()],
                    ReturnRule::ElementOfArg(0),
                    CodeGen::Aggregate {
                        sql_fn: "max",
                        coalesce: None,
                    },
                ),
            ],
        });

        // COUNT: counts related rows regardless of element type
        self.register(FunctionDef {
            name: "count",
            signatures: vec![Signature::new(
                vec![ParamType::ArrayOf(Box::new(ParamType::Any))],
                ReturnRule::Fixed(FormulaType::integer()),
                CodeGen::Aggregate {
                    sql_fn: "count",
                    coalesce: Some("0"),
                },
            )],
        });

        // JOIN: string_agg with a separator
        self.register(FunctionDef {
            name: "join",
            signatures: vec![Signature::new(
                vec![
                    ParamType::ArrayOf(Box::new(ParamType::AnyText)),
                    ParamType::Exact(FormulaType::Text),
                ],
                ReturnRule::Fixed(FormulaType::Text),
                CodeGen::Aggregate {
                    sql_fn: "string_agg",
                    coalesce: Some("''"),
                },
            )],
        });

        // ANY / EVERY
        self.register(FunctionDef {
            name: "any",
            signatures: vec![Signature::new(
                vec![ParamType::ArrayOf(Box::new(ParamType::Exact(
                    FormulaType::Boolean,
                )))],
                ReturnRule::Fixed(FormulaType::Boolean),
                CodeGen::Aggregate {
                    sql_fn: "bool_or",
                    coalesce: Some("FALSE"),
                },
            )],
        });

        self.register(FunctionDef {
            name: "every",
            signatures: vec![Signature::new(
                vec![ParamType::ArrayOf(Box::new(ParamType::Exact(
                    FormulaType::Boolean,
                )))],
                ReturnRule::Fixed(FormulaType::Boolean),
                CodeGen::Aggregate {
                    sql_fn: "bool_and",
                    coalesce: Some("TRUE"),
                },
            )],
        });
    }
}
