//! # gridbase-formula
//!
//! Formula language for gridbase tables.
//!
//! This crate provides:
//! - Formula parsing (text → AST)
//! - Type resolution against a field catalog (AST → typed AST + dependencies)
//! - SQL compilation (typed AST → one PostgreSQL expression)
//! - Built-in function registry with overloads
//! - Dependency tracking between formula fields
//!
//! ## Example
//!
//! ```rust,ignore
//! use gridbase_formula::{compile, default_registry, parse, resolve};
//!
//! let ast = parse("sum(lookup('Items', 'Amount')) * 1.2")?;
//! let resolution = resolve(&ast, table, &catalog, default_registry())?;
//! let sql = compile(&resolution.typed, &catalog)?;
//! ```

pub mod ast;
pub mod compiler;
pub mod dependency;
pub mod error;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod typer;

pub use ast::{BinaryOperator, Expr, UnaryOperator};
pub use compiler::compile;
pub use dependency::FieldGraph;
pub use error::{FormulaError, FormulaResult};
pub use functions::{default_registry, FunctionRegistry};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::parse;
pub use typer::{resolve, Resolution, TypedExpr, TypedExprKind};
