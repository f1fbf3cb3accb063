//! Formula Abstract Syntax Tree types
//!
//! The parser produces name-based nodes; field ids only appear after type
//! resolution. `Display` is the canonical pretty printer: printing an
//! expression and re-parsing it yields an equal AST.

use rust_decimal::Decimal;
use std::fmt;

/// Formula expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // === Literals ===
    /// Numeric literal (decimal, so `1.50` keeps its two places)
    Number(Decimal),
    /// String literal
    String(String),
    /// Boolean literal
    Boolean(bool),

    // === References ===
    /// `field('Name')`: a field on the formula's own table
    FieldRef(String),
    /// `lookup('LinkField', 'TargetField')`: a field on related rows
    LookupRef {
        /// Name of the link field on the own table
        through: String,
        /// Name of the target field on the related table
        target: String,
    },

    // === Operators ===
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },

    // === Function call ===
    Function { name: String, args: Vec<Expr> },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Logical
    And,
    Or,
}

impl BinaryOperator {
    /// The operator's source form
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
        }
    }

    /// Whether this is an arithmetic operator
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
                | BinaryOperator::Power
        )
    }

    /// Whether this is a comparison operator
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterEqual
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

impl UnaryOperator {
    /// The operator's source form
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOperator::Negate => "-",
            UnaryOperator::Not => "not",
        }
    }
}

/// Quote a string for formula source: single quotes, backslash escaping
fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "'")?;
    for c in s.chars() {
        match c {
            '\\' => write!(f, "\\\\")?,
            '\'' => write!(f, "\\'")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "'")
}

impl Expr {
    /// Whether the printer must parenthesize this node when it appears as an
    /// operand of another operator
    fn is_compound(&self) -> bool {
        matches!(self, Expr::BinaryOp { .. } | Expr::UnaryOp { .. })
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_compound() {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::String(s) => write_quoted(f, s),
            Expr::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Expr::FieldRef(name) => {
                write!(f, "field(")?;
                write_quoted(f, name)?;
                write!(f, ")")
            }
            Expr::LookupRef { through, target } => {
                write!(f, "lookup(")?;
                write_quoted(f, through)?;
                write!(f, ", ")?;
                write_quoted(f, target)?;
                write!(f, ")")
            }
            Expr::BinaryOp { op, left, right } => {
                left.fmt_operand(f)?;
                write!(f, " {} ", op.symbol())?;
                right.fmt_operand(f)
            }
            Expr::UnaryOp { op, operand } => {
                match op {
                    UnaryOperator::Negate => write!(f, "-")?,
                    UnaryOperator::Not => write!(f, "not ")?,
                }
                operand.fmt_operand(f)
            }
            Expr::Function { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_print_literals() {
        assert_eq!(Expr::Number(Decimal::new(150, 2)).to_string(), "1.50");
        assert_eq!(Expr::String("a'b".into()).to_string(), r"'a\'b'");
        assert_eq!(Expr::Boolean(true).to_string(), "true");
    }

    #[test]
    fn test_print_references() {
        assert_eq!(Expr::FieldRef("Price".into()).to_string(), "field('Price')");
        assert_eq!(
            Expr::LookupRef {
                through: "Link".into(),
                target: "Amount".into()
            }
            .to_string(),
            "lookup('Link', 'Amount')"
        );
    }

    #[test]
    fn test_print_parenthesizes_compound_operands() {
        let inner = Expr::BinaryOp {
            op: BinaryOperator::Add,
            left: Box::new(Expr::Number(Decimal::ONE)),
            right: Box::new(Expr::Number(Decimal::TWO)),
        };
        let outer = Expr::BinaryOp {
            op: BinaryOperator::Multiply,
            left: Box::new(inner),
            right: Box::new(Expr::Number(Decimal::TEN)),
        };
        assert_eq!(outer.to_string(), "(1 + 2) * 10");
    }

    #[test]
    fn test_print_unary() {
        let e = Expr::UnaryOp {
            op: UnaryOperator::Not,
            operand: Box::new(Expr::Boolean(false)),
        };
        assert_eq!(e.to_string(), "not false");

        let e = Expr::UnaryOp {
            op: UnaryOperator::Negate,
            operand: Box::new(Expr::FieldRef("X".into())),
        };
        assert_eq!(e.to_string(), "-field('X')");
    }
}
