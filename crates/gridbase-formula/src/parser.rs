//! Formula parser
//!
//! A recursive descent parser with one method per precedence level,
//! lowest to highest: `or`, `and`, comparisons, `+`/`-`, `*`/`/`/`%`,
//! `^` (right-associative), unary `-`/`not`, primary. `field(...)` and
//! `lookup(...)` are grammar forms, not function calls: their arguments must
//! be string literals and they produce reference nodes.

use crate::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::lexer::{tokenize, Token, TokenKind};
use rust_decimal::Decimal;

/// Parse formula source text into an AST
///
/// # Example
/// ```rust
/// use gridbase_formula::parse;
///
/// let ast = parse("1 + 2").unwrap();
/// let ast = parse("field('Price') * 2").unwrap();
/// let ast = parse("sum(lookup('Items', 'Amount'))").unwrap();
/// ```
pub fn parse(text: &str) -> FormulaResult<Expr> {
    let tokens = tokenize(text)?;
    parse_tokens(tokens, text.len())
}

/// Parse an already-tokenized formula
///
/// `end_position` is the byte length of the source, used for errors at the
/// end of input. No partial AST is ever returned: the whole token stream
/// must form exactly one expression.
pub fn parse_tokens(tokens: Vec<Token>, end_position: usize) -> FormulaResult<Expr> {
    let mut parser = Parser::new(tokens, end_position);
    let expr = parser.parse_expression()?;

    if let Some(token) = parser.current() {
        return Err(FormulaError::Parse {
            position: token.position,
            expected: "end of formula".into(),
            found: token.describe(),
        });
    }

    Ok(expr)
}

/// Deepest expression nesting accepted before parsing fails
///
/// Keeps pathologically deep (but grammatical) input from overflowing the
/// stack here and in the later AST walks.
const MAX_NESTING_DEPTH: usize = 100;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end_position: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, end_position: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end_position,
            depth: 0,
        }
    }

    // === Token access ===

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, expected: &str) -> FormulaError {
        match self.current() {
            Some(token) => FormulaError::Parse {
                position: token.position,
                expected: expected.into(),
                found: token.describe(),
            },
            None => FormulaError::Parse {
                position: self.end_position,
                expected: expected.into(),
                found: "end of formula".into(),
            },
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> FormulaResult<()> {
        match self.current() {
            Some(token) if token.kind == kind => {
                self.consume();
                Ok(())
            }
            _ => Err(self.error_here(expected)),
        }
    }

    /// Whether the current token is the given (case-insensitive) keyword
    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.current(),
            Some(Token {
                kind: TokenKind::Identifier(name),
                ..
            }) if name.eq_ignore_ascii_case(keyword)
        )
    }

    fn expect_string_literal(&mut self, expected: &str) -> FormulaResult<String> {
        match self.current() {
            Some(Token {
                kind: TokenKind::StringLit(value),
                ..
            }) => {
                let value = value.clone();
                self.consume();
                Ok(value)
            }
            _ => Err(self.error_here(expected)),
        }
    }

    // === Expression parsing with precedence ===

    fn parse_expression(&mut self) -> FormulaResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_and()?;

        while self.at_keyword("or") {
            self.consume();
            let right = self.parse_and()?;
            left = Expr::BinaryOp {
                op: BinaryOperator::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_comparison()?;

        while self.at_keyword("and") {
            self.consume();
            let right = self.parse_comparison()?;
            left = Expr::BinaryOp {
                op: BinaryOperator::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match self.current().map(|t| &t.kind) {
                Some(TokenKind::Equal) => BinaryOperator::Equal,
                Some(TokenKind::NotEqual) => BinaryOperator::NotEqual,
                Some(TokenKind::LessThan) => BinaryOperator::LessThan,
                Some(TokenKind::LessEqual) => BinaryOperator::LessEqual,
                Some(TokenKind::GreaterThan) => BinaryOperator::GreaterThan,
                Some(TokenKind::GreaterEqual) => BinaryOperator::GreaterEqual,
                _ => break,
            };

            self.consume();
            let right = self.parse_additive()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current().map(|t| &t.kind) {
                Some(TokenKind::Plus) => BinaryOperator::Add,
                Some(TokenKind::Minus) => BinaryOperator::Subtract,
                _ => break,
            };

            self.consume();
            let right = self.parse_multiplicative()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_exponent()?;

        loop {
            let op = match self.current().map(|t| &t.kind) {
                Some(TokenKind::Star) => BinaryOperator::Multiply,
                Some(TokenKind::Slash) => BinaryOperator::Divide,
                Some(TokenKind::Percent) => BinaryOperator::Modulo,
                _ => break,
            };

            self.consume();
            let right = self.parse_exponent()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_exponent(&mut self) -> FormulaResult<Expr> {
        let left = self.parse_unary()?;

        if matches!(self.current().map(|t| &t.kind), Some(TokenKind::Caret)) {
            self.consume();
            let right = self.parse_exponent()?; // Right associative
            return Ok(Expr::BinaryOp {
                op: BinaryOperator::Power,
                left: Box::new(left),
                right: Box::new(right),
            });
        }

        Ok(left)
    }

    /// Depth guard around every recursion path: nested parentheses,
    /// chained unary operators, right-associative `^`, and function
    /// arguments all pass through here once per level
    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error_here("a less deeply nested expression"));
        }
        self.depth += 1;
        let result = self.parse_unary_inner();
        self.depth -= 1;
        result
    }

    fn parse_unary_inner(&mut self) -> FormulaResult<Expr> {
        if matches!(self.current().map(|t| &t.kind), Some(TokenKind::Minus)) {
            self.consume();
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            });
        }

        if self.at_keyword("not") {
            self.consume();
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        let token = match self.current() {
            Some(token) => token.clone(),
            None => return Err(self.error_here("an expression")),
        };

        match token.kind {
            TokenKind::Number(ref raw) => {
                let value = parse_decimal(raw).ok_or_else(|| FormulaError::Parse {
                    position: token.position,
                    expected: "a numeric literal".into(),
                    found: token.describe(),
                })?;
                self.consume();
                Ok(Expr::Number(value))
            }

            TokenKind::BitString(ref bits) => {
                let value = u64::from_str_radix(bits, 2).map_err(|_| FormulaError::Parse {
                    position: token.position,
                    expected: "a bit-string literal".into(),
                    found: token.describe(),
                })?;
                self.consume();
                Ok(Expr::Number(Decimal::from(value)))
            }

            TokenKind::StringLit(ref value) => {
                let value = value.clone();
                self.consume();
                Ok(Expr::String(value))
            }

            TokenKind::LeftParen => {
                self.consume();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(expr)
            }

            TokenKind::Identifier(ref name) => {
                let name = name.clone();
                self.consume();

                let lower = name.to_ascii_lowercase();
                match lower.as_str() {
                    "true" => return Ok(Expr::Boolean(true)),
                    "false" => return Ok(Expr::Boolean(false)),
                    _ => {}
                }

                match lower.as_str() {
                    "field" => self.parse_field_reference(),
                    "lookup" => self.parse_lookup_reference(),
                    _ => self.parse_function_call(lower),
                }
            }

            _ => Err(FormulaError::Parse {
                position: token.position,
                expected: "an expression".into(),
                found: token.describe(),
            }),
        }
    }

    /// `field('Name')`
    fn parse_field_reference(&mut self) -> FormulaResult<Expr> {
        self.expect(TokenKind::LeftParen, "'(' after 'field'")?;
        let name = self.expect_string_literal("a quoted field name")?;
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(Expr::FieldRef(name))
    }

    /// `lookup('LinkField', 'TargetField')`
    fn parse_lookup_reference(&mut self) -> FormulaResult<Expr> {
        self.expect(TokenKind::LeftParen, "'(' after 'lookup'")?;
        let through = self.expect_string_literal("a quoted link field name")?;
        self.expect(TokenKind::Comma, "','")?;
        let target = self.expect_string_literal("a quoted target field name")?;
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(Expr::LookupRef { through, target })
    }

    fn parse_function_call(&mut self, name: String) -> FormulaResult<Expr> {
        self.expect(TokenKind::LeftParen, "'(' after function name")?;

        let mut args = Vec::new();
        if !matches!(self.current().map(|t| &t.kind), Some(TokenKind::RightParen)) {
            args.push(self.parse_expression()?);

            while matches!(self.current().map(|t| &t.kind), Some(TokenKind::Comma)) {
                self.consume();
                args.push(self.parse_expression()?);
            }
        }

        self.expect(TokenKind::RightParen, "')'")?;
        Ok(Expr::Function { name, args })
    }
}

/// Parse a numeric literal, including scientific notation, losslessly
fn parse_decimal(raw: &str) -> Option<Decimal> {
    if raw.contains(['e', 'E']) {
        Decimal::from_scientific(raw).ok()
    } else if let Some(stripped) = raw.strip_prefix('.') {
        format!("0.{stripped}").parse().ok()
    } else {
        raw.parse().ok()
    }
}
