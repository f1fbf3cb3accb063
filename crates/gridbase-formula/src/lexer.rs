//! Formula lexer
//!
//! Turns formula source text into a token stream. Whitespace and `//`
//! comments are discarded; everything else becomes a [`Token`] carrying its
//! byte offset and the verbatim source slice, which error messages quote.

use crate::error::{FormulaError, FormulaResult};

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Function name or keyword (`and`, `or`, `not`, `true`, `false`)
    Identifier(String),
    /// Numeric literal, kept as source text so precision survives
    Number(String),
    /// String literal with escapes already decoded
    StringLit(String),
    /// Bit-string literal `B'1010'`, digits only
    BitString(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Punctuation
    LeftParen,
    RightParen,
    Comma,
}

/// A token with its source position
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What kind of token this is
    pub kind: TokenKind,
    /// Byte offset into the source text
    pub position: usize,
    /// The verbatim source slice the token was scanned from
    pub raw: String,
}

impl Token {
    /// Short description used in parse errors
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Identifier(name) => format!("identifier '{name}'"),
            TokenKind::Number(_) | TokenKind::BitString(_) => format!("number '{}'", self.raw),
            TokenKind::StringLit(_) => format!("string {}", self.raw),
            _ => format!("'{}'", self.raw),
        }
    }
}

/// Tokenize formula source text
///
/// The sequence is finite and produced in one forward pass. Fails only with
/// [`FormulaError::Lex`] on an unrecognized character.
pub fn tokenize(text: &str) -> FormulaResult<Vec<Token>> {
    let mut lexer = Lexer::new(text);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

/// Single-pass scanner over the source text
struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn next_token(&mut self) -> FormulaResult<Option<Token>> {
        self.skip_whitespace_and_comments();

        if self.is_at_end() {
            return Ok(None);
        }

        let start = self.pos;
        let c = self.peek_char().unwrap();

        // Single-character tokens
        let simple = match c {
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '/' => Some(TokenKind::Slash),
            '%' => Some(TokenKind::Percent),
            '^' => Some(TokenKind::Caret),
            '(' => Some(TokenKind::LeftParen),
            ')' => Some(TokenKind::RightParen),
            ',' => Some(TokenKind::Comma),
            '=' => Some(TokenKind::Equal),
            _ => None,
        };
        if let Some(kind) = simple {
            self.advance();
            return Ok(Some(self.token(kind, start)));
        }

        // Two-character comparison operators
        if c == '<' {
            self.advance();
            let kind = if self.peek_char() == Some('=') {
                self.advance();
                TokenKind::LessEqual
            } else if self.peek_char() == Some('>') {
                self.advance();
                TokenKind::NotEqual
            } else {
                TokenKind::LessThan
            };
            return Ok(Some(self.token(kind, start)));
        }

        if c == '>' {
            self.advance();
            let kind = if self.peek_char() == Some('=') {
                self.advance();
                TokenKind::GreaterEqual
            } else {
                TokenKind::GreaterThan
            };
            return Ok(Some(self.token(kind, start)));
        }

        if c == '!' {
            self.advance();
            if self.peek_char() == Some('=') {
                self.advance();
                return Ok(Some(self.token(TokenKind::NotEqual, start)));
            }
            return Err(FormulaError::Lex {
                position: start,
                raw_char: '!',
            });
        }

        // String literals in three quoting styles
        if c == '\'' || c == '"' {
            return self.scan_quoted_string(c).map(Some);
        }
        if c == '`' {
            return self.scan_backtick_string().map(Some);
        }

        // Bit-string literal: B'1010'
        if (c == 'B' || c == 'b') && self.peek_char_at(1) == Some('\'') {
            return self.scan_bit_string().map(Some);
        }

        // Number
        if c.is_ascii_digit()
            || (c == '.' && self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit()))
        {
            return Ok(Some(self.scan_number()));
        }

        // Identifier
        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(Some(self.scan_identifier()));
        }

        Err(FormulaError::Lex {
            position: start,
            raw_char: c,
        })
    }

    /// Scan `'...'` or `"..."` with backslash escapes
    fn scan_quoted_string(&mut self, quote: char) -> FormulaResult<Token> {
        let start = self.pos;
        self.advance(); // opening quote

        let mut value = String::new();
        loop {
            match self.peek_char() {
                None => {
                    return Err(FormulaError::Lex {
                        position: start,
                        raw_char: quote,
                    })
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        // `\\`, `\'`, `\"` and anything else: the escaped
                        // character stands for itself
                        Some(c) => value.push(c),
                        None => {
                            return Err(FormulaError::Lex {
                                position: start,
                                raw_char: '\\',
                            })
                        }
                    }
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        Ok(self.token(TokenKind::StringLit(value), start))
    }

    /// Scan `` `...` `` where a doubled backtick escapes a literal backtick
    fn scan_backtick_string(&mut self) -> FormulaResult<Token> {
        let start = self.pos;
        self.advance(); // opening backtick

        let mut value = String::new();
        loop {
            match self.peek_char() {
                None => {
                    return Err(FormulaError::Lex {
                        position: start,
                        raw_char: '`',
                    })
                }
                Some('`') => {
                    if self.peek_char_at(1) == Some('`') {
                        value.push('`');
                        self.advance();
                        self.advance();
                    } else {
                        self.advance();
                        break;
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        Ok(self.token(TokenKind::StringLit(value), start))
    }

    fn scan_bit_string(&mut self) -> FormulaResult<Token> {
        let start = self.pos;
        self.advance(); // B
        self.advance(); // opening quote

        let mut bits = String::new();
        loop {
            match self.peek_char() {
                Some('\'') => {
                    self.advance();
                    break;
                }
                Some(c @ '0') | Some(c @ '1') => {
                    bits.push(c);
                    self.advance();
                }
                Some(c) => {
                    return Err(FormulaError::Lex {
                        position: self.pos,
                        raw_char: c,
                    })
                }
                None => {
                    return Err(FormulaError::Lex {
                        position: start,
                        raw_char: '\'',
                    })
                }
            }
        }

        Ok(self.token(TokenKind::BitString(bits), start))
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;

        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek_char() == Some('.') {
            self.advance();
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        if self.peek_char().map_or(false, |c| c == 'e' || c == 'E') {
            self.advance();
            if self.peek_char().map_or(false, |c| c == '+' || c == '-') {
                self.advance();
            }
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let raw = self.input[start..self.pos].to_string();
        self.token(TokenKind::Number(raw), start)
    }

    fn scan_identifier(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek_char()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let name = self.input[start..self.pos].to_string();
        self.token(TokenKind::Identifier(name), start)
    }

    // === Helper methods ===

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            position: start,
            raw: self.input[start..self.pos].to_string(),
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek_char().map_or(false, |c| c.is_whitespace()) {
                self.advance();
            }
            if self.peek_char() == Some('/') && self.peek_char_at(1) == Some('/') {
                while self.peek_char().map_or(false, |c| c != '\n') {
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }
}
