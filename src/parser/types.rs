//! Shared parser types and limits.

use crate::parser::lexer::{Token, TokenType};
use thiserror::Error;

// Parser limits to prevent hangs and resource exhaustion.
pub const MAX_INPUT_SIZE: usize = 1_000_000;
pub const MAX_TOKENS: usize = 100_000;
pub const MAX_PARSE_ITERATIONS: usize = 1_000_000;

/// Check if a token type is a redirection operator.
pub fn is_redirection_token(t: TokenType) -> bool {
    matches!(
        t,
        TokenType::Less
            | TokenType::Great
            | TokenType::DLess
            | TokenType::DGreat
            | TokenType::LessAnd
            | TokenType::GreatAnd
            | TokenType::LessGreat
            | TokenType::DLessDash
            | TokenType::Clobber
            | TokenType::TLess
            | TokenType::AndGreat
            | TokenType::AndDGreat
    )
}

/// Parse error with source position.
///
/// The `incomplete` flag marks errors caused by running out of input in the
/// middle of a construct; the interactive REPL uses it to keep reading
/// instead of reporting a syntax error.
#[derive(Debug, Clone, Error)]
#[error("syntax error at line {line}: {message}")]
pub struct ParseException {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub incomplete: bool,
    pub token: Option<Token>,
}

impl ParseException {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            incomplete: false,
            token: None,
        }
    }

    pub fn incomplete(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            incomplete: true,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }
}
