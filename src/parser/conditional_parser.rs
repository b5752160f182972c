//! Parser for `[[ ... ]]` conditional expressions.
//!
//! Operates on the main token stream between `[[` and `]]`. The lexer has
//! already arranged for `<` and `>` to be words in this region and for the
//! right-hand side of `=~` to be scanned as a single word.

use crate::ast::types::{CondBinaryOp, CondExpr, CondUnaryOp, WordNode};
use crate::parser::lexer::{Token, TokenType};
use crate::parser::types::ParseException;
use crate::parser::word_parser::{parse_word_in, WordContext};

/// Cursor over the shared token stream.
pub struct CondParser<'a> {
    tokens: &'a [Token],
    pub pos: usize,
}

impl<'a> CondParser<'a> {
    pub fn new(tokens: &'a [Token], pos: usize) -> Self {
        Self { tokens, pos }
    }

    /// Parse a full conditional expression, stopping before `]]`.
    pub fn parse(&mut self) -> Result<CondExpr, ParseException> {
        let expr = self.parse_or()?;
        Ok(expr)
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn skip_newlines(&mut self) {
        while matches!(
            self.current().map(|t| t.token_type),
            Some(TokenType::Newline) | Some(TokenType::Comment)
        ) {
            self.pos += 1;
        }
    }

    fn err(&self, message: impl Into<String>) -> ParseException {
        let (line, column) = self
            .current()
            .map(|t| (t.line, t.column))
            .unwrap_or((0, 0));
        ParseException::new(message, line, column)
    }

    fn at_end(&self) -> bool {
        matches!(
            self.current().map(|t| t.token_type),
            None | Some(TokenType::DBrackEnd) | Some(TokenType::Eof)
        )
    }

    fn parse_or(&mut self) -> Result<CondExpr, ParseException> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_newlines();
            if matches!(self.current().map(|t| t.token_type), Some(TokenType::OrOr)) {
                self.pos += 1;
                self.skip_newlines();
                let right = self.parse_and()?;
                left = CondExpr::Or(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_and(&mut self) -> Result<CondExpr, ParseException> {
        let mut left = self.parse_not()?;
        loop {
            self.skip_newlines();
            if matches!(self.current().map(|t| t.token_type), Some(TokenType::AndAnd)) {
                self.pos += 1;
                self.skip_newlines();
                let right = self.parse_not()?;
                left = CondExpr::And(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_not(&mut self) -> Result<CondExpr, ParseException> {
        self.skip_newlines();
        match self.current().map(|t| t.token_type) {
            Some(TokenType::Bang) => {
                self.pos += 1;
                let operand = self.parse_not()?;
                Ok(CondExpr::Not(Box::new(operand)))
            }
            Some(TokenType::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.skip_newlines();
                if !matches!(self.current().map(|t| t.token_type), Some(TokenType::RParen)) {
                    return Err(self.err("expected ')' in conditional expression"));
                }
                self.pos += 1;
                Ok(inner)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<CondExpr, ParseException> {
        self.skip_newlines();
        let first = match self.word_token().cloned() {
            Some(t) => t,
            None => return Err(self.err("expected expression in [[ ]]")),
        };

        // Unary operator followed by an operand word
        if let Some(op) = unary_op(&first.value) {
            if !first.quoted && self.peek_is_word() {
                self.pos += 1;
                let operand_token = self
                    .word_token()
                    .cloned()
                    .ok_or_else(|| self.err("expected operand in [[ ]]"))?;
                self.pos += 1;
                let operand = self.token_word(&operand_token)?;
                return Ok(CondExpr::Unary { op, operand });
            }
        }

        self.pos += 1;
        let left = self.token_word(&first)?;

        // Optional binary operator
        self.skip_newlines();
        let op_token = self.word_token().cloned();
        if let Some(op_token) = op_token {
            if let Some(op) = binary_op(&op_token.value) {
                if !op_token.quoted {
                    self.pos += 1;
                    self.skip_newlines();
                    let right_token = self
                        .word_token()
                        .cloned()
                        .ok_or_else(|| self.err("expected right operand in [[ ]]"))?;
                    self.pos += 1;
                    let right = self.token_word(&right_token)?;
                    return Ok(CondExpr::Binary { op, left, right });
                }
            }
        }

        Ok(CondExpr::Word(left))
    }

    /// Current token viewed as a word, if it is word-like.
    fn word_token(&self) -> Option<&Token> {
        let t = self.current()?;
        if is_word_like(t.token_type) {
            Some(t)
        } else {
            None
        }
    }

    fn peek_is_word(&self) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|t| is_word_like(t.token_type))
            .unwrap_or(false)
    }

    fn token_word(&self, token: &Token) -> Result<WordNode, ParseException> {
        parse_word_in(
            &token.value,
            WordContext {
                no_brace: true,
                ..WordContext::default()
            },
        )
    }
}

fn is_word_like(t: TokenType) -> bool {
    matches!(
        t,
        TokenType::Word
            | TokenType::AssignmentWord
            | TokenType::IoNumber
            | TokenType::If
            | TokenType::Then
            | TokenType::Else
            | TokenType::Elif
            | TokenType::Fi
            | TokenType::For
            | TokenType::While
            | TokenType::Until
            | TokenType::Do
            | TokenType::Done
            | TokenType::Case
            | TokenType::Esac
            | TokenType::In
    )
}

fn unary_op(s: &str) -> Option<CondUnaryOp> {
    Some(match s {
        "-n" => CondUnaryOp::NonEmpty,
        "-z" => CondUnaryOp::Empty,
        "-v" => CondUnaryOp::VarSet,
        "-o" => CondUnaryOp::OptionSet,
        "-t" => CondUnaryOp::Terminal,
        "-e" | "-a" => CondUnaryOp::Exists,
        "-f" => CondUnaryOp::IsFile,
        "-d" => CondUnaryOp::IsDir,
        "-b" => CondUnaryOp::IsBlock,
        "-c" => CondUnaryOp::IsChar,
        "-p" => CondUnaryOp::IsPipe,
        "-h" | "-L" => CondUnaryOp::IsSymlink,
        "-S" => CondUnaryOp::IsSocket,
        "-g" => CondUnaryOp::IsSetgid,
        "-u" => CondUnaryOp::IsSetuid,
        "-k" => CondUnaryOp::IsSticky,
        "-r" => CondUnaryOp::Readable,
        "-w" => CondUnaryOp::Writable,
        "-x" => CondUnaryOp::Executable,
        "-s" => CondUnaryOp::NonEmptyFile,
        "-G" => CondUnaryOp::OwnedByGroup,
        "-O" => CondUnaryOp::OwnedByUser,
        _ => return None,
    })
}

fn binary_op(s: &str) -> Option<CondBinaryOp> {
    Some(match s {
        "=" | "==" => CondBinaryOp::StrEq,
        "!=" => CondBinaryOp::StrNe,
        "=~" => CondBinaryOp::Match,
        "<" => CondBinaryOp::StrLt,
        ">" => CondBinaryOp::StrGt,
        "-eq" => CondBinaryOp::NumEq,
        "-ne" => CondBinaryOp::NumNe,
        "-lt" => CondBinaryOp::NumLt,
        "-le" => CondBinaryOp::NumLe,
        "-gt" => CondBinaryOp::NumGt,
        "-ge" => CondBinaryOp::NumGe,
        "-nt" => CondBinaryOp::NewerThan,
        "-ot" => CondBinaryOp::OlderThan,
        "-ef" => CondBinaryOp::SameFile,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::Lexer;

    fn parse_cond(input: &str) -> CondExpr {
        let tokens = Lexer::new(input).tokenize().unwrap();
        // Skip the [[ token
        let mut p = CondParser::new(&tokens, 1);
        let expr = p.parse().unwrap();
        assert_eq!(tokens[p.pos].token_type, TokenType::DBrackEnd);
        expr
    }

    #[test]
    fn unary_file_test() {
        let e = parse_cond("[[ -f /etc/passwd ]]");
        assert!(matches!(e, CondExpr::Unary { op: CondUnaryOp::IsFile, .. }));
    }

    #[test]
    fn binary_string_compare() {
        let e = parse_cond("[[ $x == y* ]]");
        assert!(matches!(e, CondExpr::Binary { op: CondBinaryOp::StrEq, .. }));
    }

    #[test]
    fn numeric_compare() {
        let e = parse_cond("[[ 3 -gt 2 ]]");
        assert!(matches!(e, CondExpr::Binary { op: CondBinaryOp::NumGt, .. }));
    }

    #[test]
    fn negation_and_grouping() {
        let e = parse_cond("[[ ! ( -z $x && $y == z ) ]]");
        match e {
            CondExpr::Not(inner) => assert!(matches!(*inner, CondExpr::And(_, _))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn or_of_words() {
        let e = parse_cond("[[ $a || $b ]]");
        assert!(matches!(e, CondExpr::Or(_, _)));
    }

    #[test]
    fn regex_match() {
        let e = parse_cond("[[ $x =~ ^a(b|c)$ ]]");
        assert!(matches!(e, CondExpr::Binary { op: CondBinaryOp::Match, .. }));
    }

    #[test]
    fn lexicographic() {
        let e = parse_cond("[[ a < b ]]");
        assert!(matches!(e, CondExpr::Binary { op: CondBinaryOp::StrLt, .. }));
    }
}
