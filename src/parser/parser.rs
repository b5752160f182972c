//! Recursive-descent parser over the token stream.
//!
//! Grammar, top down: a script is a sequence of statements; a statement is
//! an and-or list of pipelines; a pipeline is `!`-prefixed commands joined
//! by `|`; a command is simple, compound, or a function definition, each
//! with a trailing redirection list. Here-document bodies arrive as
//! `HeredocContent` tokens after the newline and are patched into the tree
//! in registration order once the script has been parsed.

use crate::ast::types::*;
use crate::parser::conditional_parser::CondParser;
use crate::parser::lexer::{is_valid_name, Lexer, Token, TokenType};
use crate::parser::types::{
    is_redirection_token, ParseException, MAX_INPUT_SIZE, MAX_PARSE_ITERATIONS, MAX_TOKENS,
};
use crate::parser::word_parser::{parse_heredoc_body, parse_word_in, WordContext};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    input_chars: Vec<char>,
    /// Here-document bodies in lexer (= syntactic) order.
    heredoc_bodies: Vec<Token>,
    parse_iterations: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            tokens: Vec::new(),
            pos: 0,
            input_chars: Vec::new(),
            heredoc_bodies: Vec::new(),
            parse_iterations: 0,
        }
    }

    /// Parse a complete script.
    pub fn parse(&mut self, input: &str) -> Result<ScriptNode, ParseException> {
        if input.len() > MAX_INPUT_SIZE {
            return Err(ParseException::new(
                format!(
                    "input too large: {} bytes exceeds limit of {}",
                    input.len(),
                    MAX_INPUT_SIZE
                ),
                1,
                1,
            ));
        }

        self.input_chars = input.chars().collect();
        self.tokens = Lexer::new(input).tokenize().map_err(|e| {
            if e.incomplete {
                ParseException::incomplete(e.message, e.line, e.column)
            } else {
                ParseException::new(e.message, e.line, e.column)
            }
        })?;

        if self.tokens.len() > MAX_TOKENS {
            return Err(ParseException::new(
                format!("too many tokens: {} exceeds limit of {}", self.tokens.len(), MAX_TOKENS),
                1,
                1,
            ));
        }

        self.pos = 0;
        self.heredoc_bodies.clear();
        self.parse_iterations = 0;

        let mut script = self.parse_script()?;
        let bodies = std::mem::take(&mut self.heredoc_bodies);
        patch_heredocs(&mut script, &bodies)?;
        Ok(script)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn bump_iterations(&mut self) -> Result<(), ParseException> {
        self.parse_iterations += 1;
        if self.parse_iterations > MAX_PARSE_ITERATIONS {
            let t = self.current().clone();
            return Err(ParseException::new(
                "maximum parse iterations exceeded",
                t.line,
                t.column,
            ));
        }
        Ok(())
    }

    fn current(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    fn current_type(&self) -> TokenType {
        self.current().token_type
    }

    fn peek_type(&self, offset: usize) -> TokenType {
        let idx = (self.pos + offset).min(self.tokens.len().saturating_sub(1));
        self.tokens[idx].token_type
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, types: &[TokenType]) -> bool {
        types.contains(&self.current_type())
    }

    fn error(&self, message: impl Into<String>) -> ParseException {
        let t = self.current();
        if t.token_type == TokenType::Eof {
            ParseException::incomplete(message, t.line, t.column).with_token(t.clone())
        } else {
            ParseException::new(message, t.line, t.column).with_token(t.clone())
        }
    }

    fn unexpected(&self) -> ParseException {
        let t = self.current();
        self.error(format!("syntax error near unexpected token `{}'", t.value))
    }

    fn expect(&mut self, token_type: TokenType, what: &str) -> Result<Token, ParseException> {
        if self.check(&[token_type]) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected {}, got `{}'",
                what,
                self.current().value
            )))
        }
    }

    /// Skip newlines and comments, collecting heredoc bodies on the way.
    fn skip_newlines(&mut self) {
        loop {
            match self.current_type() {
                TokenType::Newline | TokenType::Comment => {
                    self.advance();
                }
                TokenType::HeredocContent => {
                    let t = self.advance();
                    self.heredoc_bodies.push(t);
                }
                _ => break,
            }
        }
    }

    /// Skip `;`, newlines, and comments between statements.
    fn skip_separators(&mut self) {
        loop {
            match self.current_type() {
                TokenType::Newline | TokenType::Comment | TokenType::Semicolon => {
                    self.advance();
                }
                TokenType::HeredocContent => {
                    let t = self.advance();
                    self.heredoc_bodies.push(t);
                }
                _ => break,
            }
        }
    }

    fn is_word_token(&self, t: TokenType) -> bool {
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

    fn is_command_start(&self) -> bool {
        let t = self.current_type();
        matches!(
            t,
            TokenType::Word
                | TokenType::AssignmentWord
                | TokenType::IoNumber
                | TokenType::If
                | TokenType::For
                | TokenType::While
                | TokenType::Until
                | TokenType::Case
                | TokenType::LParen
                | TokenType::LBrace
                | TokenType::ArithCommand
                | TokenType::DBrackStart
                | TokenType::Bang
        ) || is_redirection_token(t)
    }

    // =========================================================================
    // SCRIPT
    // =========================================================================

    fn parse_script(&mut self) -> Result<ScriptNode, ParseException> {
        let mut statements = Vec::new();
        // A leading `;` is a syntax error; only newlines may precede the
        // first command.
        self.skip_newlines();

        while !self.check(&[TokenType::Eof]) {
            self.bump_iterations()?;

            if !self.is_command_start() {
                return Err(self.unexpected());
            }

            if let Some(stmt) = self.parse_statement()? {
                statements.push(stmt);
            }
            self.skip_separators();
        }

        Ok(AST::script(statements))
    }

    /// Parse statements until one of `terminators` is the current token.
    fn parse_statement_list(
        &mut self,
        terminators: &[TokenType],
        what: &str,
    ) -> Result<Vec<StatementNode>, ParseException> {
        let mut statements = Vec::new();
        loop {
            self.bump_iterations()?;
            self.skip_separators();
            if self.check(terminators) {
                return Ok(statements);
            }
            if self.check(&[TokenType::Eof]) {
                return Err(self.error(format!("expected {}", what)));
            }
            if self.check(&[TokenType::DSemi, TokenType::SemiAnd, TokenType::SemiSemiAnd]) {
                // Case terminators end a body without being consumed here
                return Ok(statements);
            }
            if !self.is_command_start() {
                return Err(self.unexpected());
            }
            match self.parse_statement()? {
                Some(stmt) => statements.push(stmt),
                None => return Ok(statements),
            }
        }
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    pub fn parse_statement(&mut self) -> Result<Option<StatementNode>, ParseException> {
        self.skip_newlines();
        if !self.is_command_start() {
            return Ok(None);
        }

        let start_token = self.current().clone();
        let start_offset = start_token.start;

        let mut pipelines = Vec::new();
        let mut operators = Vec::new();
        let mut background = false;

        pipelines.push(self.parse_pipeline()?);

        while self.check(&[TokenType::AndAnd, TokenType::OrOr]) {
            let op = self.advance();
            operators.push(if op.token_type == TokenType::AndAnd {
                AndOrOperator::AndIf
            } else {
                AndOrOperator::OrIf
            });
            self.skip_newlines();
            pipelines.push(self.parse_pipeline()?);
        }

        if self.check(&[TokenType::Amp]) {
            self.advance();
            background = true;
        }

        let end_offset = if self.pos > 0 {
            self.tokens[self.pos - 1].end
        } else {
            start_offset
        };
        let source_text: String = self
            .input_chars
            .get(start_offset..end_offset)
            .map(|s| s.iter().collect())
            .unwrap_or_default();

        Ok(Some(StatementNode {
            pipelines,
            operators,
            background,
            source_text: Some(source_text),
            line: start_token.line,
        }))
    }

    // =========================================================================
    // PIPELINES
    // =========================================================================

    fn parse_pipeline(&mut self) -> Result<PipelineNode, ParseException> {
        let mut negation_count = 0;
        while self.check(&[TokenType::Bang]) {
            self.advance();
            negation_count += 1;
        }
        let negated = negation_count % 2 == 1;

        let mut commands = vec![self.parse_command()?];
        while self.check(&[TokenType::Pipe]) {
            self.advance();
            self.skip_newlines();
            commands.push(self.parse_command()?);
        }

        Ok(AST::pipeline(commands, negated))
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    fn parse_command(&mut self) -> Result<CommandNode, ParseException> {
        match self.current_type() {
            TokenType::If => self.parse_if(),
            TokenType::While => self.parse_while(),
            TokenType::Until => self.parse_until(),
            TokenType::For => self.parse_for(),
            TokenType::Case => self.parse_case(),
            TokenType::LParen => self.parse_subshell(),
            TokenType::LBrace => self.parse_group(),
            TokenType::ArithCommand => self.parse_arith_command(),
            TokenType::DBrackStart => self.parse_conditional_command(),
            _ => {
                // Function definition: name () compound
                if self.current_type() == TokenType::Word
                    && is_valid_name(&self.current().value)
                    && self.peek_type(1) == TokenType::LParen
                    && self.peek_type(2) == TokenType::RParen
                {
                    return self.parse_function_def();
                }
                self.parse_simple_command()
            }
        }
    }

    /// Redirections that follow a compound command.
    fn parse_redirect_list(&mut self) -> Result<Vec<RedirectionNode>, ParseException> {
        let mut redirections = Vec::new();
        loop {
            if self.check(&[TokenType::IoNumber]) && is_redirection_token(self.peek_type(1)) {
                redirections.push(self.parse_redirection()?);
            } else if is_redirection_token(self.current_type()) {
                redirections.push(self.parse_redirection()?);
            } else {
                return Ok(redirections);
            }
        }
    }

    fn parse_redirection(&mut self) -> Result<RedirectionNode, ParseException> {
        let fd = if self.check(&[TokenType::IoNumber]) {
            let t = self.advance();
            Some(t.value.parse::<i32>().map_err(|_| {
                ParseException::new(format!("bad file descriptor: {}", t.value), t.line, t.column)
            })?)
        } else {
            None
        };

        let op_token = self.advance();
        let operator = match op_token.token_type {
            TokenType::Less => RedirectionOperator::Less,
            TokenType::Great => RedirectionOperator::Great,
            TokenType::DGreat => RedirectionOperator::DGreat,
            TokenType::LessAnd => RedirectionOperator::LessAnd,
            TokenType::GreatAnd => RedirectionOperator::GreatAnd,
            TokenType::LessGreat => RedirectionOperator::LessGreat,
            TokenType::Clobber => RedirectionOperator::Clobber,
            TokenType::AndGreat => RedirectionOperator::AndGreat,
            TokenType::AndDGreat => RedirectionOperator::AndDGreat,
            TokenType::TLess => RedirectionOperator::TLess,
            TokenType::DLess => RedirectionOperator::DLess,
            TokenType::DLessDash => RedirectionOperator::DLessDash,
            _ => {
                return Err(ParseException::new(
                    format!("invalid redirection operator `{}'", op_token.value),
                    op_token.line,
                    op_token.column,
                ))
            }
        };

        if !self.is_word_token(self.current_type()) {
            return Err(self.error(format!("expected word after `{}'", op_token.value)));
        }
        let target_token = self.advance();

        match operator {
            RedirectionOperator::DLess | RedirectionOperator::DLessDash => {
                let delimiter = unquote_delimiter(&target_token.value);
                if delimiter.is_empty() {
                    return Err(ParseException::new(
                        "invalid here-document delimiter",
                        target_token.line,
                        target_token.column,
                    ));
                }
                Ok(RedirectionNode {
                    fd,
                    operator,
                    target: RedirectionTarget::HereDoc(HereDocNode {
                        delimiter,
                        content: WordNode::default(),
                        strip_tabs: operator == RedirectionOperator::DLessDash,
                        quoted: target_token.quoted,
                    }),
                })
            }
            _ => {
                let word = parse_word_in(&target_token.value, WordContext::default())?;
                Ok(RedirectionNode {
                    fd,
                    operator,
                    target: RedirectionTarget::Word(word),
                })
            }
        }
    }

    fn parse_simple_command(&mut self) -> Result<CommandNode, ParseException> {
        let line = self.current().line;
        let mut assignments = Vec::new();
        let mut name: Option<WordNode> = None;
        let mut args = Vec::new();
        let mut redirections = Vec::new();

        loop {
            self.bump_iterations()?;
            let t = self.current_type();

            if t == TokenType::IoNumber && is_redirection_token(self.peek_type(1)) {
                redirections.push(self.parse_redirection()?);
                continue;
            }
            if is_redirection_token(t) {
                redirections.push(self.parse_redirection()?);
                continue;
            }
            if t == TokenType::AssignmentWord && name.is_none() {
                assignments.push(self.parse_assignment()?);
                continue;
            }
            if self.is_word_token(t) {
                let token = self.advance();
                let word = parse_word_in(&token.value, WordContext::default())?;
                if name.is_none() {
                    name = Some(word);
                } else {
                    args.push(word);
                }
                continue;
            }
            break;
        }

        if assignments.is_empty() && name.is_none() && redirections.is_empty() {
            Err(self.error("expected command"))
        } else {
            Ok(CommandNode::Simple(SimpleCommandNode {
                assignments,
                name,
                args,
                redirections,
                line,
            }))
        }
    }

    /// Parse an ASSIGNMENT_WORD token, plus a following `(...)` array
    /// literal when the value is empty and the paren is adjacent.
    fn parse_assignment(&mut self) -> Result<AssignmentNode, ParseException> {
        let token = self.advance();
        let chars: Vec<char> = token.value.chars().collect();

        // Split name[index]?(+)?=value
        let mut i = 0;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        let name: String = chars[..i].iter().collect();

        let mut index = None;
        if chars.get(i) == Some(&'[') {
            let mut depth = 0;
            let start = i + 1;
            while i < chars.len() {
                match chars[i] {
                    '[' => depth += 1,
                    ']' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            index = Some(chars[start..i].iter().collect::<String>());
            i += 1; // past ]
        }

        let append = chars.get(i) == Some(&'+');
        if append {
            i += 1;
        }
        // past =
        i += 1;
        let value_text: String = chars[i..].iter().collect();

        // Array literal: NAME=( ... ) with the paren adjacent to the =
        if value_text.is_empty()
            && self.check(&[TokenType::LParen])
            && self.current().start == token.end
        {
            self.advance(); // (
            let mut elements = Vec::new();
            loop {
                self.skip_newlines();
                if self.check(&[TokenType::RParen]) {
                    self.advance();
                    break;
                }
                if self.check(&[TokenType::Eof]) {
                    return Err(self.error("expected `)' to close array literal"));
                }
                if !self.is_word_token(self.current_type()) {
                    return Err(self.unexpected());
                }
                let t = self.advance();
                elements.push(parse_word_in(&t.value, WordContext::default())?);
            }
            return Ok(AssignmentNode {
                name,
                index,
                value: None,
                append,
                array: Some(elements),
            });
        }

        // Assignment values do not undergo brace expansion
        let value = if value_text.is_empty() {
            None
        } else {
            Some(parse_word_in(
                &value_text,
                WordContext {
                    assignment: true,
                    no_brace: true,
                    ..WordContext::default()
                },
            )?)
        };

        Ok(AssignmentNode {
            name,
            index,
            value,
            append,
            array: None,
        })
    }

    // =========================================================================
    // COMPOUND COMMANDS
    // =========================================================================

    fn parse_if(&mut self) -> Result<CommandNode, ParseException> {
        self.advance(); // if
        let mut clauses = Vec::new();

        let condition = self.parse_statement_list(&[TokenType::Then], "'then'")?;
        self.expect(TokenType::Then, "'then'")?;
        let body = self.parse_statement_list(
            &[TokenType::Elif, TokenType::Else, TokenType::Fi],
            "'fi'",
        )?;
        clauses.push(IfClause { condition, body });

        let mut else_body = None;
        loop {
            match self.current_type() {
                TokenType::Elif => {
                    self.advance();
                    let condition = self.parse_statement_list(&[TokenType::Then], "'then'")?;
                    self.expect(TokenType::Then, "'then'")?;
                    let body = self.parse_statement_list(
                        &[TokenType::Elif, TokenType::Else, TokenType::Fi],
                        "'fi'",
                    )?;
                    clauses.push(IfClause { condition, body });
                }
                TokenType::Else => {
                    self.advance();
                    else_body =
                        Some(self.parse_statement_list(&[TokenType::Fi], "'fi'")?);
                }
                _ => break,
            }
        }
        self.expect(TokenType::Fi, "'fi'")?;

        let redirections = self.parse_redirect_list()?;
        Ok(CommandNode::Compound(CompoundCommandNode::If(IfNode {
            clauses,
            else_body,
            redirections,
        })))
    }

    fn parse_while(&mut self) -> Result<CommandNode, ParseException> {
        self.advance(); // while
        let condition = self.parse_statement_list(&[TokenType::Do], "'do'")?;
        self.expect(TokenType::Do, "'do'")?;
        let body = self.parse_statement_list(&[TokenType::Done], "'done'")?;
        self.expect(TokenType::Done, "'done'")?;
        let redirections = self.parse_redirect_list()?;
        Ok(CommandNode::Compound(CompoundCommandNode::While(WhileNode {
            condition,
            body,
            redirections,
        })))
    }

    fn parse_until(&mut self) -> Result<CommandNode, ParseException> {
        self.advance(); // until
        let condition = self.parse_statement_list(&[TokenType::Do], "'do'")?;
        self.expect(TokenType::Do, "'do'")?;
        let body = self.parse_statement_list(&[TokenType::Done], "'done'")?;
        self.expect(TokenType::Done, "'done'")?;
        let redirections = self.parse_redirect_list()?;
        Ok(CommandNode::Compound(CompoundCommandNode::Until(UntilNode {
            condition,
            body,
            redirections,
        })))
    }

    fn parse_for(&mut self) -> Result<CommandNode, ParseException> {
        self.advance(); // for

        // Arithmetic for: for ((init; cond; step))
        if self.check(&[TokenType::ArithCommand]) {
            let region = self.advance();
            let (init, condition, step) = split_arith_for_header(&region)?;
            self.skip_separators();
            self.expect(TokenType::Do, "'do'")?;
            let body = self.parse_statement_list(&[TokenType::Done], "'done'")?;
            self.expect(TokenType::Done, "'done'")?;
            let redirections = self.parse_redirect_list()?;
            return Ok(CommandNode::Compound(CompoundCommandNode::ArithFor(
                ArithForNode {
                    init,
                    condition,
                    step,
                    body,
                    redirections,
                },
            )));
        }

        let name_token = self.advance();
        if !is_valid_name(&name_token.value) {
            return Err(ParseException::new(
                format!("`{}' is not a valid identifier", name_token.value),
                name_token.line,
                name_token.column,
            ));
        }
        let variable = name_token.value;

        self.skip_newlines();
        let mut words = None;
        if self.check(&[TokenType::In]) {
            self.advance();
            let mut list = Vec::new();
            while self.is_word_token(self.current_type()) {
                let t = self.advance();
                list.push(parse_word_in(&t.value, WordContext::default())?);
            }
            words = Some(list);
        }

        self.skip_separators();
        self.expect(TokenType::Do, "'do'")?;
        let body = self.parse_statement_list(&[TokenType::Done], "'done'")?;
        self.expect(TokenType::Done, "'done'")?;
        let redirections = self.parse_redirect_list()?;

        Ok(CommandNode::Compound(CompoundCommandNode::For(ForNode {
            variable,
            words,
            body,
            redirections,
        })))
    }

    fn parse_case(&mut self) -> Result<CommandNode, ParseException> {
        self.advance(); // case

        if !self.is_word_token(self.current_type()) {
            return Err(self.error("expected word after `case'"));
        }
        let word_token = self.advance();
        let word = parse_word_in(&word_token.value, WordContext::default())?;

        self.skip_newlines();
        self.expect(TokenType::In, "'in'")?;
        self.skip_newlines();

        let mut items = Vec::new();
        loop {
            self.bump_iterations()?;
            self.skip_newlines();
            if self.check(&[TokenType::Esac]) {
                self.advance();
                break;
            }
            if self.check(&[TokenType::Eof]) {
                return Err(self.error("expected 'esac'"));
            }

            // Optional ( before the pattern list
            if self.check(&[TokenType::LParen]) {
                self.advance();
            }

            let mut patterns = Vec::new();
            loop {
                if !self.is_word_token(self.current_type()) {
                    return Err(self.error("expected pattern in case item"));
                }
                let t = self.advance();
                patterns.push(parse_word_in(
                    &t.value,
                    WordContext {
                        no_brace: true,
                        ..WordContext::default()
                    },
                )?);
                if self.check(&[TokenType::Pipe]) {
                    self.advance();
                    continue;
                }
                break;
            }
            self.expect(TokenType::RParen, "')' after case pattern")?;

            let body = self.parse_statement_list(
                &[
                    TokenType::DSemi,
                    TokenType::SemiAnd,
                    TokenType::SemiSemiAnd,
                    TokenType::Esac,
                ],
                "';;' or 'esac'",
            )?;

            let terminator = match self.current_type() {
                TokenType::DSemi => {
                    self.advance();
                    CaseTerminator::Break
                }
                TokenType::SemiAnd => {
                    self.advance();
                    CaseTerminator::FallThrough
                }
                TokenType::SemiSemiAnd => {
                    self.advance();
                    CaseTerminator::Continue
                }
                TokenType::Esac => CaseTerminator::Break,
                _ => return Err(self.unexpected()),
            };

            items.push(CaseItemNode {
                patterns,
                body,
                terminator,
            });
        }

        let redirections = self.parse_redirect_list()?;
        Ok(CommandNode::Compound(CompoundCommandNode::Case(CaseNode {
            word,
            items,
            redirections,
        })))
    }

    fn parse_subshell(&mut self) -> Result<CommandNode, ParseException> {
        self.advance(); // (
        let body = self.parse_statement_list(&[TokenType::RParen], "')'")?;
        self.expect(TokenType::RParen, "')'")?;
        let redirections = self.parse_redirect_list()?;
        Ok(CommandNode::Compound(CompoundCommandNode::Subshell(
            SubshellNode { body, redirections },
        )))
    }

    fn parse_group(&mut self) -> Result<CommandNode, ParseException> {
        self.advance(); // {
        let body = self.parse_statement_list(&[TokenType::RBrace], "'}'")?;
        self.expect(TokenType::RBrace, "'}'")?;
        let redirections = self.parse_redirect_list()?;
        Ok(CommandNode::Compound(CompoundCommandNode::Group(GroupNode {
            body,
            redirections,
        })))
    }

    fn parse_arith_command(&mut self) -> Result<CommandNode, ParseException> {
        let region = self.advance();
        let expression =
            crate::parser::arithmetic_parser::parse_arithmetic(&region.value).map_err(|e| {
                ParseException::new(e.message, region.line, region.column)
            })?;
        let redirections = self.parse_redirect_list()?;
        Ok(CommandNode::Compound(CompoundCommandNode::Arithmetic(
            ArithmeticCommandNode {
                expression,
                redirections,
            },
        )))
    }

    fn parse_conditional_command(&mut self) -> Result<CommandNode, ParseException> {
        self.advance(); // [[
        let mut cond = CondParser::new(&self.tokens, self.pos);
        let expression = cond.parse()?;
        self.pos = cond.pos;
        self.expect(TokenType::DBrackEnd, "']]'")?;
        let redirections = self.parse_redirect_list()?;
        Ok(CommandNode::Compound(CompoundCommandNode::Conditional(
            ConditionalCommandNode {
                expression,
                redirections,
            },
        )))
    }

    fn parse_function_def(&mut self) -> Result<CommandNode, ParseException> {
        let name_token = self.advance();
        self.advance(); // (
        self.advance(); // )
        self.skip_newlines();

        if !self.check(&[
            TokenType::LBrace,
            TokenType::LParen,
            TokenType::If,
            TokenType::While,
            TokenType::Until,
            TokenType::For,
            TokenType::Case,
            TokenType::ArithCommand,
            TokenType::DBrackStart,
        ]) {
            return Err(self.error("expected compound command for function body"));
        }

        let body_command = self.parse_command()?;
        let body = match body_command {
            CommandNode::Compound(compound) => compound,
            _ => return Err(self.error("expected compound command for function body")),
        };

        Ok(CommandNode::FunctionDef(FunctionDefNode {
            name: name_token.value,
            body: Box::new(body),
            redirections: Vec::new(),
        }))
    }
}

/// Split a `for ((init; cond; step))` header into its three expressions.
fn split_arith_for_header(
    region: &Token,
) -> Result<
    (
        Option<ArithmeticExpressionNode>,
        Option<ArithmeticExpressionNode>,
        Option<ArithmeticExpressionNode>,
    ),
    ParseException,
> {
    let parts: Vec<&str> = region.value.split(';').collect();
    if parts.len() != 3 {
        return Err(ParseException::new(
            "expected ((init; condition; step))",
            region.line,
            region.column,
        ));
    }
    let parse_part = |text: &str| -> Result<Option<ArithmeticExpressionNode>, ParseException> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(crate::parser::arithmetic_parser::parse_arithmetic(
                trimmed,
            )?))
        }
    };
    Ok((parse_part(parts[0])?, parse_part(parts[1])?, parse_part(parts[2])?))
}

/// Strip quoting from a here-document delimiter word.
fn unquote_delimiter(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    out.push(chars[i]);
                    i += 1;
                }
                i += 1;
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        i += 1;
                    }
                    out.push(chars[i]);
                    i += 1;
                }
                i += 1;
            }
            '\\' => {
                i += 1;
                if i < chars.len() {
                    out.push(chars[i]);
                    i += 1;
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

// =============================================================================
// HEREDOC PATCHING
// =============================================================================

/// Walk the script in source order and fill heredoc bodies from the
/// collected `HeredocContent` tokens. Registration order in the lexer
/// matches the pre-order position of `<<` operators in the tree.
fn patch_heredocs(script: &mut ScriptNode, bodies: &[Token]) -> Result<(), ParseException> {
    let mut cursor = 0usize;
    for stmt in &mut script.statements {
        patch_statement(stmt, bodies, &mut cursor)?;
    }
    Ok(())
}

fn patch_statement(
    stmt: &mut StatementNode,
    bodies: &[Token],
    cursor: &mut usize,
) -> Result<(), ParseException> {
    for pipeline in &mut stmt.pipelines {
        for command in &mut pipeline.commands {
            patch_command(command, bodies, cursor)?;
        }
    }
    Ok(())
}

fn patch_command(
    command: &mut CommandNode,
    bodies: &[Token],
    cursor: &mut usize,
) -> Result<(), ParseException> {
    match command {
        CommandNode::Simple(simple) => {
            patch_redirections(&mut simple.redirections, bodies, cursor)?;
        }
        CommandNode::FunctionDef(def) => {
            patch_compound(&mut def.body, bodies, cursor)?;
            patch_redirections(&mut def.redirections, bodies, cursor)?;
        }
        CommandNode::Compound(compound) => {
            patch_compound(compound, bodies, cursor)?;
        }
    }
    Ok(())
}

fn patch_compound(
    compound: &mut CompoundCommandNode,
    bodies: &[Token],
    cursor: &mut usize,
) -> Result<(), ParseException> {
    match compound {
        CompoundCommandNode::If(n) => {
            for clause in &mut n.clauses {
                for s in &mut clause.condition {
                    patch_statement(s, bodies, cursor)?;
                }
                for s in &mut clause.body {
                    patch_statement(s, bodies, cursor)?;
                }
            }
            if let Some(else_body) = &mut n.else_body {
                for s in else_body {
                    patch_statement(s, bodies, cursor)?;
                }
            }
        }
        CompoundCommandNode::For(n) => {
            for s in &mut n.body {
                patch_statement(s, bodies, cursor)?;
            }
        }
        CompoundCommandNode::ArithFor(n) => {
            for s in &mut n.body {
                patch_statement(s, bodies, cursor)?;
            }
        }
        CompoundCommandNode::While(n) => {
            for s in &mut n.condition {
                patch_statement(s, bodies, cursor)?;
            }
            for s in &mut n.body {
                patch_statement(s, bodies, cursor)?;
            }
        }
        CompoundCommandNode::Until(n) => {
            for s in &mut n.condition {
                patch_statement(s, bodies, cursor)?;
            }
            for s in &mut n.body {
                patch_statement(s, bodies, cursor)?;
            }
        }
        CompoundCommandNode::Case(n) => {
            for item in &mut n.items {
                for s in &mut item.body {
                    patch_statement(s, bodies, cursor)?;
                }
            }
        }
        CompoundCommandNode::Subshell(n) => {
            for s in &mut n.body {
                patch_statement(s, bodies, cursor)?;
            }
        }
        CompoundCommandNode::Group(n) => {
            for s in &mut n.body {
                patch_statement(s, bodies, cursor)?;
            }
        }
        CompoundCommandNode::Arithmetic(_) | CompoundCommandNode::Conditional(_) => {}
    }
    patch_redirections(compound.redirections_mut(), bodies, cursor)?;
    Ok(())
}

fn patch_redirections(
    redirections: &mut [RedirectionNode],
    bodies: &[Token],
    cursor: &mut usize,
) -> Result<(), ParseException> {
    for redirection in redirections {
        if let RedirectionTarget::HereDoc(heredoc) = &mut redirection.target {
            if !heredoc.content.parts.is_empty() {
                continue;
            }
            let body = match bodies.get(*cursor) {
                Some(b) => b,
                // Unterminated input (e.g. interactive continuation): the
                // body stays empty.
                None => continue,
            };
            *cursor += 1;
            heredoc.content = if heredoc.quoted {
                WordNode {
                    parts: vec![WordPart::SingleQuoted(body.value.clone())],
                }
            } else {
                parse_heredoc_body(&body.value)?
            };
        }
    }
    Ok(())
}
