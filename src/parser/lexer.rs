//! Lexer for shell source text.
//!
//! Single pass, no backtracking. Operators are recognized by maximal munch;
//! a word accumulates characters until a blank, operator, or newline, with
//! quoted regions and `$...` constructs skipped as opaque spans so the
//! word's end offset bounds the whole composite. Here-document bodies are
//! collected when the newline after the operator is seen and surface as
//! `HeredocContent` tokens the parser patches into the redirection.

use std::collections::HashMap;

/// Token types produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Eof,

    // Separators
    Newline,
    Semicolon,
    Amp, // &

    // Operators
    Pipe,   // |
    AndAnd, // &&
    OrOr,   // ||
    Bang,   // !

    // Redirections
    Less,      // <
    Great,     // >
    DLess,     // <<
    DGreat,    // >>
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    DLessDash, // <<-
    Clobber,   // >|
    TLess,     // <<<
    AndGreat,  // &>
    AndDGreat, // &>>

    // Grouping
    LParen, // (
    RParen, // )
    LBrace, // {
    RBrace, // }

    // Case terminators
    DSemi,       // ;;
    SemiAnd,     // ;&
    SemiSemiAnd, // ;;&

    // Compound command introducers
    DBrackStart, // [[
    DBrackEnd,   // ]]
    /// A complete `(( ... ))` region; the token value is the inner text.
    ArithCommand,

    // Reserved words
    If,
    Then,
    Else,
    Elif,
    Fi,
    For,
    While,
    Until,
    Do,
    Done,
    Case,
    Esac,
    In,

    // Words
    Word,
    /// A word of 1-4 digits directly adjacent to < or >.
    IoNumber,
    /// NAME=..., NAME+=..., NAME[expr]=...
    AssignmentWord,

    Comment,

    /// Deferred here-document body.
    HeredocContent,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "EOF",
            Self::Newline => "NEWLINE",
            Self::Semicolon => ";",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Bang => "!",
            Self::Less => "<",
            Self::Great => ">",
            Self::DLess => "<<",
            Self::DGreat => ">>",
            Self::LessAnd => "<&",
            Self::GreatAnd => ">&",
            Self::LessGreat => "<>",
            Self::DLessDash => "<<-",
            Self::Clobber => ">|",
            Self::TLess => "<<<",
            Self::AndGreat => "&>",
            Self::AndDGreat => "&>>",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::DSemi => ";;",
            Self::SemiAnd => ";&",
            Self::SemiSemiAnd => ";;&",
            Self::DBrackStart => "[[",
            Self::DBrackEnd => "]]",
            Self::ArithCommand => "((",
            Self::If => "if",
            Self::Then => "then",
            Self::Else => "else",
            Self::Elif => "elif",
            Self::Fi => "fi",
            Self::For => "for",
            Self::While => "while",
            Self::Until => "until",
            Self::Do => "do",
            Self::Done => "done",
            Self::Case => "case",
            Self::Esac => "esac",
            Self::In => "in",
            Self::Word => "WORD",
            Self::IoNumber => "IO_NUMBER",
            Self::AssignmentWord => "ASSIGNMENT_WORD",
            Self::Comment => "COMMENT",
            Self::HeredocContent => "HEREDOC_CONTENT",
        }
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
    /// Any part of the token was quoted.
    pub quoted: bool,
}

impl Token {
    pub fn new(
        token_type: TokenType,
        value: impl Into<String>,
        start: usize,
        end: usize,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            token_type,
            value: value.into(),
            start,
            end,
            line,
            column,
            quoted: false,
        }
    }

    pub fn with_quoted(mut self, quoted: bool) -> Self {
        self.quoted = quoted;
        self
    }
}

/// Error raised on invalid or unterminated input.
#[derive(Debug, Clone)]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// True when more input could complete the construct (unterminated
    /// quote, backquote, or substitution).
    pub incomplete: bool,
}

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for LexerError {}

impl LexerError {
    fn unterminated(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            incomplete: true,
        }
    }
}

/// Here-document registered by a `<<`/`<<-` operator, waiting for the next
/// newline.
#[derive(Debug, Clone)]
struct PendingHeredoc {
    delimiter: String,
    strip_tabs: bool,
    quoted: bool,
}

lazy_static::lazy_static! {
    static ref RESERVED_WORDS: HashMap<&'static str, TokenType> = {
        let mut m = HashMap::new();
        m.insert("if", TokenType::If);
        m.insert("then", TokenType::Then);
        m.insert("else", TokenType::Else);
        m.insert("elif", TokenType::Elif);
        m.insert("fi", TokenType::Fi);
        m.insert("for", TokenType::For);
        m.insert("while", TokenType::While);
        m.insert("until", TokenType::Until);
        m.insert("do", TokenType::Do);
        m.insert("done", TokenType::Done);
        m.insert("case", TokenType::Case);
        m.insert("esac", TokenType::Esac);
        m.insert("in", TokenType::In);
        m
    };

    static ref SINGLE_CHAR_OPS: HashMap<char, TokenType> = {
        let mut m = HashMap::new();
        m.insert('|', TokenType::Pipe);
        m.insert('&', TokenType::Amp);
        m.insert(';', TokenType::Semicolon);
        m.insert('(', TokenType::LParen);
        m.insert(')', TokenType::RParen);
        m.insert('<', TokenType::Less);
        m.insert('>', TokenType::Great);
        m
    };
}

const THREE_CHAR_OPS: &[(&str, TokenType)] = &[
    (";;&", TokenType::SemiSemiAnd),
    ("<<<", TokenType::TLess),
    ("&>>", TokenType::AndDGreat),
];

const TWO_CHAR_OPS: &[(&str, TokenType)] = &[
    ("&&", TokenType::AndAnd),
    ("||", TokenType::OrOr),
    (";;", TokenType::DSemi),
    (";&", TokenType::SemiAnd),
    (">>", TokenType::DGreat),
    ("<&", TokenType::LessAnd),
    (">&", TokenType::GreatAnd),
    ("<>", TokenType::LessGreat),
    (">|", TokenType::Clobber),
    ("&>", TokenType::AndGreat),
];

/// Characters that end an unquoted word.
fn is_word_boundary(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')' | '<' | '>')
}

/// Word boundaries inside `[[ ]]`: `<` and `>` are comparison operators
/// there, not redirections, so they stay inside words only when escaped.
fn is_cond_word_boundary(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')')
}

/// Check if a string is a valid variable name.
pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Find the position of an assignment `=` (or the `=` of `+=`) that follows
/// a valid name with an optional balanced `[subscript]`. Returns the char
/// index of `=`.
fn find_assignment_eq(chars: &[char]) -> Option<usize> {
    let mut i = 0;
    // Name prefix
    match chars.first() {
        Some(c) if c.is_ascii_alphabetic() || *c == '_' => i += 1,
        _ => return None,
    }
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    // Optional subscript
    if chars.get(i) == Some(&'[') {
        let mut depth = 0;
        while i < chars.len() {
            match chars[i] {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        i += 1;
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        if depth != 0 {
            return None;
        }
    }
    match chars.get(i) {
        Some('=') => Some(i),
        Some('+') if chars.get(i + 1) == Some(&'=') => Some(i + 1),
        _ => None,
    }
}

/// The lexer. Owns a char cursor over the input and the pending-heredoc
/// queue.
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    pending_heredocs: Vec<PendingHeredoc>,
    /// Inside `[[ ]]`.
    cond_depth: usize,
    /// The previous word was `=~`; the next word is a regex and only
    /// whitespace ends it.
    regex_word_next: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            pending_heredocs: Vec::new(),
            cond_depth: 0,
            regex_word_next: false,
        }
    }

    /// Tokenize the entire input.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        while self.pos < self.input.len() {
            if !self.pending_heredocs.is_empty()
                && self.tokens.last().map(|t| t.token_type) == Some(TokenType::Newline)
            {
                self.read_heredoc_content();
                continue;
            }

            self.skip_blanks();
            if self.pos >= self.input.len() {
                break;
            }

            if let Some(token) = self.next_token()? {
                self.tokens.push(token);
            }
        }

        // Heredocs cut short by EOF keep whatever lines were collected.
        if !self.pending_heredocs.is_empty() {
            self.read_heredoc_content();
        }

        self.tokens.push(Token::new(
            TokenType::Eof,
            "",
            self.pos,
            self.pos,
            self.line,
            self.column,
        ));
        Ok(self.tokens)
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) {
        if let Some(c) = self.current() {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    /// Skip blanks and `\<newline>` line continuations.
    fn skip_blanks(&mut self) {
        loop {
            match self.current() {
                Some(' ') | Some('\t') => self.bump(),
                Some('\\') if self.peek(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexerError> {
        let start = self.pos;
        let start_line = self.line;
        let start_column = self.column;

        let c0 = match self.current() {
            Some(c) => c,
            None => return Ok(None),
        };
        let c1 = self.peek(1);
        let c2 = self.peek(2);

        // Comment runs to end of line. A `#` only starts a comment at the
        // start of a word; mid-word `#` is handled inside read_word.
        if c0 == '#' {
            return Ok(Some(self.read_comment(start, start_line, start_column)));
        }

        if c0 == '\n' {
            self.bump();
            self.regex_word_next = false;
            return Ok(Some(Token::new(
                TokenType::Newline,
                "\n",
                start,
                self.pos,
                start_line,
                start_column,
            )));
        }

        // The right-hand side of `=~` is a single regex word; operator
        // characters like ( and | must not break it.
        if self.regex_word_next && c0 != '\n' && c0 != '#' {
            return self.read_word(start, start_line, start_column);
        }

        // `[[` and `]]` at word boundaries.
        if c0 == '[' && c1 == Some('[') && c2.map_or(true, is_word_boundary) {
            self.bump_n(2);
            self.cond_depth += 1;
            return Ok(Some(Token::new(
                TokenType::DBrackStart,
                "[[",
                start,
                self.pos,
                start_line,
                start_column,
            )));
        }
        if self.cond_depth > 0 && c0 == ']' && c1 == Some(']') && c2.map_or(true, is_word_boundary)
        {
            self.bump_n(2);
            self.cond_depth -= 1;
            self.regex_word_next = false;
            return Ok(Some(Token::new(
                TokenType::DBrackEnd,
                "]]",
                start,
                self.pos,
                start_line,
                start_column,
            )));
        }

        // `<<` / `<<-` register a pending heredoc from the delimiter that
        // follows; the delimiter word itself is still emitted normally.
        if c0 == '<' && c1 == Some('<') && c2 == Some('-') {
            self.bump_n(3);
            self.register_heredoc_from_lookahead(true);
            return Ok(Some(Token::new(
                TokenType::DLessDash,
                "<<-",
                start,
                self.pos,
                start_line,
                start_column,
            )));
        }
        if c0 == '<' && c1 == Some('<') && c2 != Some('<') {
            self.bump_n(2);
            self.register_heredoc_from_lookahead(false);
            return Ok(Some(Token::new(
                TokenType::DLess,
                "<<",
                start,
                self.pos,
                start_line,
                start_column,
            )));
        }

        // `(( ... ))` — scan to the matching `))`. When the closing parens
        // are not adjacent this is a subshell that happens to start with
        // two open parens, and we fall back to a single `(`.
        if c0 == '(' && c1 == Some('(') && self.cond_depth == 0 {
            if let Some((inner, consumed)) = self.scan_arith_region(self.pos) {
                self.bump_n(consumed);
                return Ok(Some(Token::new(
                    TokenType::ArithCommand,
                    inner,
                    start,
                    self.pos,
                    start_line,
                    start_column,
                )));
            }
        }

        for (op_str, token_type) in THREE_CHAR_OPS {
            let chars: Vec<char> = op_str.chars().collect();
            if c0 == chars[0] && c1 == Some(chars[1]) && c2 == Some(chars[2]) {
                self.bump_n(3);
                return Ok(Some(Token::new(
                    *token_type,
                    *op_str,
                    start,
                    self.pos,
                    start_line,
                    start_column,
                )));
            }
        }

        for (op_str, token_type) in TWO_CHAR_OPS {
            let chars: Vec<char> = op_str.chars().collect();
            if c0 == chars[0] && c1 == Some(chars[1]) {
                self.bump_n(2);
                return Ok(Some(Token::new(
                    *token_type,
                    *op_str,
                    start,
                    self.pos,
                    start_line,
                    start_column,
                )));
            }
        }

        // Inside [[ ]], `<` and `>` are words (comparison operators).
        if self.cond_depth > 0 && (c0 == '<' || c0 == '>') {
            self.bump();
            return Ok(Some(Token::new(
                TokenType::Word,
                c0.to_string(),
                start,
                self.pos,
                start_line,
                start_column,
            )));
        }

        if let Some(&token_type) = SINGLE_CHAR_OPS.get(&c0) {
            self.bump();
            return Ok(Some(Token::new(
                token_type,
                c0.to_string(),
                start,
                self.pos,
                start_line,
                start_column,
            )));
        }

        // `{` opens a group only when followed by a blank or newline;
        // otherwise it is word material (brace expansion, `{}`).
        if c0 == '{' {
            if matches!(c1, Some(' ') | Some('\t') | Some('\n') | None) {
                self.bump();
                return Ok(Some(Token::new(
                    TokenType::LBrace,
                    "{",
                    start,
                    self.pos,
                    start_line,
                    start_column,
                )));
            }
            return self.read_word(start, start_line, start_column);
        }

        if c0 == '}' {
            // `}` adjacent to more word characters stays part of a word.
            if self.peek(1).map_or(true, |c| is_word_boundary(c)) {
                self.bump();
                return Ok(Some(Token::new(
                    TokenType::RBrace,
                    "}",
                    start,
                    self.pos,
                    start_line,
                    start_column,
                )));
            }
            return self.read_word(start, start_line, start_column);
        }

        // `!` is the pipeline negation operator only when delimited.
        if c0 == '!' {
            if c1.map_or(true, is_word_boundary) {
                self.bump();
                return Ok(Some(Token::new(
                    TokenType::Bang,
                    "!",
                    start,
                    self.pos,
                    start_line,
                    start_column,
                )));
            }
            if c1 == Some('=') {
                self.bump_n(2);
                return Ok(Some(Token::new(
                    TokenType::Word,
                    "!=",
                    start,
                    self.pos,
                    start_line,
                    start_column,
                )));
            }
        }

        self.read_word(start, start_line, start_column)
    }

    fn read_comment(&mut self, start: usize, line: usize, column: usize) -> Token {
        while let Some(c) = self.current() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
        let value: String = self.input[start..self.pos].iter().collect();
        Token::new(TokenType::Comment, value, start, self.pos, line, column)
    }

    /// Scan a `(( ... ))` region starting at `start` (which points at the
    /// first `(`). Returns the inner text and the number of characters
    /// consumed, or None when the region closes with non-adjacent parens
    /// (nested subshells).
    fn scan_arith_region(&self, start: usize) -> Option<(String, usize)> {
        let mut i = start + 2;
        let mut depth = 2usize;
        let mut prev_close = 0usize;
        while i < self.input.len() {
            match self.input[i] {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        // Closing parens must be adjacent for arithmetic.
                        if prev_close + 1 == i {
                            let inner: String =
                                self.input[start + 2..i - 1].iter().collect();
                            return Some((inner, i + 1 - start));
                        }
                        return None;
                    }
                    prev_close = i;
                }
                '\'' => {
                    i += 1;
                    while i < self.input.len() && self.input[i] != '\'' {
                        i += 1;
                    }
                }
                '"' => {
                    i += 1;
                    while i < self.input.len() && self.input[i] != '"' {
                        if self.input[i] == '\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    }

    /// Read a composite word. Quoted regions and substitutions are skipped
    /// as opaque spans; classification happens after the scan.
    fn read_word(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
    ) -> Result<Option<Token>, LexerError> {
        let regex_mode = std::mem::take(&mut self.regex_word_next);
        let mut quoted = false;

        while let Some(c) = self.current() {
            let boundary = if regex_mode {
                matches!(c, ' ' | '\t' | '\n')
            } else if self.cond_depth > 0 {
                is_cond_word_boundary(c)
            } else {
                is_word_boundary(c)
            };
            if boundary {
                break;
            }

            match c {
                '\\' => {
                    if self.peek(1) == Some('\n') {
                        // Line continuation inside a word
                        self.bump_n(2);
                    } else if self.peek(1).is_some() {
                        quoted = true;
                        self.bump_n(2);
                    } else {
                        self.bump();
                    }
                }
                '\'' => {
                    quoted = true;
                    self.bump();
                    self.skip_single_quotes(line, column)?;
                }
                '"' => {
                    quoted = true;
                    self.bump();
                    self.skip_double_quotes(line, column)?;
                }
                '`' => {
                    quoted = true;
                    self.bump();
                    self.skip_backquotes(line, column)?;
                }
                '$' => {
                    self.skip_dollar_construct(line, column, &mut quoted)?;
                }
                '}' if self.cond_depth == 0 => {
                    // A bare `}` inside a word is literal
                    self.bump();
                }
                _ => self.bump(),
            }
        }

        let value: String = self.input[start..self.pos].iter().collect();
        if value.is_empty() {
            // Unrecognizable byte; consume it to guarantee progress.
            self.bump();
            return Err(LexerError {
                message: format!("invalid token near character {}", start),
                line,
                column,
                incomplete: false,
            });
        }

        let token_type = self.classify_word(&value, quoted);
        if token_type == TokenType::Word && !quoted && value == "=~" && self.cond_depth > 0 {
            self.regex_word_next = true;
        }

        Ok(Some(
            Token::new(token_type, value, start, self.pos, line, column).with_quoted(quoted),
        ))
    }

    fn classify_word(&self, value: &str, quoted: bool) -> TokenType {
        if !quoted {
            if let Some(&t) = RESERVED_WORDS.get(value) {
                return t;
            }
        }

        // IO_NUMBER: 1-4 digits directly adjacent to < or >
        if !quoted
            && !value.is_empty()
            && value.len() <= 4
            && value.chars().all(|c| c.is_ascii_digit())
            && matches!(self.current(), Some('<') | Some('>'))
        {
            return TokenType::IoNumber;
        }

        // ASSIGNMENT_WORD: valid identifier (with optional subscript),
        // optional `+`, then `=`, before any quoting.
        let chars: Vec<char> = value.chars().collect();
        if find_assignment_eq(&chars).is_some() {
            return TokenType::AssignmentWord;
        }

        TokenType::Word
    }

    fn skip_single_quotes(&mut self, line: usize, column: usize) -> Result<(), LexerError> {
        while let Some(c) = self.current() {
            self.bump();
            if c == '\'' {
                return Ok(());
            }
        }
        Err(LexerError::unterminated(
            "unterminated single quote",
            line,
            column,
        ))
    }

    fn skip_double_quotes(&mut self, line: usize, column: usize) -> Result<(), LexerError> {
        while let Some(c) = self.current() {
            match c {
                '"' => {
                    self.bump();
                    return Ok(());
                }
                '\\' => {
                    self.bump();
                    self.bump();
                }
                '`' => {
                    self.bump();
                    self.skip_backquotes(line, column)?;
                }
                '$' => {
                    let mut q = true;
                    self.skip_dollar_construct(line, column, &mut q)?;
                }
                _ => self.bump(),
            }
        }
        Err(LexerError::unterminated(
            "unterminated double quote",
            line,
            column,
        ))
    }

    fn skip_backquotes(&mut self, line: usize, column: usize) -> Result<(), LexerError> {
        while let Some(c) = self.current() {
            match c {
                '`' => {
                    self.bump();
                    return Ok(());
                }
                '\\' => {
                    self.bump();
                    self.bump();
                }
                _ => self.bump(),
            }
        }
        Err(LexerError::unterminated(
            "unterminated backquote",
            line,
            column,
        ))
    }

    /// Skip a `$`-introduced construct: `${...}`, `$(...)`, `$((...))`,
    /// `$'...'`, `$"..."`, or a plain `$NAME` reference.
    fn skip_dollar_construct(
        &mut self,
        line: usize,
        column: usize,
        quoted: &mut bool,
    ) -> Result<(), LexerError> {
        self.bump(); // $
        match self.current() {
            Some('{') => {
                *quoted = true;
                self.bump();
                let mut depth = 1;
                while let Some(c) = self.current() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                self.bump();
                                return Ok(());
                            }
                        }
                        '\'' => {
                            self.bump();
                            self.skip_single_quotes(line, column)?;
                            continue;
                        }
                        '"' => {
                            self.bump();
                            self.skip_double_quotes(line, column)?;
                            continue;
                        }
                        '\\' => {
                            self.bump();
                        }
                        _ => {}
                    }
                    self.bump();
                }
                Err(LexerError::unterminated(
                    "unterminated parameter expansion",
                    line,
                    column,
                ))
            }
            Some('(') => {
                *quoted = true;
                // $(( ... )) is terminated by the matching ));
                // $( ... ) tracks nested parens.
                self.bump();
                let arith = self.current() == Some('(');
                if arith {
                    self.bump();
                }
                let mut depth = if arith { 2 } else { 1 };
                while let Some(c) = self.current() {
                    match c {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                self.bump();
                                return Ok(());
                            }
                        }
                        '\'' => {
                            self.bump();
                            self.skip_single_quotes(line, column)?;
                            continue;
                        }
                        '"' => {
                            self.bump();
                            self.skip_double_quotes(line, column)?;
                            continue;
                        }
                        '`' => {
                            self.bump();
                            self.skip_backquotes(line, column)?;
                            continue;
                        }
                        '\\' => {
                            self.bump();
                        }
                        _ => {}
                    }
                    self.bump();
                }
                Err(LexerError::unterminated(
                    "unterminated command substitution",
                    line,
                    column,
                ))
            }
            Some('\'') => {
                *quoted = true;
                self.bump();
                // ANSI-C quoting: backslash escapes a quote.
                while let Some(c) = self.current() {
                    match c {
                        '\'' => {
                            self.bump();
                            return Ok(());
                        }
                        '\\' => {
                            self.bump();
                            self.bump();
                        }
                        _ => self.bump(),
                    }
                }
                Err(LexerError::unterminated(
                    "unterminated single quote",
                    line,
                    column,
                ))
            }
            Some('"') => {
                *quoted = true;
                self.bump();
                self.skip_double_quotes(line, column)
            }
            _ => Ok(()),
        }
    }

    /// Capture `{delimiter, strip_tabs, quoted}` for the heredoc operator
    /// just consumed, without moving the cursor.
    fn register_heredoc_from_lookahead(&mut self, strip_tabs: bool) {
        let mut i = self.pos;
        while matches!(self.input.get(i), Some(' ') | Some('\t')) {
            i += 1;
        }

        let mut delimiter = String::new();
        let mut quoted = false;
        while let Some(&c) = self.input.get(i) {
            match c {
                '\'' => {
                    quoted = true;
                    i += 1;
                    while let Some(&q) = self.input.get(i) {
                        if q == '\'' {
                            i += 1;
                            break;
                        }
                        delimiter.push(q);
                        i += 1;
                    }
                }
                '"' => {
                    quoted = true;
                    i += 1;
                    while let Some(&q) = self.input.get(i) {
                        if q == '"' {
                            i += 1;
                            break;
                        }
                        delimiter.push(q);
                        i += 1;
                    }
                }
                '\\' => {
                    quoted = true;
                    i += 1;
                    if let Some(&q) = self.input.get(i) {
                        delimiter.push(q);
                        i += 1;
                    }
                }
                c if is_word_boundary(c) => break,
                c => {
                    delimiter.push(c);
                    i += 1;
                }
            }
        }

        if !delimiter.is_empty() {
            self.pending_heredocs.push(PendingHeredoc {
                delimiter,
                strip_tabs,
                quoted,
            });
        }
    }

    /// Collect the bodies of all pending heredocs, line by line, starting at
    /// the current cursor (just past the newline). Emits one HeredocContent
    /// token per heredoc, in registration order.
    fn read_heredoc_content(&mut self) {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for heredoc in pending {
            let start = self.pos;
            let start_line = self.line;
            let start_column = self.column;
            let mut body = String::new();

            loop {
                if self.pos >= self.input.len() {
                    // Unterminated heredoc: the body is what was collected.
                    break;
                }
                let line_start = self.pos;
                let mut line_end = self.pos;
                while line_end < self.input.len() && self.input[line_end] != '\n' {
                    line_end += 1;
                }
                let raw_line: String = self.input[line_start..line_end].iter().collect();
                let check_line = if heredoc.strip_tabs {
                    raw_line.trim_start_matches('\t').to_string()
                } else {
                    raw_line.clone()
                };

                // Advance past the line and its newline
                let advance = line_end - line_start + usize::from(line_end < self.input.len());
                self.bump_n(advance);

                if check_line == heredoc.delimiter {
                    break;
                }

                if heredoc.strip_tabs {
                    body.push_str(raw_line.trim_start_matches('\t'));
                } else {
                    body.push_str(&raw_line);
                }
                body.push('\n');
            }

            self.tokens.push(
                Token::new(
                    TokenType::HeredocContent,
                    body,
                    start,
                    self.pos,
                    start_line,
                    start_column,
                )
                .with_quoted(heredoc.quoted),
            );
        }
    }
}
