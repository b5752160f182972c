//! Word construction.
//!
//! Takes the raw text of a word token and produces a [`WordNode`] whose
//! parts record quoting, so the expander can tell splittable and globbable
//! bytes from quoted ones. Quoted regions, substitutions, tildes, and brace
//! expansions all become distinct parts; plain text stays `Literal`.

use crate::ast::types::{
    ArithmeticExpressionNode, BraceItem, RangeEndpoint, WordNode, WordPart,
};
use crate::parser::arithmetic_parser::parse_arithmetic;
use crate::parser::expansion_parser::{parse_braced_expansion, parse_simple_parameter};
use crate::parser::types::ParseException;

/// Context a word is parsed in; affects tilde, brace, and escape handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordContext {
    /// Inside a here-document body: quotes are literal characters and only
    /// `\$`, `` \` ``, and `\\` are escapes.
    pub heredoc: bool,
    /// Assignment value: tildes also expand after unquoted `:`.
    pub assignment: bool,
    /// Suppress brace expansion (case patterns, ${} operand words).
    pub no_brace: bool,
}

/// Parse a word in the default context.
pub fn parse_word(text: &str) -> Result<WordNode, ParseException> {
    parse_word_in(text, WordContext::default())
}

/// Parse a word with explicit context.
pub fn parse_word_in(text: &str, ctx: WordContext) -> Result<WordNode, ParseException> {
    let chars: Vec<char> = text.chars().collect();
    if ctx.heredoc {
        return parse_heredoc_chars(&chars);
    }
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                if i + 1 < chars.len() {
                    if chars[i + 1] == '\n' {
                        // Line continuation disappears
                        i += 2;
                    } else {
                        flush_literal(&mut parts, &mut literal);
                        parts.push(WordPart::Escaped(chars[i + 1].to_string()));
                        i += 2;
                    }
                } else {
                    literal.push('\\');
                    i += 1;
                }
            }
            '\'' => {
                flush_literal(&mut parts, &mut literal);
                let (value, next) = scan_single_quoted(&chars, i + 1);
                parts.push(WordPart::SingleQuoted(value));
                i = next;
            }
            '"' => {
                flush_literal(&mut parts, &mut literal);
                let (inner, next) = parse_double_quoted(&chars, i + 1)?;
                parts.push(WordPart::DoubleQuoted(inner));
                i = next;
            }
            '`' => {
                flush_literal(&mut parts, &mut literal);
                let (part, next) = parse_backtick(&chars, i + 1)?;
                parts.push(part);
                i = next;
            }
            '$' => {
                flush_literal(&mut parts, &mut literal);
                let (part, next) = parse_dollar(&chars, i)?;
                match part {
                    Some(p) => parts.push(p),
                    None => literal.push('$'),
                }
                i = next;
            }
            '~' if i == 0 || (ctx.assignment && literal.ends_with(':')) => {
                let (user, next) = scan_tilde(&chars, i);
                // A tilde only expands when followed by / or end of word
                match chars.get(next) {
                    None | Some('/') | Some(':') => {
                        flush_literal(&mut parts, &mut literal);
                        parts.push(WordPart::Tilde(user));
                        i = next;
                    }
                    _ => {
                        literal.push('~');
                        i += 1;
                    }
                }
            }
            '{' if !ctx.no_brace => {
                if let Some((items, next)) = try_parse_brace(&chars, i, ctx)? {
                    flush_literal(&mut parts, &mut literal);
                    parts.push(WordPart::BraceExpansion(items));
                    i = next;
                } else {
                    literal.push('{');
                    i += 1;
                }
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }

    flush_literal(&mut parts, &mut literal);
    Ok(WordNode { parts })
}

/// Parse a here-document body: expansions apply, quotes do not.
pub fn parse_heredoc_body(text: &str) -> Result<WordNode, ParseException> {
    parse_word_in(
        text,
        WordContext {
            heredoc: true,
            ..WordContext::default()
        },
    )
}

fn parse_heredoc_chars(chars: &[char]) -> Result<WordNode, ParseException> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if matches!(chars.get(i + 1), Some('$') | Some('`') | Some('\\')) => {
                flush_heredoc_literal(&mut parts, &mut literal);
                parts.push(WordPart::Escaped(chars[i + 1].to_string()));
                i += 2;
            }
            '$' => {
                flush_heredoc_literal(&mut parts, &mut literal);
                let (part, next) = parse_dollar(chars, i)?;
                match part {
                    Some(p) => parts.push(p),
                    None => literal.push('$'),
                }
                i = next;
            }
            '`' => {
                flush_heredoc_literal(&mut parts, &mut literal);
                let (part, next) = parse_backtick(chars, i + 1)?;
                parts.push(part);
                i = next;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush_heredoc_literal(&mut parts, &mut literal);
    Ok(WordNode { parts })
}

fn flush_literal(parts: &mut Vec<WordPart>, literal: &mut String) {
    if !literal.is_empty() {
        parts.push(WordPart::Literal(std::mem::take(literal)));
    }
}

/// Heredoc literals are quoted text as far as splitting and globbing go.
fn flush_heredoc_literal(parts: &mut Vec<WordPart>, literal: &mut String) {
    if !literal.is_empty() {
        parts.push(WordPart::SingleQuoted(std::mem::take(literal)));
    }
}

fn scan_single_quoted(chars: &[char], start: usize) -> (String, usize) {
    let mut value = String::new();
    let mut i = start;
    while i < chars.len() && chars[i] != '\'' {
        value.push(chars[i]);
        i += 1;
    }
    (value, (i + 1).min(chars.len() + 1))
}

/// Parse the inside of a double-quoted region; returns the inner parts and
/// the index just past the closing quote.
fn parse_double_quoted(
    chars: &[char],
    start: usize,
) -> Result<(Vec<WordPart>, usize), ParseException> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = start;

    while i < chars.len() {
        match chars[i] {
            '"' => {
                flush_literal(&mut parts, &mut literal);
                return Ok((parts, i + 1));
            }
            '\\' => {
                match chars.get(i + 1) {
                    Some('$') | Some('`') | Some('"') | Some('\\') => {
                        flush_literal(&mut parts, &mut literal);
                        parts.push(WordPart::Escaped(chars[i + 1].to_string()));
                        i += 2;
                    }
                    Some('\n') => i += 2,
                    _ => {
                        literal.push('\\');
                        i += 1;
                    }
                }
            }
            '`' => {
                flush_literal(&mut parts, &mut literal);
                let (part, next) = parse_backtick(chars, i + 1)?;
                parts.push(part);
                i = next;
            }
            '$' => {
                flush_literal(&mut parts, &mut literal);
                let (part, next) = parse_dollar(chars, i)?;
                match part {
                    Some(p) => parts.push(p),
                    None => literal.push('$'),
                }
                i = next;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    // The lexer guarantees the quote is closed; tolerate anyway.
    flush_literal(&mut parts, &mut literal);
    Ok((parts, i))
}

/// Parse a backtick substitution starting just past the opening backtick.
fn parse_backtick(chars: &[char], start: usize) -> Result<(WordPart, usize), ParseException> {
    let mut body = String::new();
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '`' => {
                let script = crate::parser::parse(&body)?;
                return Ok((
                    WordPart::CommandSubstitution {
                        body: script,
                        backtick: true,
                    },
                    i + 1,
                ));
            }
            '\\' if matches!(chars.get(i + 1), Some('$') | Some('`') | Some('\\')) => {
                body.push(chars[i + 1]);
                i += 2;
            }
            c => {
                body.push(c);
                i += 1;
            }
        }
    }
    let script = crate::parser::parse(&body)?;
    Ok((
        WordPart::CommandSubstitution {
            body: script,
            backtick: true,
        },
        i,
    ))
}

/// Parse a `$`-introduced construct at `chars[start] == '$'`. Returns the
/// part (None when the `$` is literal) and the next index.
pub fn parse_dollar(
    chars: &[char],
    start: usize,
) -> Result<(Option<WordPart>, usize), ParseException> {
    let next = chars.get(start + 1).copied();
    match next {
        Some('{') => {
            let end = find_closing_brace(chars, start + 2);
            let inner: String = chars[start + 2..end].iter().collect();
            let exp = parse_braced_expansion(&inner)?;
            Ok((Some(WordPart::Parameter(exp)), (end + 1).min(chars.len())))
        }
        Some('(') => {
            if chars.get(start + 2) == Some(&'(') {
                // $(( ... )) terminated by the matching ))
                if let Some((inner, end)) = scan_arith_substitution(chars, start + 3) {
                    let expr = parse_arithmetic(&inner)?;
                    return Ok((Some(WordPart::ArithmeticExpansion(expr)), end));
                }
            }
            let (inner, end) = scan_command_substitution(chars, start + 2)?;
            let script = crate::parser::parse(&inner)?;
            Ok((
                Some(WordPart::CommandSubstitution {
                    body: script,
                    backtick: false,
                }),
                end,
            ))
        }
        Some('\'') => {
            let (raw, end) = scan_ansi_c(chars, start + 2);
            Ok((
                Some(WordPart::AnsiCQuoted(decode_ansi_c_escapes(&raw))),
                end,
            ))
        }
        Some('"') => {
            // $"..." locale quoting behaves as plain double quotes
            let (inner, end) = parse_double_quoted(chars, start + 2)?;
            Ok((Some(WordPart::DoubleQuoted(inner)), end))
        }
        Some(c) if c.is_ascii_digit() => Ok((
            Some(crate::ast::types::AST::parameter(c.to_string())),
            start + 2,
        )),
        Some(c) if matches!(c, '?' | '$' | '#' | '!' | '-' | '@' | '*') => Ok((
            Some(crate::ast::types::AST::parameter(c.to_string())),
            start + 2,
        )),
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            let mut i = start + 1;
            let mut name = String::new();
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                name.push(chars[i]);
                i += 1;
            }
            Ok((Some(parse_simple_parameter(name)), i))
        }
        _ => Ok((None, start + 1)),
    }
}

fn find_closing_brace(chars: &[char], start: usize) -> usize {
    let mut depth = 1;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    i
}

/// Scan `$(( ... ))` content starting just past `$((`. Returns the inner
/// text and the index past the closing `))`, or None when the parens do not
/// close as a pair.
fn scan_arith_substitution(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut depth = 2;
    let mut i = start;
    let mut prev_close = usize::MAX;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    if prev_close != usize::MAX && prev_close + 1 == i {
                        let inner: String = chars[start..i - 1].iter().collect();
                        return Some((inner, i + 1));
                    }
                    return None;
                }
                prev_close = i;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Scan `$( ... )` content starting just past `$(`.
fn scan_command_substitution(
    chars: &[char],
    start: usize,
) -> Result<(String, usize), ParseException> {
    let mut depth = 1;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let inner: String = chars[start..i].iter().collect();
                    return Ok((inner, i + 1));
                }
            }
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            '\\' => i += 1,
            _ => {}
        }
        i += 1;
    }
    let inner: String = chars[start..].iter().collect();
    Ok((inner, chars.len()))
}

fn scan_ansi_c(chars: &[char], start: usize) -> (String, usize) {
    let mut raw = String::new();
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\'' => return (raw, i + 1),
            '\\' => {
                raw.push('\\');
                if i + 1 < chars.len() {
                    raw.push(chars[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            c => {
                raw.push(c);
                i += 1;
            }
        }
    }
    (raw, i)
}

fn scan_tilde(chars: &[char], start: usize) -> (Option<String>, usize) {
    let mut i = start + 1;
    let mut user = String::new();
    if matches!(chars.get(i), Some('+') | Some('-')) {
        user.push(chars[i]);
        i += 1;
    } else {
        while i < chars.len()
            && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
        {
            user.push(chars[i]);
            i += 1;
        }
    }
    if user.is_empty() {
        (None, i)
    } else {
        (Some(user), i)
    }
}

// =============================================================================
// ANSI-C QUOTING
// =============================================================================

/// Decode the escape sequences of a `$'...'` string.
pub fn decode_ansi_c_escapes(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let esc = chars[i + 1];
        i += 2;
        match esc {
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'e' | 'E' => out.push('\x1b'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '?' => out.push('?'),
            '0'..='7' => {
                // Up to three octal digits, first already consumed
                let mut value = esc.to_digit(8).unwrap_or(0);
                let mut count = 1;
                while count < 3 {
                    match chars.get(i).and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            i += 1;
                            count += 1;
                        }
                        None => break,
                    }
                }
                if let Some(c) = char::from_u32(value & 0xff) {
                    out.push(c);
                }
            }
            'x' => {
                let mut value = 0u32;
                let mut count = 0;
                while count < 2 {
                    match chars.get(i).and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d;
                            i += 1;
                            count += 1;
                        }
                        None => break,
                    }
                }
                if count == 0 {
                    out.push('\\');
                    out.push('x');
                } else if let Some(c) = char::from_u32(value) {
                    out.push(c);
                }
            }
            'u' | 'U' => {
                let max = if esc == 'u' { 4 } else { 8 };
                let mut value = 0u32;
                let mut count = 0;
                while count < max {
                    match chars.get(i).and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d;
                            i += 1;
                            count += 1;
                        }
                        None => break,
                    }
                }
                if count == 0 {
                    out.push('\\');
                    out.push(esc);
                } else if let Some(c) = char::from_u32(value) {
                    out.push(c);
                }
            }
            'c' => {
                // Control character: \cX
                if let Some(&c) = chars.get(i) {
                    i += 1;
                    let upper = c.to_ascii_uppercase() as u32;
                    if let Some(ctrl) = char::from_u32(upper ^ 0x40) {
                        out.push(ctrl);
                    }
                } else {
                    out.push('\\');
                    out.push('c');
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

// =============================================================================
// BRACE EXPANSION PARSING
// =============================================================================

/// Try to parse a brace expansion starting at `chars[start] == '{'`.
/// Returns None when the braces do not form a valid expansion (no matching
/// `}`, or no top-level comma and no range).
fn try_parse_brace(
    chars: &[char],
    start: usize,
    ctx: WordContext,
) -> Result<Option<(Vec<BraceItem>, usize)>, ParseException> {
    let close = match find_matching_brace(chars, start) {
        Some(idx) => idx,
        None => return Ok(None),
    };
    let inner: String = chars[start + 1..close].iter().collect();

    // Range form {n..m} / {a..z} / {n..m..step}
    if let Some(range) = parse_brace_range(&inner) {
        return Ok(Some((vec![range], close + 1)));
    }

    // List form needs at least one top-level comma
    let items_text = split_top_level_commas(&inner);
    if items_text.len() < 2 {
        return Ok(None);
    }

    let mut items = Vec::new();
    for text in items_text {
        let word = parse_word_in(&text, ctx)?;
        items.push(BraceItem::Word(word));
    }
    Ok(Some((items, close + 1)))
}

fn find_matching_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '\'' => {
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
            }
            '"' => {
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            ' ' | '\t' | '\n' => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

fn split_top_level_commas(inner: &str) -> Vec<String> {
    let chars: Vec<char> = inner.chars().collect();
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0;
    let mut i = 0;
    let mut found_comma = false;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                current.push('\\');
                if i + 1 < chars.len() {
                    current.push(chars[i + 1]);
                    i += 1;
                }
            }
            '\'' => {
                current.push('\'');
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    current.push(chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    current.push('\'');
                }
            }
            '{' => {
                depth += 1;
                current.push('{');
            }
            '}' => {
                depth -= 1;
                current.push('}');
            }
            ',' if depth == 0 => {
                found_comma = true;
                items.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
        i += 1;
    }
    items.push(current);
    if found_comma {
        items
    } else {
        vec![]
    }
}

/// Parse `{X..Y}` / `{X..Y..step}` range content (without braces).
fn parse_brace_range(inner: &str) -> Option<BraceItem> {
    let parts: Vec<&str> = inner.split("..").collect();
    if parts.len() != 2 && parts.len() != 3 {
        return None;
    }
    let step = if parts.len() == 3 {
        Some(parts[2].parse::<i64>().ok()?)
    } else {
        None
    };

    // Numeric range, honoring zero padding
    if let (Ok(a), Ok(b)) = (parts[0].parse::<i64>(), parts[1].parse::<i64>()) {
        let width = if has_zero_padding(parts[0]) || has_zero_padding(parts[1]) {
            parts[0].trim_start_matches('-').len().max(parts[1].trim_start_matches('-').len())
        } else {
            0
        };
        return Some(BraceItem::Range {
            start: RangeEndpoint::Number(a),
            end: RangeEndpoint::Number(b),
            step,
            width,
        });
    }

    // Single-character alpha range
    let a: Vec<char> = parts[0].chars().collect();
    let b: Vec<char> = parts[1].chars().collect();
    if a.len() == 1 && b.len() == 1 && a[0].is_ascii_alphabetic() && b[0].is_ascii_alphabetic() {
        return Some(BraceItem::Range {
            start: RangeEndpoint::Char(a[0]),
            end: RangeEndpoint::Char(b[0]),
            step,
            width: 0,
        });
    }
    None
}

fn has_zero_padding(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    digits.len() > 1 && digits.starts_with('0')
}

/// Build an arithmetic expression node from raw text, for contexts that
/// carry arithmetic as strings (array subscripts, substring offsets).
pub fn parse_arith_text(text: &str) -> Result<ArithmeticExpressionNode, ParseException> {
    parse_arithmetic(text)
}
