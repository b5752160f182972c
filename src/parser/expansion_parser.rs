//! Parsing of `${...}` parameter expansions.
//!
//! The input is the text between the braces. The recognized operator set:
//! `-` `=` `?` `+` (with `:` variants), `#` `##` `%` `%%`, `/` `//` `/#`
//! `/%`, `:offset[:length]`, `^` `^^` `,` `,,`, `!` indirection, `#name`
//! length, and `@Q` `@E` `@P` transforms.

use crate::ast::types::{
    ArrayIndex, ParameterExpansion, ParameterOperation, PatternSubMode, TransformOp, WordPart,
};
use crate::parser::arithmetic_parser::parse_arithmetic;
use crate::parser::types::ParseException;
use crate::parser::word_parser::{parse_word_in, WordContext};

/// Build a bare `$NAME` expansion part.
pub fn parse_simple_parameter(name: String) -> WordPart {
    WordPart::Parameter(ParameterExpansion {
        parameter: name,
        index: None,
        operation: None,
    })
}

/// Parse the contents of `${...}`.
pub fn parse_braced_expansion(inner: &str) -> Result<ParameterExpansion, ParseException> {
    let chars: Vec<char> = inner.chars().collect();
    if chars.is_empty() {
        return Err(bad_substitution(inner));
    }

    // ${#param} — length. `${#}` alone is $#, and `${#-}`/`${#?}` keep the
    // special meaning of # followed by an operator-less special parameter.
    if chars[0] == '#' && chars.len() > 1 {
        let rest: String = chars[1..].iter().collect();
        if let Some((parameter, index, leftover)) = scan_parameter(&rest) {
            if leftover.is_empty() {
                return Ok(ParameterExpansion {
                    parameter,
                    index,
                    operation: Some(ParameterOperation::Length),
                });
            }
        }
        return Err(bad_substitution(inner));
    }

    // ${!param} — indirection.
    if chars[0] == '!' && chars.len() > 1 {
        let rest: String = chars[1..].iter().collect();
        if let Some((parameter, index, leftover)) = scan_parameter(&rest) {
            if leftover.is_empty() {
                return Ok(ParameterExpansion {
                    parameter,
                    index,
                    operation: Some(ParameterOperation::Indirect),
                });
            }
        }
        return Err(bad_substitution(inner));
    }

    let (parameter, index, rest) = scan_parameter(inner).ok_or_else(|| bad_substitution(inner))?;

    if rest.is_empty() {
        return Ok(ParameterExpansion {
            parameter,
            index,
            operation: None,
        });
    }

    let operation = parse_operation(&rest, inner)?;
    Ok(ParameterExpansion {
        parameter,
        index,
        operation: Some(operation),
    })
}

/// Scan the parameter at the front: a name, a digit string, or one special
/// character. Returns (parameter, index, remaining text).
fn scan_parameter(text: &str) -> Option<(String, Option<ArrayIndex>, String)> {
    let chars: Vec<char> = text.chars().collect();
    let first = *chars.first()?;

    let name_end = if first.is_ascii_alphabetic() || first == '_' {
        let mut i = 1;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        i
    } else if first.is_ascii_digit() {
        let mut i = 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        i
    } else if matches!(first, '?' | '$' | '#' | '!' | '-' | '@' | '*') {
        1
    } else {
        return None;
    };

    let parameter: String = chars[..name_end].iter().collect();
    let mut rest_start = name_end;
    let mut index = None;

    if chars.get(name_end) == Some(&'[') {
        let mut depth = 0;
        let mut i = name_end;
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
        if depth == 0 && i < chars.len() {
            let sub: String = chars[name_end + 1..i].iter().collect();
            index = Some(match sub.as_str() {
                "@" => ArrayIndex::All,
                "*" => ArrayIndex::Star,
                _ => ArrayIndex::Expr(sub),
            });
            rest_start = i + 1;
        }
    }

    let rest: String = chars[rest_start..].iter().collect();
    Some((parameter, index, rest))
}

fn parse_operation(rest: &str, whole: &str) -> Result<ParameterOperation, ParseException> {
    let chars: Vec<char> = rest.chars().collect();
    let operand_ctx = WordContext {
        no_brace: true,
        ..WordContext::default()
    };

    match chars[0] {
        ':' => {
            // `:` + one of -=?+ is the check-empty variant; a bare `:` is a
            // substring expansion.
            match chars.get(1) {
                Some('-') => {
                    let word: String = chars[2..].iter().collect();
                    Ok(ParameterOperation::Default {
                        word: parse_word_in(&word, operand_ctx)?,
                        check_empty: true,
                    })
                }
                Some('=') => {
                    let word: String = chars[2..].iter().collect();
                    Ok(ParameterOperation::AssignDefault {
                        word: parse_word_in(&word, operand_ctx)?,
                        check_empty: true,
                    })
                }
                Some('?') => {
                    let word: String = chars[2..].iter().collect();
                    Ok(ParameterOperation::ErrorIfUnset {
                        word: if word.is_empty() {
                            None
                        } else {
                            Some(parse_word_in(&word, operand_ctx)?)
                        },
                        check_empty: true,
                    })
                }
                Some('+') => {
                    let word: String = chars[2..].iter().collect();
                    Ok(ParameterOperation::Alternative {
                        word: parse_word_in(&word, operand_ctx)?,
                        check_empty: true,
                    })
                }
                _ => {
                    let spec: String = chars[1..].iter().collect();
                    parse_substring(&spec)
                }
            }
        }
        '-' => Ok(ParameterOperation::Default {
            word: parse_word_in(&rest[1..], operand_ctx)?,
            check_empty: false,
        }),
        '=' => Ok(ParameterOperation::AssignDefault {
            word: parse_word_in(&rest[1..], operand_ctx)?,
            check_empty: false,
        }),
        '?' => {
            let word = &rest[1..];
            Ok(ParameterOperation::ErrorIfUnset {
                word: if word.is_empty() {
                    None
                } else {
                    Some(parse_word_in(word, operand_ctx)?)
                },
                check_empty: false,
            })
        }
        '+' => Ok(ParameterOperation::Alternative {
            word: parse_word_in(&rest[1..], operand_ctx)?,
            check_empty: false,
        }),
        '#' => {
            let longest = chars.get(1) == Some(&'#');
            let pattern: String = chars[if longest { 2 } else { 1 }..].iter().collect();
            Ok(ParameterOperation::PrefixStrip {
                pattern: parse_word_in(&pattern, operand_ctx)?,
                longest,
            })
        }
        '%' => {
            let longest = chars.get(1) == Some(&'%');
            let pattern: String = chars[if longest { 2 } else { 1 }..].iter().collect();
            Ok(ParameterOperation::SuffixStrip {
                pattern: parse_word_in(&pattern, operand_ctx)?,
                longest,
            })
        }
        '/' => parse_pattern_sub(&chars[1..], operand_ctx),
        '^' => {
            let all = chars.get(1) == Some(&'^');
            Ok(ParameterOperation::CaseConv { upper: true, all })
        }
        ',' => {
            let all = chars.get(1) == Some(&',');
            Ok(ParameterOperation::CaseConv { upper: false, all })
        }
        '@' => match chars.get(1) {
            Some('Q') => Ok(ParameterOperation::Transform(TransformOp::Quote)),
            Some('E') => Ok(ParameterOperation::Transform(TransformOp::Unescape)),
            Some('P') => Ok(ParameterOperation::Transform(TransformOp::Prompt)),
            _ => Err(bad_substitution(whole)),
        },
        _ => Err(bad_substitution(whole)),
    }
}

/// Parse `${var/pat/rep}` content after the first `/`.
fn parse_pattern_sub(
    chars: &[char],
    ctx: WordContext,
) -> Result<ParameterOperation, ParseException> {
    let (mode, pattern_start) = match chars.first() {
        Some('/') => (PatternSubMode::All, 1),
        Some('#') => (PatternSubMode::Prefix, 1),
        Some('%') => (PatternSubMode::Suffix, 1),
        _ => (PatternSubMode::First, 0),
    };

    // Find the unescaped / that separates pattern from replacement. If the
    // pattern itself starts with /, the first character is consumed
    // literally before the delimiter search begins.
    let mut i = pattern_start;
    let mut consumed_any = false;
    let mut sep = None;
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
            '/' if consumed_any => {
                sep = Some(i);
                break;
            }
            _ => {}
        }
        consumed_any = true;
        i += 1;
    }

    let (pattern_text, replacement_text): (String, Option<String>) = match sep {
        Some(idx) => (
            chars[pattern_start..idx].iter().collect(),
            Some(chars[idx + 1..].iter().collect()),
        ),
        None => (chars[pattern_start..].iter().collect(), None),
    };

    let replacement = match replacement_text {
        Some(t) => Some(parse_word_in(&t, ctx)?),
        None => None,
    };

    Ok(ParameterOperation::PatternSub {
        pattern: parse_word_in(&pattern_text, ctx)?,
        replacement,
        mode,
    })
}

/// Parse `off` or `off:len` for `${var:off:len}`. The parts are arithmetic
/// expressions; the split happens at a top-level colon outside parentheses
/// and the ternary `?:`.
fn parse_substring(spec: &str) -> Result<ParameterOperation, ParseException> {
    let chars: Vec<char> = spec.chars().collect();
    let mut depth = 0;
    let mut ternary = 0;
    let mut split = None;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            '?' => ternary += 1,
            ':' if depth == 0 => {
                if ternary > 0 {
                    ternary -= 1;
                } else {
                    split = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    let (offset_text, length_text): (String, Option<String>) = match split {
        Some(idx) => (
            chars[..idx].iter().collect(),
            Some(chars[idx + 1..].iter().collect()),
        ),
        None => (spec.to_string(), None),
    };

    let offset = parse_arithmetic(offset_text.trim())?;
    let length = match length_text {
        Some(t) => Some(parse_arithmetic(t.trim())?),
        None => None,
    };
    Ok(ParameterOperation::Substring { offset, length })
}

fn bad_substitution(inner: &str) -> ParseException {
    ParseException::new(format!("${{{}}}: bad substitution", inner), 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(inner: &str) -> ParameterOperation {
        parse_braced_expansion(inner).unwrap().operation.unwrap()
    }

    #[test]
    fn plain_name() {
        let e = parse_braced_expansion("HOME").unwrap();
        assert_eq!(e.parameter, "HOME");
        assert!(e.operation.is_none());
    }

    #[test]
    fn length() {
        assert!(matches!(op("#x"), ParameterOperation::Length));
    }

    #[test]
    fn indirect() {
        assert!(matches!(op("!ref"), ParameterOperation::Indirect));
    }

    #[test]
    fn default_variants() {
        assert!(
            matches!(op("x:-fallback"), ParameterOperation::Default { check_empty: true, .. })
        );
        assert!(
            matches!(op("x-fallback"), ParameterOperation::Default { check_empty: false, .. })
        );
    }

    #[test]
    fn assign_and_error_and_alt() {
        assert!(matches!(op("x:=v"), ParameterOperation::AssignDefault { check_empty: true, .. }));
        assert!(matches!(op("x:?msg"), ParameterOperation::ErrorIfUnset { check_empty: true, .. }));
        assert!(matches!(op("x?"), ParameterOperation::ErrorIfUnset { word: None, .. }));
        assert!(matches!(op("x:+alt"), ParameterOperation::Alternative { check_empty: true, .. }));
    }

    #[test]
    fn strips() {
        assert!(matches!(op("x#p"), ParameterOperation::PrefixStrip { longest: false, .. }));
        assert!(matches!(op("x##p"), ParameterOperation::PrefixStrip { longest: true, .. }));
        assert!(matches!(op("x%p"), ParameterOperation::SuffixStrip { longest: false, .. }));
        assert!(matches!(op("x%%p"), ParameterOperation::SuffixStrip { longest: true, .. }));
    }

    #[test]
    fn pattern_sub_modes() {
        assert!(matches!(
            op("x/a/b"),
            ParameterOperation::PatternSub { mode: PatternSubMode::First, .. }
        ));
        assert!(matches!(
            op("x//a/b"),
            ParameterOperation::PatternSub { mode: PatternSubMode::All, .. }
        ));
        assert!(matches!(
            op("x/#a/b"),
            ParameterOperation::PatternSub { mode: PatternSubMode::Prefix, .. }
        ));
        assert!(matches!(
            op("x/%a/b"),
            ParameterOperation::PatternSub { mode: PatternSubMode::Suffix, .. }
        ));
    }

    #[test]
    fn pattern_sub_without_replacement() {
        assert!(matches!(
            op("x/abc"),
            ParameterOperation::PatternSub { replacement: None, .. }
        ));
    }

    #[test]
    fn substring_forms() {
        assert!(matches!(op("x:2"), ParameterOperation::Substring { length: None, .. }));
        assert!(matches!(op("x:2:3"), ParameterOperation::Substring { length: Some(_), .. }));
    }

    #[test]
    fn substring_negative_needs_space_or_parens() {
        // ${x: -2} and ${x:(-2)} both reach the arithmetic parser
        assert!(matches!(op("x: -2"), ParameterOperation::Substring { .. }));
        assert!(matches!(op("x:(-2)"), ParameterOperation::Substring { .. }));
    }

    #[test]
    fn case_conversion() {
        assert!(matches!(op("x^"), ParameterOperation::CaseConv { upper: true, all: false }));
        assert!(matches!(op("x^^"), ParameterOperation::CaseConv { upper: true, all: true }));
        assert!(matches!(op("x,"), ParameterOperation::CaseConv { upper: false, all: false }));
        assert!(matches!(op("x,,"), ParameterOperation::CaseConv { upper: false, all: true }));
    }

    #[test]
    fn transforms() {
        assert!(matches!(op("x@Q"), ParameterOperation::Transform(TransformOp::Quote)));
        assert!(matches!(op("x@E"), ParameterOperation::Transform(TransformOp::Unescape)));
        assert!(matches!(op("x@P"), ParameterOperation::Transform(TransformOp::Prompt)));
    }

    #[test]
    fn array_index() {
        let e = parse_braced_expansion("a[@]").unwrap();
        assert_eq!(e.index, Some(ArrayIndex::All));
        let e = parse_braced_expansion("a[n+1]").unwrap();
        assert_eq!(e.index, Some(ArrayIndex::Expr("n+1".to_string())));
    }

    #[test]
    fn array_length() {
        let e = parse_braced_expansion("#a[@]").unwrap();
        assert_eq!(e.index, Some(ArrayIndex::All));
        assert!(matches!(e.operation, Some(ParameterOperation::Length)));
    }

    #[test]
    fn bad_substitution_rejected() {
        assert!(parse_braced_expansion("").is_err());
        assert!(parse_braced_expansion("x@Z").is_err());
    }
}
