//! Brace expansion: `{a,b,c}` and `{n..m[..step]}`.
//!
//! Runs before all other expansions, rewriting one word into several. The
//! first brace part found is expanded and the results recursed on, which
//! handles nesting depth-first and multiple braces left to right.

use crate::ast::types::{BraceItem, RangeEndpoint, WordNode, WordPart};

/// Expand all brace parts of a word into the resulting word list.
pub fn expand_braces(word: &WordNode) -> Vec<WordNode> {
    let brace_at = word
        .parts
        .iter()
        .position(|p| matches!(p, WordPart::BraceExpansion(_)));

    let idx = match brace_at {
        Some(idx) => idx,
        None => return vec![word.clone()],
    };

    let items = match &word.parts[idx] {
        WordPart::BraceExpansion(items) => items,
        _ => unreachable!(),
    };

    let prefix = &word.parts[..idx];
    let suffix = &word.parts[idx + 1..];
    let mut results = Vec::new();

    for item in items {
        match item {
            BraceItem::Word(alternative) => {
                let mut parts = prefix.to_vec();
                parts.extend(alternative.parts.clone());
                parts.extend(suffix.to_vec());
                results.extend(expand_braces(&WordNode { parts }));
            }
            BraceItem::Range {
                start,
                end,
                step,
                width,
            } => {
                for text in expand_range(*start, *end, *step, *width) {
                    let mut parts = prefix.to_vec();
                    parts.push(WordPart::Literal(text));
                    parts.extend(suffix.to_vec());
                    results.extend(expand_braces(&WordNode { parts }));
                }
            }
        }
    }

    results
}

fn expand_range(
    start: RangeEndpoint,
    end: RangeEndpoint,
    step: Option<i64>,
    width: usize,
) -> Vec<String> {
    match (start, end) {
        (RangeEndpoint::Number(a), RangeEndpoint::Number(b)) => {
            let step = step.map(|s| s.abs()).filter(|&s| s != 0).unwrap_or(1);
            let mut out = Vec::new();
            if a <= b {
                let mut v = a;
                while v <= b {
                    out.push(pad_number(v, width));
                    v += step;
                }
            } else {
                let mut v = a;
                while v >= b {
                    out.push(pad_number(v, width));
                    v -= step;
                }
            }
            out
        }
        (RangeEndpoint::Char(a), RangeEndpoint::Char(b)) => {
            let step = step.map(|s| s.abs()).filter(|&s| s != 0).unwrap_or(1) as u32;
            let (a, b) = (a as u32, b as u32);
            let mut out = Vec::new();
            if a <= b {
                let mut v = a;
                while v <= b {
                    if let Some(c) = char::from_u32(v) {
                        out.push(c.to_string());
                    }
                    v += step;
                }
            } else {
                let mut v = a;
                loop {
                    if let Some(c) = char::from_u32(v) {
                        out.push(c.to_string());
                    }
                    if v < b + step {
                        break;
                    }
                    v -= step;
                }
            }
            out
        }
        // Mixed endpoints never parse, but stay safe
        _ => Vec::new(),
    }
}

fn pad_number(v: i64, width: usize) -> String {
    if width == 0 {
        v.to_string()
    } else if v < 0 {
        format!("-{:0>width$}", -v, width = width.saturating_sub(1))
    } else {
        format!("{:0>width$}", v, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::word_parser::parse_word;

    fn expand_to_literals(input: &str) -> Vec<String> {
        let word = parse_word(input).unwrap();
        expand_braces(&word)
            .iter()
            .map(|w| {
                w.parts
                    .iter()
                    .map(|p| match p {
                        WordPart::Literal(s) => s.clone(),
                        WordPart::SingleQuoted(s) => s.clone(),
                        other => panic!("unexpected part {:?}", other),
                    })
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn simple_list() {
        assert_eq!(expand_to_literals("{a,b}.x"), vec!["a.x", "b.x"]);
    }

    #[test]
    fn numeric_range() {
        assert_eq!(expand_to_literals("{1..4}"), vec!["1", "2", "3", "4"]);
        assert_eq!(expand_to_literals("{3..1}"), vec!["3", "2", "1"]);
        assert_eq!(expand_to_literals("{0..10..5}"), vec!["0", "5", "10"]);
    }

    #[test]
    fn zero_padded_range() {
        assert_eq!(expand_to_literals("{01..03}"), vec!["01", "02", "03"]);
    }

    #[test]
    fn alpha_range() {
        assert_eq!(expand_to_literals("{a..d}"), vec!["a", "b", "c", "d"]);
        assert_eq!(expand_to_literals("{c..a}"), vec!["c", "b", "a"]);
    }

    #[test]
    fn nested_braces() {
        assert_eq!(
            expand_to_literals("{a,b{1,2}}"),
            vec!["a", "b1", "b2"]
        );
    }

    #[test]
    fn multiple_braces_cartesian() {
        assert_eq!(
            expand_to_literals("{a,b}{1,2}"),
            vec!["a1", "a2", "b1", "b2"]
        );
    }

    #[test]
    fn no_braces_is_identity() {
        assert_eq!(expand_to_literals("plain"), vec!["plain"]);
    }

    #[test]
    fn empty_alternative() {
        assert_eq!(expand_to_literals("a{,b}"), vec!["a", "ab"]);
    }
}
