//! Parameter expansion: `$name`, positional and special parameters, and
//! the full `${...}` operator set.

use crate::ast::types::{
    ArrayIndex, ParameterExpansion, ParameterOperation, PatternSubMode, TransformOp,
};
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::ExecError;
use crate::interpreter::expansion::pattern::{
    pattern_substitute, strip_prefix, strip_suffix, SubstAnchor,
};
use crate::interpreter::expansion::prompt::expand_prompt;
use crate::interpreter::expansion::quoting::{decode_ansi_c_escapes, shell_quote};
use crate::interpreter::expansion::word::{Piece, Segment};
use crate::interpreter::state::{Output, ShellState};

/// Resolved parameter value before operations apply.
#[derive(Debug, Clone)]
enum ParamValue {
    Unset,
    Scalar(String),
    /// Positional parameters or `name[@]`/`name[*]`; `star` selects the
    /// join-on-IFS behavior when quoted.
    List { items: Vec<String>, star: bool },
}

impl ParamValue {
    fn is_absent(&self, check_empty: bool) -> bool {
        match self {
            ParamValue::Unset => true,
            ParamValue::Scalar(s) => check_empty && s.is_empty(),
            ParamValue::List { items, .. } => {
                items.is_empty() || (check_empty && items.iter().all(|s| s.is_empty()))
            }
        }
    }

    fn scalar_view(&self, ifs_sep: &str) -> String {
        match self {
            ParamValue::Unset => String::new(),
            ParamValue::Scalar(s) => s.clone(),
            ParamValue::List { items, .. } => items.join(ifs_sep),
        }
    }

    fn map(self, f: impl Fn(&str) -> String) -> ParamValue {
        match self {
            ParamValue::Unset => ParamValue::Unset,
            ParamValue::Scalar(s) => ParamValue::Scalar(f(&s)),
            ParamValue::List { items, star } => ParamValue::List {
                items: items.iter().map(|s| f(s)).collect(),
                star,
            },
        }
    }
}

impl Engine {
    /// Expand one parameter reference into pieces.
    pub(crate) async fn expand_parameter(
        &self,
        state: &mut ShellState,
        pe: &ParameterExpansion,
        in_quotes: bool,
        out: &mut Output,
        pieces: &mut Vec<Piece>,
    ) -> Result<(), ExecError> {
        let value = self.resolve_parameter(state, pe, out).await?;

        // Unset under nounset is an error unless the operation handles
        // absence itself. Whole-list parameters are exempt.
        let handles_absence = matches!(
            pe.operation,
            Some(ParameterOperation::Default { .. })
                | Some(ParameterOperation::AssignDefault { .. })
                | Some(ParameterOperation::ErrorIfUnset { .. })
                | Some(ParameterOperation::Alternative { .. })
        );
        if matches!(value, ParamValue::Unset)
            && state.options.nounset
            && !handles_absence
            && !matches!(pe.parameter.as_str(), "@" | "*")
        {
            return Err(ExecError::expansion(format!(
                "{}: unbound variable",
                pe.parameter
            )));
        }

        let value = match &pe.operation {
            None => value,
            Some(op) => {
                match self
                    .apply_operation(state, pe, value, op, in_quotes, out, pieces)
                    .await?
                {
                    Some(v) => v,
                    // The operation emitted pieces itself (default words)
                    None => return Ok(()),
                }
            }
        };

        emit_value(state, value, in_quotes, pieces);
        Ok(())
    }

    /// Resolve the base value of a parameter reference.
    async fn resolve_parameter(
        &self,
        state: &mut ShellState,
        pe: &ParameterExpansion,
        out: &mut Output,
    ) -> Result<ParamValue, ExecError> {
        let name = pe.parameter.as_str();

        // Special parameters
        match name {
            "@" => {
                return Ok(ParamValue::List {
                    items: state.positional.clone(),
                    star: false,
                })
            }
            "*" => {
                return Ok(ParamValue::List {
                    items: state.positional.clone(),
                    star: true,
                })
            }
            "#" => return Ok(ParamValue::Scalar(state.positional.len().to_string())),
            "?" => return Ok(ParamValue::Scalar(state.last_exit_status.to_string())),
            "$" => return Ok(ParamValue::Scalar(state.shell_pid.to_string())),
            "!" => {
                return Ok(if state.last_bg_pid == 0 {
                    ParamValue::Unset
                } else {
                    ParamValue::Scalar(state.last_bg_pid.to_string())
                })
            }
            "-" => return Ok(ParamValue::Scalar(state.options.flag_string())),
            "0" => return Ok(ParamValue::Scalar(state.shell_name.clone())),
            _ => {}
        }

        // Positional parameters
        if name.chars().all(|c| c.is_ascii_digit()) {
            let n: usize = name
                .parse()
                .map_err(|_| ExecError::expansion(format!("{}: bad positional parameter", name)))?;
            return Ok(match state.positional_param(n) {
                Some(v) => ParamValue::Scalar(v.clone()),
                None => ParamValue::Unset,
            });
        }

        // Array subscripts
        if let Some(index) = &pe.index {
            return match index {
                ArrayIndex::All => Ok(match state.get_array(name) {
                    Some(items) => ParamValue::List { items, star: false },
                    None => ParamValue::List {
                        items: Vec::new(),
                        star: false,
                    },
                }),
                ArrayIndex::Star => Ok(match state.get_array(name) {
                    Some(items) => ParamValue::List { items, star: true },
                    None => ParamValue::List {
                        items: Vec::new(),
                        star: true,
                    },
                }),
                ArrayIndex::Expr(text) => {
                    let idx = self.eval_arith_text(state, text, out).await?;
                    let items = state.get_array(name).unwrap_or_default();
                    let len = items.len() as i64;
                    let effective = if idx < 0 { idx + len } else { idx };
                    if effective < 0 {
                        return Ok(ParamValue::Unset);
                    }
                    Ok(match items.get(effective as usize) {
                        Some(v) => ParamValue::Scalar(v.clone()),
                        None => ParamValue::Unset,
                    })
                }
            };
        }

        Ok(match state.get(name) {
            Some(v) => ParamValue::Scalar(v),
            None => ParamValue::Unset,
        })
    }

    /// Apply a `${...}` operation. Returns None when the operation emitted
    /// its own pieces (operand words keep their internal quoting).
    #[allow(clippy::too_many_arguments)]
    async fn apply_operation(
        &self,
        state: &mut ShellState,
        pe: &ParameterExpansion,
        value: ParamValue,
        op: &ParameterOperation,
        in_quotes: bool,
        out: &mut Output,
        pieces: &mut Vec<Piece>,
    ) -> Result<Option<ParamValue>, ExecError> {
        let ifs_sep = first_ifs_char(state);

        match op {
            ParameterOperation::Default { word, check_empty } => {
                if value.is_absent(*check_empty) {
                    self.expand_parts(state, &word.parts, in_quotes, out, pieces)
                        .await?;
                    Ok(None)
                } else {
                    Ok(Some(value))
                }
            }
            ParameterOperation::AssignDefault { word, check_empty } => {
                if value.is_absent(*check_empty) {
                    let new_value = self.expand_word_single(state, word, out).await?;
                    state.set(&pe.parameter, new_value.clone())?;
                    Ok(Some(ParamValue::Scalar(new_value)))
                } else {
                    Ok(Some(value))
                }
            }
            ParameterOperation::ErrorIfUnset { word, check_empty } => {
                if value.is_absent(*check_empty) {
                    let message = match word {
                        Some(w) => self.expand_word_single(state, w, out).await?,
                        None => "parameter null or not set".to_string(),
                    };
                    Err(ExecError::expansion_with_status(
                        format!("{}: {}", pe.parameter, message),
                        2,
                    ))
                } else {
                    Ok(Some(value))
                }
            }
            ParameterOperation::Alternative { word, check_empty } => {
                if value.is_absent(*check_empty) {
                    Ok(Some(ParamValue::Scalar(String::new())))
                } else {
                    self.expand_parts(state, &word.parts, in_quotes, out, pieces)
                        .await?;
                    Ok(None)
                }
            }
            ParameterOperation::Length => {
                let length = match &value {
                    ParamValue::List { items, .. } => items.len(),
                    ParamValue::Scalar(s) => s.chars().count(),
                    ParamValue::Unset => 0,
                };
                Ok(Some(ParamValue::Scalar(length.to_string())))
            }
            ParameterOperation::PrefixStrip { pattern, longest } => {
                let pat = self.expand_word_pattern(state, pattern, out).await?;
                let longest = *longest;
                Ok(Some(
                    value.map(|s| strip_prefix(s, &pat, longest, false)),
                ))
            }
            ParameterOperation::SuffixStrip { pattern, longest } => {
                let pat = self.expand_word_pattern(state, pattern, out).await?;
                let longest = *longest;
                Ok(Some(
                    value.map(|s| strip_suffix(s, &pat, longest, false)),
                ))
            }
            ParameterOperation::PatternSub {
                pattern,
                replacement,
                mode,
            } => {
                let pat = self.expand_word_pattern(state, pattern, out).await?;
                let rep = match replacement {
                    Some(r) => self.expand_word_single(state, r, out).await?,
                    None => String::new(),
                };
                let anchor = match mode {
                    PatternSubMode::First => SubstAnchor::First,
                    PatternSubMode::All => SubstAnchor::All,
                    PatternSubMode::Prefix => SubstAnchor::Prefix,
                    PatternSubMode::Suffix => SubstAnchor::Suffix,
                };
                Ok(Some(value.map(|s| {
                    pattern_substitute(s, &pat, &rep, anchor, false)
                })))
            }
            ParameterOperation::Substring { offset, length } => {
                let off = self.eval_arith_node(state, offset, out).await?;
                let len = match length {
                    Some(l) => Some(self.eval_arith_node(state, l, out).await?),
                    None => None,
                };
                apply_substring(value, off, len).map(Some)
            }
            ParameterOperation::CaseConv { upper, all } => {
                let (upper, all) = (*upper, *all);
                Ok(Some(value.map(|s| case_convert(s, upper, all))))
            }
            ParameterOperation::Indirect => {
                let target = value.scalar_view(&ifs_sep);
                if target.is_empty() {
                    return Ok(Some(ParamValue::Unset));
                }
                Ok(Some(match state.get(&target) {
                    Some(v) => ParamValue::Scalar(v),
                    None => {
                        if state.options.nounset {
                            return Err(ExecError::expansion(format!(
                                "{}: unbound variable",
                                target
                            )));
                        }
                        ParamValue::Unset
                    }
                }))
            }
            ParameterOperation::Transform(op) => {
                let scalar = value.scalar_view(&ifs_sep);
                let transformed = match op {
                    TransformOp::Quote => shell_quote(&scalar),
                    TransformOp::Unescape => decode_ansi_c_escapes(&scalar),
                    TransformOp::Prompt => expand_prompt(state, &scalar),
                };
                Ok(Some(ParamValue::Scalar(transformed)))
            }
        }
    }

    /// Evaluate raw arithmetic text (array subscripts).
    pub(crate) async fn eval_arith_text(
        &self,
        state: &mut ShellState,
        text: &str,
        out: &mut Output,
    ) -> Result<i64, ExecError> {
        let node = crate::parser::arithmetic_parser::parse_arithmetic(text)
            .map_err(|e| ExecError::expansion(e.message))?;
        self.eval_arith_node(state, &node, out).await
    }
}

/// `${var:off:len}` with code-point offsets; negative offset counts from
/// the end, negative length names an end offset.
fn apply_substring(
    value: ParamValue,
    offset: i64,
    length: Option<i64>,
) -> Result<ParamValue, ExecError> {
    match value {
        ParamValue::Unset => Ok(ParamValue::Scalar(String::new())),
        ParamValue::Scalar(s) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let start = if offset < 0 { len + offset } else { offset };
            if start < 0 || start > len {
                return Ok(ParamValue::Scalar(String::new()));
            }
            let end = match length {
                None => len,
                Some(l) if l >= 0 => (start + l).min(len),
                Some(l) => {
                    // Negative length is an end offset from the end
                    let end = len + l;
                    if end < start {
                        return Err(ExecError::expansion(format!(
                            "substring expression < 0",
                        )));
                    }
                    end
                }
            };
            Ok(ParamValue::Scalar(
                chars[start as usize..end as usize].iter().collect(),
            ))
        }
        ParamValue::List { items, star } => {
            let len = items.len() as i64;
            let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
            let end = match length {
                None => len,
                Some(l) if l >= 0 => (start + l).min(len),
                Some(l) => (len + l).max(start),
            };
            Ok(ParamValue::List {
                items: items[start as usize..end as usize].to_vec(),
                star,
            })
        }
    }
}

fn case_convert(s: &str, upper: bool, all: bool) -> String {
    if all {
        if upper {
            s.to_uppercase()
        } else {
            s.to_lowercase()
        }
    } else {
        let mut chars = s.chars();
        match chars.next() {
            None => String::new(),
            Some(first) => {
                let converted: String = if upper {
                    first.to_uppercase().collect()
                } else {
                    first.to_lowercase().collect()
                };
                format!("{}{}", converted, chars.as_str())
            }
        }
    }
}

fn first_ifs_char(state: &ShellState) -> String {
    match state.vars.get("IFS") {
        None => " ".to_string(),
        Some(var) => var
            .as_scalar()
            .chars()
            .next()
            .map(|c| c.to_string())
            .unwrap_or_default(),
    }
}

/// Emit a resolved value as pieces.
fn emit_value(state: &ShellState, value: ParamValue, in_quotes: bool, pieces: &mut Vec<Piece>) {
    match value {
        ParamValue::Unset => {
            if in_quotes {
                pieces.push(Piece::Seg(Segment::quoted("")));
            }
        }
        ParamValue::Scalar(text) => {
            pieces.push(Piece::Seg(Segment {
                text,
                quoted: in_quotes,
                splittable: !in_quotes,
            }));
        }
        ParamValue::List { items, star } => {
            if in_quotes && star {
                let sep = first_ifs_char(state);
                pieces.push(Piece::Seg(Segment::quoted(items.join(&sep))));
                return;
            }
            for (i, item) in items.into_iter().enumerate() {
                if i > 0 {
                    pieces.push(Piece::FieldBreak);
                }
                pieces.push(Piece::Seg(Segment {
                    text: item,
                    quoted: in_quotes,
                    splittable: !in_quotes,
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_positive() {
        let v = apply_substring(ParamValue::Scalar("hello".into()), 1, Some(3)).unwrap();
        assert!(matches!(v, ParamValue::Scalar(s) if s == "ell"));
    }

    #[test]
    fn substring_negative_offset() {
        let v = apply_substring(ParamValue::Scalar("hello".into()), -3, None).unwrap();
        assert!(matches!(v, ParamValue::Scalar(s) if s == "llo"));
    }

    #[test]
    fn substring_negative_length_is_end_offset() {
        let v = apply_substring(ParamValue::Scalar("hello".into()), 1, Some(-1)).unwrap();
        assert!(matches!(v, ParamValue::Scalar(s) if s == "ell"));
    }

    #[test]
    fn substring_bad_range_errors() {
        assert!(apply_substring(ParamValue::Scalar("hi".into()), 1, Some(-5)).is_err());
    }

    #[test]
    fn substring_codepoints() {
        let v = apply_substring(ParamValue::Scalar("héllo".into()), 1, Some(2)).unwrap();
        assert!(matches!(v, ParamValue::Scalar(s) if s == "él"));
    }

    #[test]
    fn case_conversions() {
        assert_eq!(case_convert("abc", true, false), "Abc");
        assert_eq!(case_convert("abc", true, true), "ABC");
        assert_eq!(case_convert("ABC", false, false), "aBC");
        assert_eq!(case_convert("ABC", false, true), "abc");
        assert_eq!(case_convert("", true, false), "");
    }

    #[test]
    fn absence_checks() {
        assert!(ParamValue::Unset.is_absent(false));
        assert!(!ParamValue::Scalar(String::new()).is_absent(false));
        assert!(ParamValue::Scalar(String::new()).is_absent(true));
        assert!(!ParamValue::Scalar("x".into()).is_absent(true));
    }
}
