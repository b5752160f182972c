//! The word-expansion pipeline.
//!
//! For each word: brace expansion first, then a single left-to-right scan
//! of the parts producing segments tagged with `quoted` (exempt from
//! globbing) and `splittable` (came from an unquoted substitution, so IFS
//! applies), then field splitting, then pathname expansion, with quote
//! removal falling out of the segment representation. Quoted `"$@"` is the
//! one case that produces hard field breaks without IFS.

use crate::ast::types::{ScriptNode, WordNode, WordPart};
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::ExecError;
use crate::interpreter::expansion::brace::expand_braces;
use crate::interpreter::expansion::glob::glob_expand;
use crate::interpreter::expansion::pattern::{escape_glob, has_glob_chars};
use crate::interpreter::expansion::split::split_ifs;
use crate::interpreter::expansion::tilde::expand_tilde;
use crate::interpreter::state::{Output, ShellState};

/// One expanded run of bytes with uniform quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    /// Came from a quoted region: exempt from globbing, and anchors an
    /// empty field.
    pub quoted: bool,
    /// Came from an unquoted substitution: IFS field splitting applies.
    pub splittable: bool,
}

impl Segment {
    pub fn literal(text: impl Into<String>) -> Self {
        Segment {
            text: text.into(),
            quoted: false,
            splittable: false,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Segment {
            text: text.into(),
            quoted: true,
            splittable: false,
        }
    }

    pub fn splittable(text: impl Into<String>) -> Self {
        Segment {
            text: text.into(),
            quoted: false,
            splittable: true,
        }
    }
}

/// Scan output: segments interleaved with hard field breaks ("$@").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Seg(Segment),
    FieldBreak,
}

impl Engine {
    // =========================================================================
    // ENTRY POINTS
    // =========================================================================

    /// Full pipeline: brace expansion, part scan, field splitting, and
    /// pathname expansion. Returns the resulting fields.
    pub async fn expand_word_fields(
        &self,
        state: &mut ShellState,
        word: &WordNode,
        out: &mut Output,
    ) -> Result<Vec<String>, ExecError> {
        let mut fields = Vec::new();

        for brace_word in expand_braces(word) {
            let mut pieces = Vec::new();
            self.expand_parts(state, &brace_word.parts, false, out, &mut pieces)
                .await?;

            for field in split_pieces(pieces, &state.ifs()) {
                self.glob_field(state, field, &mut fields);
            }
        }

        Ok(fields)
    }

    /// Expand to a single string: no field splitting, no globbing. Used
    /// for assignment values, case subjects, heredoc bodies, and `[[ ]]`
    /// operands. Multiple fields from `"$@"` join with spaces.
    pub async fn expand_word_single(
        &self,
        state: &mut ShellState,
        word: &WordNode,
        out: &mut Output,
    ) -> Result<String, ExecError> {
        let mut pieces = Vec::new();
        self.expand_parts(state, &word.parts, false, out, &mut pieces)
            .await?;

        let mut result = String::new();
        let mut first = true;
        for piece in pieces {
            match piece {
                Piece::Seg(seg) => {
                    result.push_str(&seg.text);
                    first = false;
                }
                Piece::FieldBreak => {
                    if !first {
                        result.push(' ');
                    }
                }
            }
        }
        Ok(result)
    }

    /// Expand to a pattern string: quoted bytes are glob-escaped so only
    /// unquoted metacharacters stay active. Drives case, `[[ == ]]`, and
    /// the `${var#pat}` family.
    pub async fn expand_word_pattern(
        &self,
        state: &mut ShellState,
        word: &WordNode,
        out: &mut Output,
    ) -> Result<String, ExecError> {
        let mut pieces = Vec::new();
        self.expand_parts(state, &word.parts, false, out, &mut pieces)
            .await?;

        let mut pattern = String::new();
        for piece in pieces {
            match piece {
                Piece::Seg(seg) => {
                    if seg.quoted {
                        pattern.push_str(&escape_glob(&seg.text));
                    } else {
                        pattern.push_str(&seg.text);
                    }
                }
                Piece::FieldBreak => pattern.push(' '),
            }
        }
        Ok(pattern)
    }

    /// Expand a redirection target: exactly one field.
    pub async fn expand_redirect_target(
        &self,
        state: &mut ShellState,
        word: &WordNode,
        out: &mut Output,
    ) -> Result<String, ExecError> {
        let fields = self.expand_word_fields(state, word, out).await?;
        if fields.len() != 1 {
            let raw = self.expand_word_single(state, word, out).await?;
            return Err(ExecError::expansion(format!("{}: ambiguous redirect", raw)));
        }
        Ok(fields.into_iter().next().unwrap_or_default())
    }

    // =========================================================================
    // PART SCAN
    // =========================================================================

    /// Left-to-right scan of word parts into tagged pieces.
    pub(crate) fn expand_parts<'a>(
        &'a self,
        state: &'a mut ShellState,
        parts: &'a [WordPart],
        in_quotes: bool,
        out: &'a mut Output,
        pieces: &'a mut Vec<Piece>,
    ) -> crate::interpreter::engine::BoxFuture<'a, Result<(), ExecError>> {
        Box::pin(async move {
            for part in parts {
                match part {
                    WordPart::Literal(text) => {
                        pieces.push(Piece::Seg(Segment {
                            text: text.clone(),
                            quoted: in_quotes,
                            splittable: false,
                        }));
                    }
                    WordPart::SingleQuoted(text) | WordPart::AnsiCQuoted(text) => {
                        pieces.push(Piece::Seg(Segment::quoted(text.clone())));
                    }
                    WordPart::Escaped(text) => {
                        pieces.push(Piece::Seg(Segment::quoted(text.clone())));
                    }
                    WordPart::DoubleQuoted(inner) => {
                        // Preserve the field anchor of "" even when the
                        // contents expand to nothing.
                        if inner.is_empty() {
                            pieces.push(Piece::Seg(Segment::quoted("")));
                        } else {
                            self.expand_parts(state, inner, true, out, pieces).await?;
                        }
                    }
                    WordPart::Tilde(user) => {
                        let home = expand_tilde(state, user.as_deref());
                        pieces.push(Piece::Seg(Segment::quoted(home)));
                    }
                    WordPart::Parameter(pe) => {
                        self.expand_parameter(state, pe, in_quotes, out, pieces).await?;
                    }
                    WordPart::CommandSubstitution { body, .. } => {
                        let captured = self.run_substitution(state, body, out).await?;
                        pieces.push(Piece::Seg(Segment {
                            text: captured,
                            quoted: in_quotes,
                            splittable: !in_quotes,
                        }));
                    }
                    WordPart::ArithmeticExpansion(node) => {
                        let value = self.eval_arith_node(state, node, out).await?;
                        pieces.push(Piece::Seg(Segment {
                            text: value.to_string(),
                            quoted: in_quotes,
                            splittable: !in_quotes,
                        }));
                    }
                    WordPart::BraceExpansion(items) => {
                        // A brace part reaching this scan was in a context
                        // without brace expansion (case subjects); it is
                        // literal text there.
                        pieces.push(Piece::Seg(Segment {
                            text: brace_literal_text(items),
                            quoted: in_quotes,
                            splittable: false,
                        }));
                    }
                }
            }
            Ok(())
        })
    }

    /// Run a command substitution: the body re-enters the full
    /// parse/execute pipeline over a cloned state; trailing newlines are
    /// stripped; the child's status becomes `$?`.
    pub(crate) async fn run_substitution(
        &self,
        state: &mut ShellState,
        body: &ScriptNode,
        out: &mut Output,
    ) -> Result<String, ExecError> {
        let mut sub_state = state.clone();
        sub_state.errexit_suppressed = 0;
        let mut sub_out = Output::default();

        let status = match self
            .execute_script(&mut sub_state, body, &mut sub_out, "")
            .await
        {
            Ok(status) => status,
            Err(ExecError::Exit(code))
            | Err(ExecError::Return(code))
            | Err(ExecError::ErrExit(code)) => code,
            Err(ExecError::Break(_)) | Err(ExecError::Continue(_)) => {
                sub_state.last_exit_status
            }
            Err(ExecError::Expansion { message, status }) => {
                sub_out.push_stderr(&format!("oxsh: {}\n", message));
                status
            }
        };

        out.push_stderr(&sub_out.stderr);
        state.set_status(status);

        let mut captured = sub_out.stdout;
        while captured.ends_with('\n') {
            captured.pop();
        }
        Ok(captured)
    }

    /// Pathname-expand one field and append the results.
    fn glob_field(&self, state: &ShellState, field: Vec<Segment>, fields: &mut Vec<String>) {
        let mut pattern = String::new();
        for seg in &field {
            if seg.quoted {
                pattern.push_str(&escape_glob(&seg.text));
            } else {
                pattern.push_str(&seg.text);
            }
        }

        if !state.options.noglob && has_glob_chars(&pattern) {
            let matches = glob_expand(&state.cwd, &pattern);
            if !matches.is_empty() {
                fields.extend(matches);
                return;
            }
            if state.options.nullglob {
                return;
            }
        }

        // Quote removal: the raw segment bytes
        let text: String = field.iter().map(|s| s.text.as_str()).collect();
        fields.push(text);
    }
}

/// Rebuild the literal spelling of a brace part for contexts where braces
/// do not expand.
fn brace_literal_text(items: &[crate::ast::types::BraceItem]) -> String {
    use crate::ast::types::{BraceItem, RangeEndpoint};

    fn endpoint(e: RangeEndpoint) -> String {
        match e {
            RangeEndpoint::Number(n) => n.to_string(),
            RangeEndpoint::Char(c) => c.to_string(),
        }
    }

    let inner: Vec<String> = items
        .iter()
        .map(|item| match item {
            BraceItem::Word(word) => word
                .parts
                .iter()
                .map(|part| match part {
                    WordPart::Literal(s)
                    | WordPart::SingleQuoted(s)
                    | WordPart::AnsiCQuoted(s)
                    | WordPart::Escaped(s) => s.clone(),
                    _ => String::new(),
                })
                .collect::<String>(),
            BraceItem::Range {
                start, end, step, ..
            } => match step {
                Some(step) => format!("{}..{}..{}", endpoint(*start), endpoint(*end), step),
                None => format!("{}..{}", endpoint(*start), endpoint(*end)),
            },
        })
        .collect();
    format!("{{{}}}", inner.join(","))
}

// =============================================================================
// FIELD SPLITTING
// =============================================================================

/// Split scanned pieces into fields. Splittable segments split on IFS;
/// quoted and literal segments join with adjacent fields; `FieldBreak`
/// pieces force a boundary.
pub fn split_pieces(pieces: Vec<Piece>, ifs: &str) -> Vec<Vec<Segment>> {
    let mut fields: Vec<Vec<Segment>> = Vec::new();
    let mut current: Vec<Segment> = Vec::new();
    let mut field_open = false;
    let mut pending_break = false;

    for piece in pieces {
        match piece {
            Piece::FieldBreak => {
                if field_open {
                    fields.push(std::mem::take(&mut current));
                    field_open = false;
                }
                pending_break = false;
            }
            Piece::Seg(seg) if !seg.splittable => {
                if pending_break {
                    if field_open {
                        fields.push(std::mem::take(&mut current));
                        field_open = false;
                    }
                    pending_break = false;
                }
                if !seg.text.is_empty() || seg.quoted {
                    field_open = true;
                }
                current.push(seg);
            }
            Piece::Seg(seg) => {
                if pending_break {
                    if field_open {
                        fields.push(std::mem::take(&mut current));
                        field_open = false;
                    }
                    pending_break = false;
                }

                let result = split_ifs(&seg.text, ifs);
                let mut parts = result.parts;

                if result.leading_ws && field_open {
                    fields.push(std::mem::take(&mut current));
                    field_open = false;
                    // The whitespace that closed the field absorbs an
                    // adjacent separator's empty part.
                    if parts.first().map(|p| p.is_empty()).unwrap_or(false) {
                        parts.remove(0);
                    }
                }

                for (k, part) in parts.iter().enumerate() {
                    if k > 0 {
                        fields.push(std::mem::take(&mut current));
                    }
                    current.push(Segment::literal(part.clone()));
                    field_open = true;
                }

                if result.trailing_delim {
                    pending_break = true;
                }
            }
        }
    }

    if field_open {
        fields.push(current);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg_q(s: &str) -> Piece {
        Piece::Seg(Segment::quoted(s))
    }

    fn seg_l(s: &str) -> Piece {
        Piece::Seg(Segment::literal(s))
    }

    fn seg_s(s: &str) -> Piece {
        Piece::Seg(Segment::splittable(s))
    }

    fn texts(fields: Vec<Vec<Segment>>) -> Vec<String> {
        fields
            .iter()
            .map(|f| f.iter().map(|s| s.text.as_str()).collect())
            .collect()
    }

    #[test]
    fn literal_never_splits() {
        let fields = split_pieces(vec![seg_l("a b c")], " \t\n");
        assert_eq!(texts(fields), vec!["a b c"]);
    }

    #[test]
    fn splittable_splits() {
        let fields = split_pieces(vec![seg_s("a b  c")], " \t\n");
        assert_eq!(texts(fields), vec!["a", "b", "c"]);
    }

    #[test]
    fn adjacent_join() {
        // x$a with a="1 2": the 1 joins x
        let fields = split_pieces(vec![seg_l("x"), seg_s("1 2")], " \t\n");
        assert_eq!(texts(fields), vec!["x1", "2"]);
    }

    #[test]
    fn quoted_joins_last_field() {
        // $a"$b" with a="1 2", b="3 4"
        let fields = split_pieces(vec![seg_s("1 2"), seg_q("3 4")], " \t\n");
        assert_eq!(texts(fields), vec!["1", "23 4"]);
    }

    #[test]
    fn two_splittables() {
        let fields = split_pieces(vec![seg_s("1 2"), seg_s("3 4")], " \t\n");
        assert_eq!(texts(fields), vec!["1", "23", "4"]);
    }

    #[test]
    fn leading_ws_closes_previous() {
        // b$a with a=" x"
        let fields = split_pieces(vec![seg_l("b"), seg_s(" x")], " \t\n");
        assert_eq!(texts(fields), vec!["b", "x"]);
    }

    #[test]
    fn trailing_delim_pends_break() {
        // $a"y" with a="x "
        let fields = split_pieces(vec![seg_s("x "), seg_q("y")], " \t\n");
        assert_eq!(texts(fields), vec!["x", "y"]);
    }

    #[test]
    fn custom_ifs_empty_fields() {
        // v=a::b with IFS=:
        let fields = split_pieces(vec![seg_s("a::b")], ":");
        assert_eq!(texts(fields), vec!["a", "", "b"]);
    }

    #[test]
    fn quoted_empty_keeps_field() {
        let fields = split_pieces(vec![seg_q("")], " \t\n");
        assert_eq!(texts(fields), vec![""]);
    }

    #[test]
    fn unquoted_empty_vanishes() {
        let fields = split_pieces(vec![seg_s("")], " \t\n");
        assert!(fields.is_empty());
    }

    #[test]
    fn field_breaks_separate() {
        // "$@" with params a, b
        let fields = split_pieces(
            vec![seg_q("a"), Piece::FieldBreak, seg_q("b")],
            " \t\n",
        );
        assert_eq!(texts(fields), vec!["a", "b"]);
    }

    #[test]
    fn field_break_with_affixes() {
        // "pre$@post" with params a, b
        let fields = split_pieces(
            vec![
                seg_q("pre"),
                seg_q("a"),
                Piece::FieldBreak,
                seg_q("b"),
                seg_q("post"),
            ],
            " \t\n",
        );
        assert_eq!(texts(fields), vec!["prea", "bpost"]);
    }

    #[test]
    fn empty_params_as_fields() {
        // set -- "" ""; "$@"
        let fields = split_pieces(
            vec![seg_q(""), Piece::FieldBreak, seg_q("")],
            " \t\n",
        );
        assert_eq!(texts(fields), vec!["", ""]);
    }

    #[test]
    fn whitespace_only_splittable_breaks() {
        // a$sep b where sep=" "
        let fields = split_pieces(vec![seg_l("a"), seg_s(" "), seg_l("b")], " \t\n");
        assert_eq!(texts(fields), vec!["a", "b"]);
    }
}
