//! Evaluation of `[[ ... ]]` conditional expressions and the shared file
//! tests also used by `test`/`[`.

use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::PathBuf;

use crate::ast::types::{CondBinaryOp, CondExpr, CondUnaryOp};
use crate::interpreter::engine::{BoxFuture, Engine};
use crate::interpreter::errors::ExecError;
use crate::interpreter::expansion::fnmatch;
use crate::interpreter::redirections::resolve_path;
use crate::interpreter::state::{Output, ShellState};

impl Engine {
    pub fn eval_cond<'a>(
        &'a self,
        state: &'a mut ShellState,
        expr: &'a CondExpr,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<bool, ExecError>> {
        Box::pin(async move {
            match expr {
                CondExpr::Not(inner) => Ok(!self.eval_cond(state, inner, out).await?),
                CondExpr::And(left, right) => {
                    if !self.eval_cond(state, left, out).await? {
                        return Ok(false);
                    }
                    self.eval_cond(state, right, out).await
                }
                CondExpr::Or(left, right) => {
                    if self.eval_cond(state, left, out).await? {
                        return Ok(true);
                    }
                    self.eval_cond(state, right, out).await
                }
                CondExpr::Word(word) => {
                    let value = self.expand_word_single(state, word, out).await?;
                    Ok(!value.is_empty())
                }
                CondExpr::Unary { op, operand } => {
                    let value = self.expand_word_single(state, operand, out).await?;
                    self.eval_cond_unary(state, *op, &value)
                }
                CondExpr::Binary { op, left, right } => {
                    self.eval_cond_binary(state, *op, left, right, out).await
                }
            }
        })
    }

    fn eval_cond_unary(
        &self,
        state: &ShellState,
        op: CondUnaryOp,
        value: &str,
    ) -> Result<bool, ExecError> {
        Ok(match op {
            CondUnaryOp::NonEmpty => !value.is_empty(),
            CondUnaryOp::Empty => value.is_empty(),
            CondUnaryOp::VarSet => {
                // -v name or name[index]
                match value.find('[') {
                    Some(open) if value.ends_with(']') => {
                        let name = &value[..open];
                        let idx_text = &value[open + 1..value.len() - 1];
                        match idx_text.parse::<usize>() {
                            Ok(i) => state
                                .get_array(name)
                                .map(|items| i < items.len())
                                .unwrap_or(false),
                            Err(_) => state.is_set(name),
                        }
                    }
                    _ => state.is_set(value),
                }
            }
            CondUnaryOp::OptionSet => state.options.get_long(value).unwrap_or(false),
            CondUnaryOp::Terminal => match value.parse::<i32>() {
                Ok(fd) => unsafe { libc::isatty(fd) == 1 },
                Err(_) => false,
            },
            _ => file_test(state, op, value),
        })
    }

    async fn eval_cond_binary(
        &self,
        state: &mut ShellState,
        op: CondBinaryOp,
        left: &crate::ast::types::WordNode,
        right: &crate::ast::types::WordNode,
        out: &mut Output,
    ) -> Result<bool, ExecError> {
        let l = self.expand_word_single(state, left, out).await?;
        let ci = state.options.nocasematch;

        match op {
            CondBinaryOp::StrEq | CondBinaryOp::StrNe => {
                // The right-hand side is a pattern; quoted parts match
                // literally.
                let pattern = self.expand_word_pattern(state, right, out).await?;
                let matched = fnmatch(&pattern, &l, ci);
                Ok(if op == CondBinaryOp::StrEq {
                    matched
                } else {
                    !matched
                })
            }
            CondBinaryOp::Match => {
                let pattern = self.expand_word_single(state, right, out).await?;
                let pattern = if ci {
                    format!("(?i){}", pattern)
                } else {
                    pattern
                };
                let re = regex_lite::Regex::new(&pattern).map_err(|e| {
                    ExecError::expansion(format!("invalid regex: {}", e))
                })?;
                match re.captures(&l) {
                    Some(captures) => {
                        let groups: Vec<String> = captures
                            .iter()
                            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                            .collect();
                        state.set_array("BASH_REMATCH", groups)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            CondBinaryOp::StrLt | CondBinaryOp::StrGt => {
                let r = self.expand_word_single(state, right, out).await?;
                Ok(if op == CondBinaryOp::StrLt {
                    l < r
                } else {
                    l > r
                })
            }
            CondBinaryOp::NumEq
            | CondBinaryOp::NumNe
            | CondBinaryOp::NumLt
            | CondBinaryOp::NumLe
            | CondBinaryOp::NumGt
            | CondBinaryOp::NumGe => {
                let r = self.expand_word_single(state, right, out).await?;
                let ln = self.arith_operand(state, &l, out).await?;
                let rn = self.arith_operand(state, &r, out).await?;
                Ok(match op {
                    CondBinaryOp::NumEq => ln == rn,
                    CondBinaryOp::NumNe => ln != rn,
                    CondBinaryOp::NumLt => ln < rn,
                    CondBinaryOp::NumLe => ln <= rn,
                    CondBinaryOp::NumGt => ln > rn,
                    CondBinaryOp::NumGe => ln >= rn,
                    _ => unreachable!(),
                })
            }
            CondBinaryOp::NewerThan | CondBinaryOp::OlderThan => {
                let r = self.expand_word_single(state, right, out).await?;
                let lm = mtime(state, &l);
                let rm = mtime(state, &r);
                Ok(match op {
                    CondBinaryOp::NewerThan => match (lm, rm) {
                        (Some(a), Some(b)) => a > b,
                        (Some(_), None) => true,
                        _ => false,
                    },
                    _ => match (lm, rm) {
                        (Some(a), Some(b)) => a < b,
                        (None, Some(_)) => true,
                        _ => false,
                    },
                })
            }
            CondBinaryOp::SameFile => {
                let r = self.expand_word_single(state, right, out).await?;
                let lp = std::fs::metadata(cond_path(state, &l));
                let rp = std::fs::metadata(cond_path(state, &r));
                Ok(match (lp, rp) {
                    (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
                    _ => false,
                })
            }
        }
    }

    /// Numeric operands of -eq and friends are arithmetic expressions.
    pub(crate) async fn arith_operand(
        &self,
        state: &mut ShellState,
        text: &str,
        out: &mut Output,
    ) -> Result<i64, ExecError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        if let Ok(v) = trimmed.parse::<i64>() {
            return Ok(v);
        }
        self.eval_arith_text(state, trimmed, out).await
    }
}

fn cond_path(state: &ShellState, value: &str) -> PathBuf {
    resolve_path(state, value)
}

fn mtime(state: &ShellState, value: &str) -> Option<std::time::SystemTime> {
    std::fs::metadata(cond_path(state, value))
        .and_then(|m| m.modified())
        .ok()
}

/// File tests shared by `[[ ]]` and `test`.
pub fn file_test(state: &ShellState, op: CondUnaryOp, value: &str) -> bool {
    let path = cond_path(state, value);
    match op {
        CondUnaryOp::Exists => path.exists(),
        CondUnaryOp::IsFile => path.is_file(),
        CondUnaryOp::IsDir => path.is_dir(),
        CondUnaryOp::IsSymlink => std::fs::symlink_metadata(&path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false),
        CondUnaryOp::IsBlock => std::fs::metadata(&path)
            .map(|m| m.file_type().is_block_device())
            .unwrap_or(false),
        CondUnaryOp::IsChar => std::fs::metadata(&path)
            .map(|m| m.file_type().is_char_device())
            .unwrap_or(false),
        CondUnaryOp::IsPipe => std::fs::metadata(&path)
            .map(|m| m.file_type().is_fifo())
            .unwrap_or(false),
        CondUnaryOp::IsSocket => std::fs::metadata(&path)
            .map(|m| m.file_type().is_socket())
            .unwrap_or(false),
        CondUnaryOp::IsSetgid => mode_bit(&path, 0o2000),
        CondUnaryOp::IsSetuid => mode_bit(&path, 0o4000),
        CondUnaryOp::IsSticky => mode_bit(&path, 0o1000),
        CondUnaryOp::NonEmptyFile => std::fs::metadata(&path)
            .map(|m| m.len() > 0)
            .unwrap_or(false),
        CondUnaryOp::Readable => access(&path, libc::R_OK),
        CondUnaryOp::Writable => access(&path, libc::W_OK),
        CondUnaryOp::Executable => access(&path, libc::X_OK),
        CondUnaryOp::OwnedByUser => std::fs::metadata(&path)
            .map(|m| m.uid() == unsafe { libc::geteuid() })
            .unwrap_or(false),
        CondUnaryOp::OwnedByGroup => std::fs::metadata(&path)
            .map(|m| m.gid() == unsafe { libc::getegid() })
            .unwrap_or(false),
        _ => false,
    }
}

fn mode_bit(path: &std::path::Path, bit: u32) -> bool {
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & bit != 0)
        .unwrap_or(false)
}

fn access(path: &std::path::Path, mode: i32) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(cpath.as_ptr(), mode) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    async fn run_status(script: &str) -> i32 {
        let engine = Engine::new();
        let mut state = ShellState::new();
        let mut out = Output::default();
        let ast = parse(script).unwrap();
        engine
            .execute_script(&mut state, &ast, &mut out, "")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn string_tests() {
        assert_eq!(run_status("[[ -n abc ]]").await, 0);
        assert_eq!(run_status("[[ -z abc ]]").await, 1);
        assert_eq!(run_status("[[ -z '' ]]").await, 0);
    }

    #[tokio::test]
    async fn pattern_comparison() {
        assert_eq!(run_status("x=hello; [[ $x == h* ]]").await, 0);
        assert_eq!(run_status("x=hello; [[ $x == H* ]]").await, 1);
        assert_eq!(run_status("x=hello; [[ $x != h* ]]").await, 1);
        // Quoted pattern matches literally
        assert_eq!(run_status("x='h*'; [[ $x == 'h*' ]]").await, 0);
        assert_eq!(run_status("x=hello; [[ $x == 'h*' ]]").await, 1);
    }

    #[tokio::test]
    async fn numeric_comparison() {
        assert_eq!(run_status("[[ 10 -gt 9 ]]").await, 0);
        assert_eq!(run_status("[[ 10 -lt 9 ]]").await, 1);
        assert_eq!(run_status("[[ 2+2 -eq 4 ]]").await, 0);
    }

    #[tokio::test]
    async fn lexicographic_comparison() {
        assert_eq!(run_status("[[ apple < banana ]]").await, 0);
        assert_eq!(run_status("[[ banana > apple ]]").await, 0);
    }

    #[tokio::test]
    async fn logic_operators() {
        assert_eq!(run_status("[[ -n a && -n b ]]").await, 0);
        assert_eq!(run_status("[[ -z a || -n b ]]").await, 0);
        assert_eq!(run_status("[[ ! -n a ]]").await, 1);
    }

    #[tokio::test]
    async fn regex_match_sets_rematch() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        let mut out = Output::default();
        let ast = parse("x=ab12; [[ $x =~ ([a-z]+)([0-9]+) ]]").unwrap();
        let status = engine
            .execute_script(&mut state, &ast, &mut out, "")
            .await
            .unwrap();
        assert_eq!(status, 0);
        let rematch = state.get_array("BASH_REMATCH").unwrap();
        assert_eq!(rematch, vec!["ab12", "ab", "12"]);
    }

    #[tokio::test]
    async fn file_tests_on_real_fs() {
        assert_eq!(run_status("[[ -d / ]]").await, 0);
        assert_eq!(run_status("[[ -f /nonexistent-xyz ]]").await, 1);
        assert_eq!(run_status("[[ -e / && -r / ]]").await, 0);
    }

    #[tokio::test]
    async fn var_set_test() {
        assert_eq!(run_status("x=1; [[ -v x ]]").await, 0);
        assert_eq!(run_status("[[ -v unset_var_xyz ]]").await, 1);
    }

    #[tokio::test]
    async fn nocasematch() {
        assert_eq!(
            run_status("set -o nocasematch; x=HELLO; [[ $x == hello ]]").await,
            0
        );
    }
}
