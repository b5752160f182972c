//! Redirection planning and application.
//!
//! Redirections are resolved in syntactic order against a small fd table,
//! which makes ordering observable: `>out 2>&1` sends both streams to the
//! file, while `2>&1 >out` sends stderr to the parent's stdout. Output
//! files are created (and truncated) when the plan is prepared, so a
//! redirection with no output still touches the file; captured output is
//! appended when the command finishes.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::ast::types::{RedirectionNode, RedirectionOperator, RedirectionTarget};
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::ExecError;
use crate::interpreter::state::{Output, ShellState};

/// Where an output fd points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutTarget {
    /// The parent's stdout.
    Stdout,
    /// The parent's stderr.
    Stderr,
    File { path: PathBuf, append: bool },
    Closed,
}

/// A resolved redirection plan for one command.
#[derive(Debug, Clone, Default)]
pub struct RedirPlan {
    /// Content for stdin (file contents, heredoc, here-string).
    pub stdin: Option<String>,
    pub stdin_closed: bool,
    targets: HashMap<i32, OutTarget>,
}

impl RedirPlan {
    fn target(&self, fd: i32) -> OutTarget {
        self.targets.get(&fd).cloned().unwrap_or(match fd {
            1 => OutTarget::Stdout,
            2 => OutTarget::Stderr,
            _ => OutTarget::Closed,
        })
    }

    pub fn stdout_target(&self) -> OutTarget {
        self.target(1)
    }

    pub fn stderr_target(&self) -> OutTarget {
        self.target(2)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.stdin.is_none() && !self.stdin_closed
    }
}

impl Engine {
    /// Expand targets and build the plan, opening output files as a side
    /// effect. Errors use the expansion channel and map to status 1 at the
    /// command boundary.
    pub async fn prepare_redirections(
        &self,
        state: &mut ShellState,
        redirections: &[RedirectionNode],
        out: &mut Output,
    ) -> Result<RedirPlan, ExecError> {
        let mut plan = RedirPlan::default();

        for redirection in redirections {
            let op = redirection.operator;
            match op {
                RedirectionOperator::Less | RedirectionOperator::LessGreat => {
                    let target = self.redirect_word(state, redirection, out).await?;
                    let path = resolve_path(state, &target);
                    match std::fs::read_to_string(&path) {
                        Ok(content) => {
                            plan.stdin = Some(content);
                            plan.stdin_closed = false;
                        }
                        Err(err) => {
                            if op == RedirectionOperator::LessGreat {
                                // <> creates the file when missing
                                open_output(&path, false)?;
                                plan.stdin = Some(String::new());
                            } else {
                                return Err(ExecError::expansion(format!(
                                    "{}: {}",
                                    target,
                                    io_message(&err)
                                )));
                            }
                        }
                    }
                }
                RedirectionOperator::Great
                | RedirectionOperator::Clobber
                | RedirectionOperator::DGreat => {
                    let target = self.redirect_word(state, redirection, out).await?;
                    let path = resolve_path(state, &target);
                    let append = op == RedirectionOperator::DGreat;
                    if op == RedirectionOperator::Great
                        && state.options.noclobber
                        && path.exists()
                    {
                        return Err(ExecError::expansion(format!(
                            "{}: cannot overwrite existing file",
                            target
                        )));
                    }
                    open_output(&path, append)?;
                    let fd = redirection.fd.unwrap_or(1);
                    plan.targets.insert(fd, OutTarget::File { path, append: true });
                }
                RedirectionOperator::AndGreat | RedirectionOperator::AndDGreat => {
                    let target = self.redirect_word(state, redirection, out).await?;
                    let path = resolve_path(state, &target);
                    open_output(&path, op == RedirectionOperator::AndDGreat)?;
                    let file = OutTarget::File {
                        path,
                        append: true,
                    };
                    plan.targets.insert(1, file.clone());
                    plan.targets.insert(2, file);
                }
                RedirectionOperator::TLess => {
                    let target = self.redirect_here_string(state, redirection, out).await?;
                    plan.stdin = Some(format!("{}\n", target));
                    plan.stdin_closed = false;
                }
                RedirectionOperator::DLess | RedirectionOperator::DLessDash => {
                    if let RedirectionTarget::HereDoc(heredoc) = &redirection.target {
                        // A quoted delimiter parsed the body as one literal
                        // part, so the same expansion path serves both.
                        let content =
                            self.expand_word_single(state, &heredoc.content, out).await?;
                        plan.stdin = Some(content);
                        plan.stdin_closed = false;
                    }
                }
                RedirectionOperator::GreatAnd => {
                    let target = self.redirect_word(state, redirection, out).await?;
                    let fd = redirection.fd.unwrap_or(1);
                    if target == "-" {
                        plan.targets.insert(fd, OutTarget::Closed);
                    } else if let Ok(source) = target.parse::<i32>() {
                        let resolved = plan.target(source);
                        plan.targets.insert(fd, resolved);
                    } else {
                        // >&file with no fd behaves like &>file
                        let path = resolve_path(state, &target);
                        open_output(&path, false)?;
                        let file = OutTarget::File { path, append: true };
                        if redirection.fd.is_none() {
                            plan.targets.insert(1, file.clone());
                            plan.targets.insert(2, file);
                        } else {
                            plan.targets.insert(fd, file);
                        }
                    }
                }
                RedirectionOperator::LessAnd => {
                    let target = self.redirect_word(state, redirection, out).await?;
                    if target == "-" {
                        plan.stdin = Some(String::new());
                        plan.stdin_closed = true;
                    }
                    // Duplicating input fds beyond close has no observable
                    // effect in the captured model.
                }
            }
        }

        Ok(plan)
    }

    async fn redirect_word(
        &self,
        state: &mut ShellState,
        redirection: &RedirectionNode,
        out: &mut Output,
    ) -> Result<String, ExecError> {
        match &redirection.target {
            RedirectionTarget::Word(word) => {
                self.expand_redirect_target(state, word, out).await
            }
            RedirectionTarget::HereDoc(_) => Err(ExecError::expansion("invalid redirection")),
        }
    }

    async fn redirect_here_string(
        &self,
        state: &mut ShellState,
        redirection: &RedirectionNode,
        out: &mut Output,
    ) -> Result<String, ExecError> {
        match &redirection.target {
            RedirectionTarget::Word(word) => self.expand_word_single(state, word, out).await,
            RedirectionTarget::HereDoc(_) => Err(ExecError::expansion("invalid redirection")),
        }
    }

    /// Route captured output through the plan: into parent streams or
    /// appended to the files the plan opened.
    pub fn route_output(&self, plan: &RedirPlan, local: Output, out: &mut Output) {
        route_stream(plan.stdout_target(), &local.stdout, out);
        route_stream(plan.stderr_target(), &local.stderr, out);
    }
}

fn route_stream(target: OutTarget, content: &str, out: &mut Output) {
    if content.is_empty() {
        return;
    }
    match target {
        OutTarget::Stdout => out.push_stdout(content),
        OutTarget::Stderr => out.push_stderr(content),
        OutTarget::File { path, .. } => {
            if let Ok(mut file) = OpenOptions::new().append(true).open(&path) {
                let _ = file.write_all(content.as_bytes());
            }
        }
        OutTarget::Closed => {}
    }
}

/// Create (and for non-append, truncate) an output file.
fn open_output(path: &Path, append: bool) -> Result<(), ExecError> {
    let result = if append {
        OpenOptions::new().create(true).append(true).open(path).map(|_| ())
    } else {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map(|_| ())
    };
    result.map_err(|err| {
        ExecError::expansion(format!("{}: {}", path.display(), io_message(&err)))
    })
}

pub(crate) fn resolve_path(state: &ShellState, target: &str) -> PathBuf {
    let path = Path::new(target);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        state.cwd.join(path)
    }
}

fn io_message(err: &std::io::Error) -> String {
    match err.kind() {
        std::io::ErrorKind::NotFound => "No such file or directory".to_string(),
        std::io::ErrorKind::PermissionDenied => "Permission denied".to_string(),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets() {
        let plan = RedirPlan::default();
        assert_eq!(plan.stdout_target(), OutTarget::Stdout);
        assert_eq!(plan.stderr_target(), OutTarget::Stderr);
        assert!(plan.is_empty());
    }

    #[test]
    fn dup_order_is_observable() {
        // 2>&1 >out : stderr keeps the parent's stdout
        let mut plan = RedirPlan::default();
        let before = plan.target(1);
        plan.targets.insert(2, before);
        plan.targets.insert(
            1,
            OutTarget::File {
                path: PathBuf::from("/tmp/out"),
                append: true,
            },
        );
        assert_eq!(plan.stderr_target(), OutTarget::Stdout);
        assert!(matches!(plan.stdout_target(), OutTarget::File { .. }));
    }

    #[test]
    fn route_to_parent_streams() {
        let engine = Engine::new();
        let plan = RedirPlan::default();
        let mut out = Output::default();
        let local = Output {
            stdout: "a".to_string(),
            stderr: "b".to_string(),
        };
        engine.route_output(&plan, local, &mut out);
        assert_eq!(out.stdout, "a");
        assert_eq!(out.stderr, "b");
    }

    #[test]
    fn closed_target_drops() {
        let engine = Engine::new();
        let mut plan = RedirPlan::default();
        plan.targets.insert(1, OutTarget::Closed);
        let mut out = Output::default();
        let local = Output {
            stdout: "dropped".to_string(),
            stderr: String::new(),
        };
        engine.route_output(&plan, local, &mut out);
        assert!(out.stdout.is_empty());
    }
}
