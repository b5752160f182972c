//! Control flow and execution errors.
//!
//! `break`, `continue`, `return`, and `exit` unwind the execution stack as
//! error values; each loop consumes one level of a `Break`/`Continue`, and
//! function or source boundaries consume `Return`. `ErrExit` carries a
//! failing status out of a statement when `set -e` fires, and `Expansion`
//! carries word-expansion and redirection failures that abort a
//! non-interactive shell.

use std::fmt;

/// Unified error enum for the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// `break N` — exits N loop levels.
    Break(u32),
    /// `continue N` — finishes N-1 outer levels and re-iterates.
    Continue(u32),
    /// `return N` — consumed at function and source boundaries.
    Return(i32),
    /// `exit N` — terminates the shell.
    Exit(i32),
    /// A command failed under `set -e`.
    ErrExit(i32),
    /// Expansion, arithmetic, or redirection failure. Non-interactive
    /// shells abort with `status`.
    Expansion { message: String, status: i32 },
}

impl ExecError {
    pub fn expansion(message: impl Into<String>) -> Self {
        ExecError::Expansion {
            message: message.into(),
            status: 1,
        }
    }

    pub fn expansion_with_status(message: impl Into<String>, status: i32) -> Self {
        ExecError::Expansion {
            message: message.into(),
            status,
        }
    }

    /// True for break/continue/return/exit.
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            ExecError::Break(_) | ExecError::Continue(_) | ExecError::Return(_) | ExecError::Exit(_)
        )
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Break(n) => write!(f, "break {}", n),
            ExecError::Continue(n) => write!(f, "continue {}", n),
            ExecError::Return(code) => write!(f, "return {}", code),
            ExecError::Exit(code) => write!(f, "exit {}", code),
            ExecError::ErrExit(code) => write!(f, "exit status {} under set -e", code),
            ExecError::Expansion { message, .. } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for ExecError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_flow_classification() {
        assert!(ExecError::Break(1).is_control_flow());
        assert!(ExecError::Return(0).is_control_flow());
        assert!(!ExecError::ErrExit(1).is_control_flow());
        assert!(!ExecError::expansion("x").is_control_flow());
    }

    #[test]
    fn expansion_default_status() {
        match ExecError::expansion("oops") {
            ExecError::Expansion { status, .. } => assert_eq!(status, 1),
            other => panic!("unexpected {:?}", other),
        }
    }
}
