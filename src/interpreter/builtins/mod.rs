//! Builtin commands.
//!
//! Special builtins keep their assignments and abort a non-interactive
//! shell on usage errors; regular builtins behave like commands that
//! happen to run in-process.

pub mod core;
pub mod special;

use crate::interpreter::engine::Engine;
use crate::interpreter::errors::ExecError;
use crate::interpreter::state::{Output, ShellState};

/// POSIX special builtins.
pub fn is_special_builtin(name: &str) -> bool {
    matches!(
        name,
        ":" | "."
            | "source"
            | "break"
            | "continue"
            | "eval"
            | "exec"
            | "exit"
            | "export"
            | "readonly"
            | "return"
            | "set"
            | "shift"
            | "times"
            | "trap"
            | "unset"
    )
}

/// All builtins, special and regular.
pub fn is_builtin(name: &str) -> bool {
    is_special_builtin(name)
        || matches!(
            name,
            "alias"
                | "cd"
                | "echo"
                | "false"
                | "getopts"
                | "hash"
                | "jobs"
                | "kill"
                | "local"
                | "printf"
                | "pwd"
                | "read"
                | "test"
                | "["
                | "true"
                | "type"
                | "unalias"
                | "wait"
        )
}

impl Engine {
    /// Dispatch a builtin by name. The caller has already classified the
    /// name with [`is_builtin`].
    pub async fn run_builtin(
        &self,
        state: &mut ShellState,
        name: &str,
        args: &[String],
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        match name {
            ":" | "true" => Ok(0),
            "false" => Ok(1),
            "." | "source" => special::bi_source(self, state, args, out, stdin).await,
            "break" => special::bi_break(state, args),
            "continue" => special::bi_continue(state, args),
            "eval" => special::bi_eval(self, state, args, out, stdin).await,
            "exec" => special::bi_exec(self, state, args, out, stdin).await,
            "exit" => special::bi_exit(state, args),
            "export" => special::bi_export(self, state, args, out).await,
            "readonly" => special::bi_readonly(self, state, args, out).await,
            "return" => special::bi_return(state, args),
            "set" => special::bi_set(state, args, out),
            "shift" => special::bi_shift(state, args),
            "times" => special::bi_times(out),
            "trap" => special::bi_trap(state, args, out),
            "unset" => special::bi_unset(state, args, out),
            "alias" => core::bi_alias(state, args, out),
            "cd" => core::bi_cd(state, args, out),
            "echo" => core::bi_echo(args, out),
            "getopts" => core::bi_getopts(state, args, out),
            "hash" => core::bi_hash(state, args, out),
            "jobs" => core::bi_jobs(state, out),
            "kill" => core::bi_kill(state, args, out),
            "local" => core::bi_local(state, args, out),
            "printf" => core::bi_printf(args, out),
            "pwd" => core::bi_pwd(state, out),
            "read" => core::bi_read(state, args, out),
            "test" => core::bi_test(self, state, args, out).await,
            "[" => {
                let mut inner = args.to_vec();
                if inner.last().map(|s| s.as_str()) != Some("]") {
                    out.push_stderr("oxsh: [: missing `]'\n");
                    return Ok(2);
                }
                inner.pop();
                core::bi_test(self, state, &inner, out).await
            }
            "type" => core::bi_type(self, state, args, out),
            "unalias" => core::bi_unalias(state, args, out),
            "wait" => core::bi_wait(state, args, out).await,
            other => {
                out.push_stderr(&format!("oxsh: {}: not a shell builtin\n", other));
                Ok(1)
            }
        }
    }
}
