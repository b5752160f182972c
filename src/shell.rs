//! The shell environment.
//!
//! Ties together the parser and interpreter: builds the initial state from
//! the process environment, executes source text, runs the interactive
//! read-eval loop with PS1/PS2 prompts and history, and fires the EXIT
//! trap at termination.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::interpreter::engine::Engine;
use crate::interpreter::errors::ExecError;
use crate::interpreter::expansion::prompt::expand_prompt;
use crate::interpreter::history::History;
use crate::interpreter::state::{ExecResult, Output, ShellState};

/// Construction options for a [`Shell`].
#[derive(Debug, Clone, Default)]
pub struct ShellOptionsInit {
    /// $0 for the session.
    pub name: Option<String>,
    /// Initial positional parameters.
    pub args: Vec<String>,
    pub interactive: bool,
    pub posix: bool,
    /// Startup file for interactive shells; None consults $ENV.
    pub rcfile: Option<String>,
    pub norc: bool,
    /// (flag, enable) pairs from the command line, e.g. ('e', true).
    pub short_flags: Vec<(char, bool)>,
    /// (-o/+o name, enable) pairs from the command line.
    pub long_options: Vec<(String, bool)>,
}

/// A shell session: persistent state plus the engine.
pub struct Shell {
    pub state: ShellState,
    engine: Engine,
    history: History,
    /// Set when the session should terminate (exit builtin, errexit, fatal
    /// expansion error).
    pub exited: Option<i32>,
}

impl Shell {
    pub fn new(init: ShellOptionsInit) -> Self {
        let mut state = ShellState::new();

        // The process environment seeds the variable store, exported.
        for (key, value) in std::env::vars() {
            let _ = state.set_exported(&key, value);
        }

        if !state.is_set("PATH") {
            let _ = state.set_exported("PATH", "/usr/local/bin:/usr/bin:/bin");
        }
        let cwd_display = state.cwd.display().to_string();
        if !state.is_set("PWD") {
            let _ = state.set_exported("PWD", cwd_display);
        }
        let _ = state.set("PS2", "> ");
        let _ = state.set("PS4", "+ ");
        if !state.is_set("PS1") {
            let _ = state.set("PS1", "\\s\\$ ");
        }
        let _ = state.set("OPTIND", "1");

        if let Some(name) = init.name {
            state.shell_name = name;
        }
        state.positional = init.args;
        state.options.interactive = init.interactive;
        state.options.posix = init.posix;
        state.options.history = init.interactive;

        for (flag, enable) in init.short_flags {
            let _ = state.options.set_short(flag, enable);
        }
        for (name, enable) in init.long_options {
            let _ = state.options.set_long(&name, enable);
        }

        let history = if state.options.interactive {
            History::with_file(history_path(&state))
        } else {
            History::default()
        };

        let mut shell = Shell {
            state,
            engine: Engine::new(),
            history,
            exited: None,
        };

        if shell.state.options.interactive && !init.norc {
            shell.source_startup_file(init.rcfile);
        }

        shell
    }

    fn source_startup_file(&mut self, rcfile: Option<String>) {
        let file = rcfile.or_else(|| self.state.get("ENV").filter(|v| !v.is_empty()));
        if let Some(file) = file {
            if std::path::Path::new(&file).is_file() {
                if let Ok(content) = std::fs::read_to_string(&file) {
                    let result = self.exec_blocking(&content);
                    print_result(&result);
                }
            }
        }
    }

    /// Execute shell source text against the session state.
    pub async fn exec(&mut self, source: &str) -> ExecResult {
        if self.exited.is_some() {
            return ExecResult::default();
        }

        let script = match crate::parser::parse(source) {
            Ok(script) => script,
            Err(e) => {
                if !self.state.options.interactive {
                    self.exited = Some(2);
                }
                return ExecResult::new(String::new(), format!("oxsh: {}\n", e), 2);
            }
        };

        let mut out = Output::default();
        let status = match self
            .engine
            .execute_script(&mut self.state, &script, &mut out, "")
            .await
        {
            Ok(status) => status,
            Err(ExecError::Exit(code)) => {
                self.exited = Some(code);
                code
            }
            Err(ExecError::ErrExit(code)) => {
                self.exited = Some(code);
                code
            }
            Err(ExecError::Return(code)) => code,
            Err(ExecError::Break(_)) | Err(ExecError::Continue(_)) => {
                self.state.last_exit_status
            }
            Err(ExecError::Expansion { message, status }) => {
                out.push_stderr(&format!("oxsh: {}\n", message));
                if !self.state.options.interactive {
                    self.exited = Some(status);
                }
                status
            }
        };

        self.state.set_status(status);
        ExecResult::new(out.stdout, out.stderr, status)
    }

    /// Blocking wrapper for startup-file sourcing.
    fn exec_blocking(&mut self, source: &str) -> ExecResult {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tokio::task::block_in_place(|| handle.block_on(self.exec(source)))
            }
            Err(_) => ExecResult::default(),
        }
    }

    /// Run the interactive read-eval loop: PS1 prompts, PS2 continuation
    /// on incomplete input, history recording, trap draining.
    pub async fn run_interactive(&mut self) -> i32 {
        let stdin = std::io::stdin();
        let mut buffer = String::new();

        loop {
            if let Some(code) = self.exited {
                break code;
            }

            let mut drain_out = Output::default();
            self.engine
                .run_pending_traps(&mut self.state, &mut drain_out)
                .await;
            print_output(&drain_out);

            let prompt_var = if buffer.is_empty() { "PS1" } else { "PS2" };
            let prompt = self
                .state
                .get(prompt_var)
                .unwrap_or_else(|| "$ ".to_string());
            eprint!("{}", expand_prompt(&self.state, &prompt));
            let _ = std::io::stderr().flush();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => break self.state.last_exit_status,
                Ok(_) => {}
                Err(_) => break self.state.last_exit_status,
            }

            buffer.push_str(&line);

            // Incomplete constructs keep reading under PS2.
            match crate::parser::parse(&buffer) {
                Err(e) if e.incomplete => continue,
                _ => {}
            }

            let source = std::mem::take(&mut buffer);
            if self.state.options.history {
                self.history.add(&source);
            }
            self.state.command_number += 1;

            let result = self.exec(&source).await;
            print_result(&result);

            // A syntax error or expansion failure never kills an
            // interactive session.
            if self.exited.is_some() && self.state.options.interactive {
                if let Some(code) = self.exited {
                    break code;
                }
            }
        }
    }

    /// Fire the EXIT trap, persist history, and return the final status.
    pub async fn finalize(&mut self, status: i32) -> i32 {
        let mut out = Output::default();
        self.engine.run_exit_trap(&mut self.state, &mut out).await;
        print_output(&out);
        if self.state.options.history {
            let _ = self.history.save();
        }
        self.exited.unwrap_or(status)
    }
}

fn history_path(state: &ShellState) -> PathBuf {
    if let Some(histfile) = state.get("HISTFILE").filter(|v| !v.is_empty()) {
        return PathBuf::from(histfile);
    }
    let home = state.get("HOME").unwrap_or_else(|| ".".to_string());
    PathBuf::from(home).join(format!(".{}_history", state.shell_name))
}

/// Print captured output to the real streams.
pub fn print_result(result: &ExecResult) {
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
        let _ = std::io::stdout().flush();
    }
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
        let _ = std::io::stderr().flush();
    }
}

fn print_output(out: &Output) {
    if !out.stdout.is_empty() {
        print!("{}", out.stdout);
        let _ = std::io::stdout().flush();
    }
    if !out.stderr.is_empty() {
        eprint!("{}", out.stderr);
        let _ = std::io::stderr().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> Shell {
        Shell::new(ShellOptionsInit::default())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exec_echo() {
        let mut sh = shell();
        let result = sh.exec("echo hello world").await;
        assert_eq!(result.stdout, "hello world\n");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exec_exit_marks_session() {
        let mut sh = shell();
        let result = sh.exec("exit 42").await;
        assert_eq!(result.exit_code, 42);
        assert_eq!(sh.exited, Some(42));
        // Further input is ignored
        let result = sh.exec("echo nope").await;
        assert_eq!(result.stdout, "");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn syntax_error_is_2() {
        let mut sh = shell();
        let result = sh.exec("if then").await;
        assert_eq!(result.exit_code, 2);
        assert!(result.stderr.contains("syntax error"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn state_persists_across_exec() {
        let mut sh = shell();
        sh.exec("x=41").await;
        let result = sh.exec("echo $((x + 1))").await;
        assert_eq!(result.stdout, "42\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn positional_args_from_init() {
        let mut sh = Shell::new(ShellOptionsInit {
            args: vec!["one".to_string(), "two".to_string()],
            ..Default::default()
        });
        let result = sh.exec("echo $1-$2-$#").await;
        assert_eq!(result.stdout, "one-two-2\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn errexit_terminates_session() {
        let mut sh = shell();
        let result = sh.exec("set -e\nfalse\necho unreachable").await;
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stdout, "");
        assert_eq!(sh.exited, Some(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exit_trap_fires_on_finalize() {
        let mut sh = shell();
        sh.exec("trap 'echo trap-ran' EXIT").await;
        // finalize prints directly; just confirm it completes and returns
        // the recorded status
        let code = sh.finalize(0).await;
        assert_eq!(code, 0);
        assert!(sh.state.traps.get("EXIT").is_none());
    }
}
