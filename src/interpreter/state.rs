//! Shell state: variables, functions, options, positional parameters,
//! traps, and the bookkeeping the executor reads and writes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::ast::types::FunctionDefNode;
use crate::interpreter::errors::ExecError;
use crate::interpreter::jobs::JobTable;

/// Default IFS: space, tab, newline.
pub const DEFAULT_IFS: &str = " \t\n";

// =============================================================================
// VARIABLES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Scalar(String),
    Array(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: VarValue,
    pub exported: bool,
    pub readonly: bool,
}

impl Variable {
    pub fn scalar(value: impl Into<String>) -> Self {
        Variable {
            value: VarValue::Scalar(value.into()),
            exported: false,
            readonly: false,
        }
    }

    /// Scalar view: element zero for arrays.
    pub fn as_scalar(&self) -> &str {
        match &self.value {
            VarValue::Scalar(s) => s,
            VarValue::Array(items) => items.first().map(|s| s.as_str()).unwrap_or(""),
        }
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Shell option flags (`set -e`, `set -o pipefail`, ...).
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    pub errexit: bool,
    pub nounset: bool,
    pub xtrace: bool,
    pub noglob: bool,
    pub noexec: bool,
    pub allexport: bool,
    pub monitor: bool,
    pub noclobber: bool,
    pub verbose: bool,
    pub interactive: bool,
    pub pipefail: bool,
    pub history: bool,
    pub posix: bool,
    pub nullglob: bool,
    pub nocasematch: bool,
}

impl ShellOptions {
    /// Map a short flag character to its option. Used by `set -x` and the
    /// command line.
    pub fn set_short(&mut self, flag: char, value: bool) -> Result<(), String> {
        match flag {
            'e' => self.errexit = value,
            'u' => self.nounset = value,
            'x' => self.xtrace = value,
            'f' => self.noglob = value,
            'n' => self.noexec = value,
            'a' => self.allexport = value,
            'v' => self.verbose = value,
            'C' => self.noclobber = value,
            'm' => self.monitor = value,
            'i' => self.interactive = value,
            other => return Err(format!("invalid option: -{}", other)),
        }
        Ok(())
    }

    /// Map a long option name (`set -o NAME`).
    pub fn set_long(&mut self, name: &str, value: bool) -> Result<(), String> {
        match name {
            "errexit" => self.errexit = value,
            "nounset" => self.nounset = value,
            "xtrace" => self.xtrace = value,
            "noglob" => self.noglob = value,
            "noexec" => self.noexec = value,
            "allexport" => self.allexport = value,
            "monitor" => self.monitor = value,
            "noclobber" => self.noclobber = value,
            "verbose" => self.verbose = value,
            "pipefail" => self.pipefail = value,
            "history" => self.history = value,
            "posix" => self.posix = value,
            "nullglob" => self.nullglob = value,
            "nocasematch" => self.nocasematch = value,
            other => return Err(format!("invalid option name: {}", other)),
        }
        Ok(())
    }

    pub fn get_long(&self, name: &str) -> Option<bool> {
        Some(match name {
            "errexit" => self.errexit,
            "nounset" => self.nounset,
            "xtrace" => self.xtrace,
            "noglob" => self.noglob,
            "noexec" => self.noexec,
            "allexport" => self.allexport,
            "monitor" => self.monitor,
            "noclobber" => self.noclobber,
            "verbose" => self.verbose,
            "interactive" => self.interactive,
            "pipefail" => self.pipefail,
            "history" => self.history,
            "posix" => self.posix,
            "nullglob" => self.nullglob,
            "nocasematch" => self.nocasematch,
            _ => return None,
        })
    }

    /// `$-` — the short flags currently set.
    pub fn flag_string(&self) -> String {
        let mut s = String::new();
        for (flag, on) in [
            ('a', self.allexport),
            ('C', self.noclobber),
            ('e', self.errexit),
            ('f', self.noglob),
            ('i', self.interactive),
            ('m', self.monitor),
            ('n', self.noexec),
            ('u', self.nounset),
            ('v', self.verbose),
            ('x', self.xtrace),
        ] {
            if on {
                s.push(flag);
            }
        }
        s
    }

    /// Names for `set -o` listing, in order.
    pub fn long_names() -> &'static [&'static str] {
        &[
            "allexport",
            "errexit",
            "history",
            "monitor",
            "nocasematch",
            "noclobber",
            "noexec",
            "noglob",
            "nounset",
            "nullglob",
            "pipefail",
            "posix",
            "verbose",
            "xtrace",
        ]
    }
}

// =============================================================================
// EXECUTION OUTPUT
// =============================================================================

/// Captured output of an execution.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
        }
    }

    pub fn ok() -> Self {
        Self::default()
    }
}

/// Output sink threaded through the executor.
#[derive(Debug, Clone, Default)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

/// Consumable stdin for a command context: pipeline data, here-documents,
/// and input redirections. `read` takes one line at a time; an external
/// command drains the rest. When not attached, `read` falls back to the
/// shell's real standard input.
#[derive(Debug, Clone, Default)]
pub struct StdinBuf {
    data: String,
    pos: usize,
    pub attached: bool,
}

impl StdinBuf {
    pub fn attached(data: String) -> Self {
        StdinBuf {
            data,
            pos: 0,
            attached: true,
        }
    }

    /// Next line without its newline; None at end of input.
    pub fn read_line(&mut self) -> Option<String> {
        if self.pos >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.pos..];
        match rest.find('\n') {
            Some(idx) => {
                let line = rest[..idx].to_string();
                self.pos += idx + 1;
                Some(line)
            }
            None => {
                let line = rest.to_string();
                self.pos = self.data.len();
                Some(line)
            }
        }
    }

    pub fn rest(&self) -> &str {
        &self.data[self.pos.min(self.data.len())..]
    }

    pub fn consume_all(&mut self) {
        self.pos = self.data.len();
    }
}

impl Output {
    pub fn push_stdout(&mut self, s: &str) {
        self.stdout.push_str(s);
    }

    pub fn push_stderr(&mut self, s: &str) {
        self.stderr.push_str(s);
    }
}

// =============================================================================
// SHELL STATE
// =============================================================================

/// Complete interpreter state. Subshells, command substitutions, and
/// background jobs clone it; their mutations do not escape.
#[derive(Debug, Clone)]
pub struct ShellState {
    pub vars: HashMap<String, Variable>,
    /// Saved outer bindings, one frame per function call; `local` stores
    /// the shadowed value (or None) in the top frame.
    pub scopes: Vec<HashMap<String, Option<Variable>>>,
    pub functions: HashMap<String, FunctionDefNode>,
    pub aliases: HashMap<String, String>,

    pub positional: Vec<String>,
    positional_stack: Vec<Vec<String>>,

    pub options: ShellOptions,
    /// Non-zero while evaluating contexts where `set -e` must not fire:
    /// conditions, `!` operands, non-final and-or operands. A counter
    /// because the contexts nest.
    pub errexit_suppressed: u32,

    pub last_exit_status: i32,
    pub pipestatus: Vec<i32>,
    pub last_bg_pid: u32,
    pub shell_pid: u32,
    pub shell_name: String,
    pub command_number: u64,
    pub command_hash: HashMap<String, PathBuf>,

    pub cwd: PathBuf,
    pub current_line: usize,
    pub last_arg: String,
    pub func_depth: u32,
    pub source_depth: u32,
    pub loop_depth: u32,

    /// Trap actions keyed by condition name (signal name, EXIT, ERR).
    pub traps: HashMap<String, String>,
    /// Signals delivered but not yet acted on; shared with the listener
    /// tasks installed by the trap builtin.
    pub pending_signals: Arc<Mutex<Vec<i32>>>,

    pub jobs: JobTable,
    pub start_time: Instant,
    /// Stdin content for the current command context.
    pub stdin_buf: StdinBuf,
}

impl Default for ShellState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellState {
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        ShellState {
            vars: HashMap::new(),
            scopes: Vec::new(),
            functions: HashMap::new(),
            aliases: HashMap::new(),
            positional: Vec::new(),
            positional_stack: Vec::new(),
            options: ShellOptions::default(),
            errexit_suppressed: 0,
            last_exit_status: 0,
            pipestatus: Vec::new(),
            last_bg_pid: 0,
            shell_pid: std::process::id(),
            shell_name: "oxsh".to_string(),
            command_number: 0,
            command_hash: HashMap::new(),
            cwd,
            current_line: 0,
            last_arg: String::new(),
            func_depth: 0,
            source_depth: 0,
            loop_depth: 0,
            traps: HashMap::new(),
            pending_signals: Arc::new(Mutex::new(Vec::new())),
            jobs: JobTable::default(),
            start_time: Instant::now(),
            stdin_buf: StdinBuf::default(),
        }
    }

    // -------------------------------------------------------------------------
    // Variable access
    // -------------------------------------------------------------------------

    /// Look up a scalar value; dynamic parameters are produced on the fly.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(v) = self.dynamic_value(name) {
            return Some(v);
        }
        self.vars.get(name).map(|v| v.as_scalar().to_string())
    }

    pub fn get_array(&self, name: &str) -> Option<Vec<String>> {
        match &self.vars.get(name)?.value {
            VarValue::Array(items) => Some(items.clone()),
            VarValue::Scalar(s) => Some(vec![s.clone()]),
        }
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.vars.contains_key(name) || self.dynamic_value(name).is_some()
    }

    /// Set a scalar variable, enforcing readonly and applying the PATH and
    /// allexport side effects.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<(), ExecError> {
        let value = value.into();
        if let Some(existing) = self.vars.get_mut(name) {
            if existing.readonly {
                return Err(readonly_error(name));
            }
            existing.value = VarValue::Scalar(value);
        } else {
            let mut var = Variable::scalar(value);
            var.exported = self.options.allexport;
            self.vars.insert(name.to_string(), var);
        }
        self.after_set(name);
        Ok(())
    }

    /// Append to a scalar (or to element 0 of an array).
    pub fn append(&mut self, name: &str, suffix: &str) -> Result<(), ExecError> {
        let current = self.get(name).unwrap_or_default();
        self.set(name, format!("{}{}", current, suffix))
    }

    pub fn set_exported(&mut self, name: &str, value: impl Into<String>) -> Result<(), ExecError> {
        self.set(name, value)?;
        if let Some(var) = self.vars.get_mut(name) {
            var.exported = true;
        }
        Ok(())
    }

    pub fn mark_exported(&mut self, name: &str) {
        if let Some(var) = self.vars.get_mut(name) {
            var.exported = true;
        } else {
            let mut var = Variable::scalar("");
            var.exported = true;
            self.vars.insert(name.to_string(), var);
        }
    }

    pub fn mark_readonly(&mut self, name: &str) {
        if let Some(var) = self.vars.get_mut(name) {
            var.readonly = true;
        } else {
            let mut var = Variable::scalar("");
            var.readonly = true;
            self.vars.insert(name.to_string(), var);
        }
    }

    pub fn set_array(&mut self, name: &str, values: Vec<String>) -> Result<(), ExecError> {
        if let Some(existing) = self.vars.get_mut(name) {
            if existing.readonly {
                return Err(readonly_error(name));
            }
            existing.value = VarValue::Array(values);
        } else {
            let mut var = Variable::scalar("");
            var.exported = self.options.allexport;
            var.value = VarValue::Array(values);
            self.vars.insert(name.to_string(), var);
        }
        self.after_set(name);
        Ok(())
    }

    /// Per-element write; the array auto-vivifies and grows with empty
    /// strings as needed.
    pub fn set_array_element(
        &mut self,
        name: &str,
        index: usize,
        value: String,
    ) -> Result<(), ExecError> {
        let var = self.vars.entry(name.to_string()).or_insert_with(|| {
            let mut v = Variable::scalar("");
            v.value = VarValue::Array(Vec::new());
            v
        });
        if var.readonly {
            return Err(readonly_error(name));
        }
        let items = match &mut var.value {
            VarValue::Array(items) => items,
            VarValue::Scalar(s) => {
                let seed = if s.is_empty() { Vec::new() } else { vec![s.clone()] };
                var.value = VarValue::Array(seed);
                match &mut var.value {
                    VarValue::Array(items) => items,
                    VarValue::Scalar(_) => unreachable!(),
                }
            }
        };
        if items.len() <= index {
            items.resize(index + 1, String::new());
        }
        items[index] = value;
        self.after_set(name);
        Ok(())
    }

    pub fn unset(&mut self, name: &str) -> Result<(), ExecError> {
        if let Some(var) = self.vars.get(name) {
            if var.readonly {
                return Err(readonly_error(name));
            }
        }
        self.vars.remove(name);
        if name == "PATH" {
            self.command_hash.clear();
        }
        Ok(())
    }

    fn after_set(&mut self, name: &str) {
        if name == "PATH" {
            self.command_hash.clear();
        }
    }

    /// The active IFS class; unset IFS means the default.
    pub fn ifs(&self) -> String {
        self.vars
            .get("IFS")
            .map(|v| v.as_scalar().to_string())
            .unwrap_or_else(|| DEFAULT_IFS.to_string())
    }

    /// Dynamic read-only parameters.
    fn dynamic_value(&self, name: &str) -> Option<String> {
        match name {
            "RANDOM" => Some((rand::random::<u32>() % 32768).to_string()),
            "SECONDS" => Some(self.start_time.elapsed().as_secs().to_string()),
            "EPOCHREALTIME" => {
                let now = chrono::Utc::now();
                Some(format!(
                    "{}.{:06}",
                    now.timestamp(),
                    now.timestamp_subsec_micros()
                ))
            }
            "LINENO" => Some(self.current_line.to_string()),
            "PIPESTATUS" => Some(
                self.pipestatus
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            "PPID" => Some(std::os::unix::process::parent_id().to_string()),
            "UID" => Some(unsafe { libc::getuid() }.to_string()),
            "EUID" => Some(unsafe { libc::geteuid() }.to_string()),
            "HOSTNAME" => Some(
                std::fs::read_to_string("/proc/sys/kernel/hostname")
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| "localhost".to_string()),
            ),
            "_" => Some(self.last_arg.clone()),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Scopes and positional parameters
    // -------------------------------------------------------------------------

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if let Some(frame) = self.scopes.pop() {
            for (name, saved) in frame {
                match saved {
                    Some(var) => {
                        self.vars.insert(name, var);
                    }
                    None => {
                        self.vars.remove(&name);
                    }
                }
            }
        }
    }

    /// Declare a function-local variable, saving the outer binding in the
    /// current scope frame.
    pub fn declare_local(&mut self, name: &str, value: Option<String>) -> Result<(), ExecError> {
        if let Some(frame) = self.scopes.last_mut() {
            frame
                .entry(name.to_string())
                .or_insert_with(|| self.vars.get(name).cloned());
        }
        match value {
            Some(v) => {
                // The local shadows the outer binding even if that one was
                // readonly; remove first so set() does not reject it.
                if self
                    .vars
                    .get(name)
                    .map(|var| var.readonly)
                    .unwrap_or(false)
                {
                    return Err(readonly_error(name));
                }
                self.set(name, v)
            }
            None => {
                self.vars.remove(name);
                Ok(())
            }
        }
    }

    pub fn push_positional(&mut self, params: Vec<String>) {
        self.positional_stack
            .push(std::mem::replace(&mut self.positional, params));
    }

    pub fn pop_positional(&mut self) {
        if let Some(params) = self.positional_stack.pop() {
            self.positional = params;
        }
    }

    pub fn positional_param(&self, n: usize) -> Option<&String> {
        if n == 0 {
            None
        } else {
            self.positional.get(n - 1)
        }
    }

    // -------------------------------------------------------------------------
    // Exported environment
    // -------------------------------------------------------------------------

    /// `KEY=VALUE` pairs for exported variables only, used before exec.
    pub fn build_exported_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .vars
            .iter()
            .filter(|(_, var)| var.exported)
            .map(|(name, var)| (name.clone(), var.as_scalar().to_string()))
            .collect();
        env.sort();
        env
    }

    /// Record the exit status and mirror it for `$?`.
    pub fn set_status(&mut self, status: i32) {
        self.last_exit_status = status;
    }
}

fn readonly_error(name: &str) -> ExecError {
    ExecError::expansion(format!("{}: readonly variable", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut state = ShellState::new();
        state.set("FOO", "bar").unwrap();
        assert_eq!(state.get("FOO"), Some("bar".to_string()));
        assert!(state.is_set("FOO"));
        assert!(!state.is_set("MISSING"));
    }

    #[test]
    fn readonly_rejected() {
        let mut state = ShellState::new();
        state.set("X", "1").unwrap();
        state.mark_readonly("X");
        assert!(state.set("X", "2").is_err());
        assert!(state.unset("X").is_err());
        assert_eq!(state.get("X"), Some("1".to_string()));
    }

    #[test]
    fn path_assignment_clears_hash() {
        let mut state = ShellState::new();
        state
            .command_hash
            .insert("ls".to_string(), PathBuf::from("/bin/ls"));
        state.set("PATH", "/usr/bin").unwrap();
        assert!(state.command_hash.is_empty());
    }

    #[test]
    fn ifs_default_and_override() {
        let mut state = ShellState::new();
        assert_eq!(state.ifs(), " \t\n");
        state.set("IFS", ":").unwrap();
        assert_eq!(state.ifs(), ":");
        state.unset("IFS").unwrap();
        assert_eq!(state.ifs(), " \t\n");
    }

    #[test]
    fn array_element_autovivifies() {
        let mut state = ShellState::new();
        state.set_array_element("a", 2, "x".to_string()).unwrap();
        assert_eq!(
            state.get_array("a"),
            Some(vec![String::new(), String::new(), "x".to_string()])
        );
    }

    #[test]
    fn scalar_promotes_to_array() {
        let mut state = ShellState::new();
        state.set("a", "first").unwrap();
        state.set_array_element("a", 1, "second".to_string()).unwrap();
        assert_eq!(
            state.get_array("a"),
            Some(vec!["first".to_string(), "second".to_string()])
        );
        // Scalar view is element zero
        assert_eq!(state.get("a"), Some("first".to_string()));
    }

    #[test]
    fn scope_restores_outer_binding() {
        let mut state = ShellState::new();
        state.set("X", "outer").unwrap();
        state.push_scope();
        state.declare_local("X", Some("inner".to_string())).unwrap();
        assert_eq!(state.get("X"), Some("inner".to_string()));
        state.pop_scope();
        assert_eq!(state.get("X"), Some("outer".to_string()));
    }

    #[test]
    fn scope_removes_fresh_local() {
        let mut state = ShellState::new();
        state.push_scope();
        state.declare_local("Y", Some("only-inner".to_string())).unwrap();
        state.pop_scope();
        assert!(!state.is_set("Y"));
    }

    #[test]
    fn positional_stack() {
        let mut state = ShellState::new();
        state.positional = vec!["a".to_string()];
        state.push_positional(vec!["b".to_string(), "c".to_string()]);
        assert_eq!(state.positional_param(1), Some(&"b".to_string()));
        assert_eq!(state.positional_param(2), Some(&"c".to_string()));
        state.pop_positional();
        assert_eq!(state.positional_param(1), Some(&"a".to_string()));
    }

    #[test]
    fn exported_env_only_exports() {
        let mut state = ShellState::new();
        state.set("A", "1").unwrap();
        state.set_exported("B", "2").unwrap();
        let env = state.build_exported_env();
        assert_eq!(env, vec![("B".to_string(), "2".to_string())]);
    }

    #[test]
    fn pipestatus_renders_joined() {
        let mut state = ShellState::new();
        state.pipestatus = vec![0, 1, 0];
        assert_eq!(state.get("PIPESTATUS"), Some("0 1 0".to_string()));
    }

    #[test]
    fn option_flag_string() {
        let mut opts = ShellOptions::default();
        opts.errexit = true;
        opts.xtrace = true;
        assert_eq!(opts.flag_string(), "ex");
    }
}
