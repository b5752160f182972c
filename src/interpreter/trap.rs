//! Trap handling.
//!
//! `trap 'action' NAME` stores actions keyed by condition name. Real
//! signals are observed by listener tasks that only push the signal number
//! into the shared pending queue; the executor drains the queue between
//! top-level commands and runs the actions synchronously by re-entering
//! the parser and executor. `ERR` fires after a failing and-or list and
//! `EXIT` once at shell termination.

use crate::interpreter::engine::Engine;
use crate::interpreter::errors::ExecError;
use crate::interpreter::state::{Output, ShellState};

/// Signals a trap can name, with their conventional numbers.
pub fn signal_table() -> &'static [(i32, &'static str)] {
    &[
        (1, "HUP"),
        (2, "INT"),
        (3, "QUIT"),
        (6, "ABRT"),
        (10, "USR1"),
        (12, "USR2"),
        (13, "PIPE"),
        (14, "ALRM"),
        (15, "TERM"),
        (17, "CHLD"),
        (18, "CONT"),
        (21, "TTIN"),
        (22, "TTOU"),
        (28, "WINCH"),
    ]
}

pub fn signal_number(name: &str) -> Option<i32> {
    let upper = name.to_uppercase();
    let stripped = upper.strip_prefix("SIG").unwrap_or(&upper);
    signal_table()
        .iter()
        .find(|(_, n)| *n == stripped)
        .map(|(num, _)| *num)
}

pub fn signal_name(number: i32) -> Option<&'static str> {
    signal_table()
        .iter()
        .find(|(num, _)| *num == number)
        .map(|(_, n)| *n)
}

/// Normalize a trap condition: numbers and SIG-prefixed names map to the
/// canonical name; EXIT, ERR, and 0 are pseudo-conditions.
pub fn normalize_condition(cond: &str) -> Option<String> {
    let upper = cond.to_uppercase();
    match upper.as_str() {
        "EXIT" | "0" => return Some("EXIT".to_string()),
        "ERR" => return Some("ERR".to_string()),
        _ => {}
    }
    if let Ok(num) = cond.parse::<i32>() {
        return signal_name(num).map(|n| n.to_string());
    }
    let stripped = upper.strip_prefix("SIG").unwrap_or(&upper).to_string();
    signal_table()
        .iter()
        .any(|(_, n)| *n == stripped)
        .then_some(stripped)
}

/// Install a listener task that forwards a real signal into the pending
/// queue. EXIT and ERR have no listener; outside a runtime (unit tests)
/// this is a no-op.
pub fn install_listener(state: &ShellState, name: &str) {
    let Some(number) = signal_number(name) else {
        return;
    };
    if tokio::runtime::Handle::try_current().is_err() {
        return;
    }

    let pending = state.pending_signals.clone();
    let kind = tokio::signal::unix::SignalKind::from_raw(number);
    tokio::spawn(async move {
        let Ok(mut stream) = tokio::signal::unix::signal(kind) else {
            return;
        };
        while stream.recv().await.is_some() {
            if let Ok(mut queue) = pending.lock() {
                queue.push(number);
            }
        }
    });
}

impl Engine {
    /// Drain pending signals and run their trap actions. Runs between
    /// top-level commands, never in the middle of a simple command.
    pub async fn run_pending_traps(&self, state: &mut ShellState, out: &mut Output) {
        let drained: Vec<i32> = match state.pending_signals.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(_) => return,
        };

        for number in drained {
            let Some(name) = signal_name(number) else {
                continue;
            };
            let Some(action) = state.traps.get(name).cloned() else {
                continue;
            };
            if action.is_empty() {
                // Ignored signal
                continue;
            }
            self.run_trap_action(state, &action, out).await;
        }
    }

    /// Run the ERR trap once after a failing and-or list.
    pub async fn run_err_trap(&self, state: &mut ShellState, out: &mut Output) {
        let Some(action) = state.traps.get("ERR").cloned() else {
            return;
        };
        if action.is_empty() || state.errexit_suppressed > 0 {
            return;
        }
        // The action must not retrigger itself
        state.traps.remove("ERR");
        self.run_trap_action(state, &action, out).await;
        state.traps.entry("ERR".to_string()).or_insert(action);
    }

    /// Run the EXIT trap; called once at shell termination.
    pub async fn run_exit_trap(&self, state: &mut ShellState, out: &mut Output) {
        let Some(action) = state.traps.remove("EXIT") else {
            return;
        };
        if action.is_empty() {
            return;
        }
        self.run_trap_action(state, &action, out).await;
    }

    /// Trap bodies re-enter the full parse/execute pipeline; `$?` is
    /// preserved around the action.
    async fn run_trap_action(&self, state: &mut ShellState, action: &str, out: &mut Output) {
        let script = match crate::parser::parse(action) {
            Ok(script) => script,
            Err(e) => {
                out.push_stderr(&format!("oxsh: trap: {}\n", e));
                return;
            }
        };
        let saved_status = state.last_exit_status;
        match self.execute_script(state, &script, out, "").await {
            Ok(_) | Err(ExecError::Break(_)) | Err(ExecError::Continue(_)) => {}
            Err(ExecError::Return(_)) => {}
            Err(ExecError::Exit(_)) | Err(ExecError::ErrExit(_)) => {}
            Err(ExecError::Expansion { message, .. }) => {
                out.push_stderr(&format!("oxsh: {}\n", message));
            }
        }
        state.set_status(saved_status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_normalization() {
        assert_eq!(normalize_condition("INT"), Some("INT".to_string()));
        assert_eq!(normalize_condition("sigterm"), Some("TERM".to_string()));
        assert_eq!(normalize_condition("2"), Some("INT".to_string()));
        assert_eq!(normalize_condition("0"), Some("EXIT".to_string()));
        assert_eq!(normalize_condition("EXIT"), Some("EXIT".to_string()));
        assert_eq!(normalize_condition("ERR"), Some("ERR".to_string()));
        assert_eq!(normalize_condition("NOPE"), None);
    }

    #[test]
    fn signal_lookups() {
        assert_eq!(signal_number("TERM"), Some(15));
        assert_eq!(signal_number("SIGINT"), Some(2));
        assert_eq!(signal_name(1), Some("HUP"));
        assert_eq!(signal_name(99), None);
    }

    #[tokio::test]
    async fn pending_trap_runs_action() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        let mut out = Output::default();
        state
            .traps
            .insert("TERM".to_string(), "echo trapped".to_string());
        state.pending_signals.lock().unwrap().push(15);

        engine.run_pending_traps(&mut state, &mut out).await;
        assert_eq!(out.stdout, "trapped\n");
        assert!(state.pending_signals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exit_trap_runs_once() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        let mut out = Output::default();
        state
            .traps
            .insert("EXIT".to_string(), "echo bye".to_string());

        engine.run_exit_trap(&mut state, &mut out).await;
        engine.run_exit_trap(&mut state, &mut out).await;
        assert_eq!(out.stdout, "bye\n");
    }

    #[tokio::test]
    async fn trap_action_preserves_status() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        let mut out = Output::default();
        state.set_status(42);
        state
            .traps
            .insert("TERM".to_string(), "true".to_string());
        state.pending_signals.lock().unwrap().push(15);
        engine.run_pending_traps(&mut state, &mut out).await;
        assert_eq!(state.last_exit_status, 42);
    }
}
