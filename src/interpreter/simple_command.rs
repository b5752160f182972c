//! Simple command evaluation and dispatch.
//!
//! After expansion resolves the words to a command name plus arguments,
//! dispatch goes: special builtins (assignments persist), functions,
//! regular builtins (assignments scoped to the call), then external
//! commands (assignments exported to the child only).

use crate::ast::types::{AssignmentNode, SimpleCommandNode};
use crate::interpreter::builtins;
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::ExecError;
use crate::interpreter::expansion::prompt::expand_prompt;
use crate::interpreter::state::{Output, ShellState};

impl Engine {
    pub async fn execute_simple(
        &self,
        state: &mut ShellState,
        cmd: &SimpleCommandNode,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        if cmd.line > 0 {
            state.current_line = cmd.line;
        }
        state.command_number += 1;

        // Expand the command name and arguments. The name may expand to
        // several fields; the first is the command.
        let mut words = Vec::new();
        if let Some(name) = &cmd.name {
            words.extend(self.expand_word_fields(state, name, out).await?);
        }
        for arg in &cmd.args {
            words.extend(self.expand_word_fields(state, arg, out).await?);
        }

        // Alias expansion at the command position
        let first = words.first().cloned();
        if let Some(first) = first {
            if let Some(replacement) = self.expand_alias(state, &first) {
                words.splice(0..1, replacement);
            }
        }

        if state.options.xtrace && (!words.is_empty() || !cmd.assignments.is_empty()) {
            let ps4 = state.get("PS4").unwrap_or_else(|| "+ ".to_string());
            let prefix = expand_prompt(state, &ps4);
            let mut line = String::new();
            for assign in &cmd.assignments {
                line.push_str(&assign.name);
                line.push('=');
                line.push(' ');
            }
            line.push_str(&words.join(" "));
            out.push_stderr(&format!("{}{}\n", prefix, line.trim_end()));
        }

        // Redirection failures abort just this command with status 1.
        let plan = match self.prepare_redirections(state, &cmd.redirections, out).await {
            Ok(plan) => plan,
            Err(ExecError::Expansion { message, .. }) => {
                out.push_stderr(&format!("oxsh: {}\n", message));
                return Ok(1);
            }
            Err(e) => return Err(e),
        };
        let effective_stdin = match &plan.stdin {
            Some(content) => content.clone(),
            None if state.stdin_buf.attached => state.stdin_buf.rest().to_string(),
            None => stdin.to_string(),
        };

        // Assignment-only command: assignments persist in this shell. The
        // status is that of the last command substitution, else 0.
        if words.is_empty() {
            let has_substitution = cmd
                .assignments
                .iter()
                .filter_map(|a| a.value.as_ref())
                .any(word_has_substitution);
            for assign in &cmd.assignments {
                self.apply_assignment(state, assign, out).await?;
            }
            return Ok(if has_substitution {
                state.last_exit_status
            } else {
                0
            });
        }

        let name = words[0].clone();
        let args: Vec<String> = words[1..].to_vec();
        state.last_arg = args.last().cloned().unwrap_or_else(|| name.clone());

        // A redirected stdin replaces the inherited buffer for this one
        // command.
        let saved_stdin = match &plan.stdin {
            Some(content) => Some(std::mem::replace(
                &mut state.stdin_buf,
                crate::interpreter::state::StdinBuf::attached(content.clone()),
            )),
            None => None,
        };

        let mut local = Output::default();
        let result = self
            .dispatch(state, cmd, &name, &args, &mut local, &effective_stdin)
            .await;

        if let Some(saved) = saved_stdin {
            state.stdin_buf = saved;
        }
        self.route_output(&plan, local, out);
        result
    }

    async fn dispatch(
        &self,
        state: &mut ShellState,
        cmd: &SimpleCommandNode,
        name: &str,
        args: &[String],
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        // 1. Special builtins: assignments persist, and a failure aborts a
        //    non-interactive shell.
        if builtins::is_special_builtin(name) {
            for assign in &cmd.assignments {
                self.apply_assignment(state, assign, out).await?;
            }
            let status = self.run_builtin(state, name, args, out, stdin).await?;
            if status != 0 && !state.options.interactive && state.options.posix {
                return Err(ExecError::Exit(status));
            }
            return Ok(status);
        }

        // 2. Functions
        if let Some(def) = state.functions.get(name).cloned() {
            state.push_scope();
            for assign in &cmd.assignments {
                self.apply_temp_assignment(state, assign, out).await?;
            }
            let result = self.call_function(state, &def, args, out, stdin).await;
            state.pop_scope();
            return result;
        }

        // 3. Regular builtins: temporary assignments scoped to the call.
        if builtins::is_builtin(name) {
            if cmd.assignments.is_empty() {
                return self.run_builtin(state, name, args, out, stdin).await;
            }
            state.push_scope();
            for assign in &cmd.assignments {
                self.apply_temp_assignment(state, assign, out).await?;
            }
            let result = self.run_builtin(state, name, args, out, stdin).await;
            state.pop_scope();
            return result;
        }

        // 4. External command: assignments go to the child environment.
        // A missing command falls through to the not-found handler function
        // when one is installed.
        if !name.contains('/') && self.resolve_command(state, name).is_none() {
            if let Some(handler) = state.functions.get("command_not_found_handle").cloned() {
                let mut handler_args = vec![name.to_string()];
                handler_args.extend(args.iter().cloned());
                return self.call_function(state, &handler, &handler_args, out, stdin).await;
            }
        }

        let mut env_overrides = Vec::new();
        for assign in &cmd.assignments {
            let value = self.assignment_value(state, assign, out).await?;
            env_overrides.push((assign.name.clone(), value));
        }
        let status = self
            .run_external(state, name, args, &env_overrides, stdin, out)
            .await?;
        // The child read the pipe to EOF
        state.stdin_buf.consume_all();
        Ok(status)
    }

    /// Expand an alias at the command position, guarding against cycles.
    fn expand_alias(&self, state: &ShellState, name: &str) -> Option<Vec<String>> {
        let mut seen = vec![name.to_string()];
        let mut result: Vec<String> = vec![name.to_string()];

        loop {
            let head = result.first()?.clone();
            let value = state.aliases.get(&head)?;
            // Naive word split of the alias body; alias values are simple
            // word lists in practice.
            let replacement: Vec<String> =
                value.split_whitespace().map(|s| s.to_string()).collect();
            if replacement.is_empty() {
                result.remove(0);
                return Some(result);
            }
            result.splice(0..1, replacement.clone());
            let new_head = &result[0];
            if seen.iter().any(|s| s == new_head) {
                return Some(result);
            }
            seen.push(new_head.clone());
            if !state.aliases.contains_key(new_head) {
                return Some(result);
            }
        }
    }

    /// Apply an assignment permanently.
    pub(crate) async fn apply_assignment(
        &self,
        state: &mut ShellState,
        assign: &AssignmentNode,
        out: &mut Output,
    ) -> Result<(), ExecError> {
        if let Some(elements) = &assign.array {
            let mut values = Vec::new();
            for word in elements {
                values.extend(self.expand_word_fields(state, word, out).await?);
            }
            if assign.append {
                let mut existing = state.get_array(&assign.name).unwrap_or_default();
                existing.extend(values);
                state.set_array(&assign.name, existing)?;
            } else {
                state.set_array(&assign.name, values)?;
            }
            return Ok(());
        }

        let value = match &assign.value {
            Some(word) => self.expand_word_single(state, word, out).await?,
            None => String::new(),
        };

        if let Some(index_text) = &assign.index {
            let index = self.eval_arith_text(state, index_text, out).await?;
            if index < 0 {
                return Err(ExecError::expansion(format!(
                    "{}[{}]: bad array subscript",
                    assign.name, index_text
                )));
            }
            let final_value = if assign.append {
                let existing = state
                    .get_array(&assign.name)
                    .and_then(|items| items.get(index as usize).cloned())
                    .unwrap_or_default();
                format!("{}{}", existing, value)
            } else {
                value
            };
            state.set_array_element(&assign.name, index as usize, final_value)?;
            return Ok(());
        }

        if assign.append {
            state.append(&assign.name, &value)?;
        } else {
            state.set(&assign.name, value)?;
        }
        Ok(())
    }

    /// Apply a temporary assignment inside a fresh scope frame: the outer
    /// binding is saved and the temporary value marked exported.
    async fn apply_temp_assignment(
        &self,
        state: &mut ShellState,
        assign: &AssignmentNode,
        out: &mut Output,
    ) -> Result<(), ExecError> {
        let value = self.assignment_value(state, assign, out).await?;
        state.declare_local(&assign.name, Some(value))?;
        state.mark_exported(&assign.name);
        Ok(())
    }

    async fn assignment_value(
        &self,
        state: &mut ShellState,
        assign: &AssignmentNode,
        out: &mut Output,
    ) -> Result<String, ExecError> {
        match &assign.value {
            Some(word) => self.expand_word_single(state, word, out).await,
            None => Ok(String::new()),
        }
    }
}

fn word_has_substitution(word: &crate::ast::types::WordNode) -> bool {
    fn parts_have(parts: &[crate::ast::types::WordPart]) -> bool {
        use crate::ast::types::WordPart;
        parts.iter().any(|p| match p {
            WordPart::CommandSubstitution { .. } => true,
            WordPart::DoubleQuoted(inner) => parts_have(inner),
            _ => false,
        })
    }
    parts_have(&word.parts)
}
