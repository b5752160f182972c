//! The execution engine.
//!
//! Walks the AST: statements short-circuit through `&&`/`||`, pipelines
//! chain captured stdout into the next stage's stdin, compound commands
//! drive loops and conditionals, and `break`/`continue`/`return`/`exit`
//! unwind as [`ExecError`] values. Conditions and non-final and-or
//! operands bump the errexit suppression counter so `set -e` never fires
//! from inside them.

use std::future::Future;
use std::pin::Pin;

use crate::ast::types::*;
use crate::interpreter::errors::ExecError;
use crate::interpreter::state::{ExecResult, Output, ShellState};

/// Boxed future used at the recursion points of the walker.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Iteration guard for loops.
const MAX_LOOP_ITERATIONS: u64 = 100_000_000;

/// The AST executor. Stateless; all state lives in [`ShellState`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Engine;

impl Engine {
    pub fn new() -> Self {
        Engine
    }

    // =========================================================================
    // SCRIPT AND STATEMENT LISTS
    // =========================================================================

    /// Execute a complete program: top-level statements in order, `$?`
    /// updated after each, pending traps drained between them.
    pub fn execute_script<'a>(
        &'a self,
        state: &'a mut ShellState,
        script: &'a ScriptNode,
        out: &'a mut Output,
        stdin: &'a str,
    ) -> BoxFuture<'a, Result<i32, ExecError>> {
        Box::pin(async move {
            let mut status = state.last_exit_status;
            for statement in &script.statements {
                self.run_pending_traps(state, out).await;

                status = self.execute_statement(state, statement, out, stdin).await?;
                state.set_status(status);

                if status != 0 {
                    self.run_err_trap(state, out).await;
                }
            }
            Ok(status)
        })
    }

    /// Execute a statement list (loop bodies, group bodies). The list's
    /// status is the last statement's; an empty list is 0.
    pub fn execute_statements<'a>(
        &'a self,
        state: &'a mut ShellState,
        statements: &'a [StatementNode],
        out: &'a mut Output,
        stdin: &'a str,
    ) -> BoxFuture<'a, Result<i32, ExecError>> {
        Box::pin(async move {
            let mut status = 0;
            for statement in statements {
                status = self.execute_statement(state, statement, out, stdin).await?;
                state.set_status(status);
            }
            Ok(status)
        })
    }

    // =========================================================================
    // STATEMENTS (and-or lists)
    // =========================================================================

    pub async fn execute_statement(
        &self,
        state: &mut ShellState,
        stmt: &StatementNode,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        if state.options.noexec {
            return Ok(0);
        }
        if stmt.line > 0 {
            state.current_line = stmt.line;
        }

        if state.options.verbose {
            if let Some(source) = &stmt.source_text {
                out.push_stderr(source);
                out.push_stderr("\n");
            }
        }

        if stmt.background {
            return self.spawn_background(state, stmt, out);
        }

        let count = stmt.pipelines.len();
        let mut status = 0;
        let mut final_ran_unnegated = false;

        for (i, pipeline) in stmt.pipelines.iter().enumerate() {
            if i > 0 {
                match stmt.operators[i - 1] {
                    AndOrOperator::AndIf if status != 0 => continue,
                    AndOrOperator::OrIf if status == 0 => continue,
                    _ => {}
                }
            }

            let is_final = i == count - 1;
            if !is_final {
                state.errexit_suppressed += 1;
            }
            let result = self.execute_pipeline(state, pipeline, out, stdin).await;
            if !is_final {
                state.errexit_suppressed -= 1;
            }
            status = result?;
            state.set_status(status);
            final_ran_unnegated = is_final && !pipeline.negated;
        }

        if state.options.errexit
            && status != 0
            && final_ran_unnegated
            && state.errexit_suppressed == 0
        {
            return Err(ExecError::ErrExit(status));
        }

        Ok(status)
    }

    /// Detach an and-or list into a background job over a cloned state.
    fn spawn_background(
        &self,
        state: &mut ShellState,
        stmt: &StatementNode,
        _out: &mut Output,
    ) -> Result<i32, ExecError> {
        let mut job_state = state.clone();
        let mut job_stmt = stmt.clone();
        job_stmt.background = false;

        let command_text = stmt.source_text.clone().unwrap_or_default();
        let handle = tokio::spawn(async move {
            let engine = Engine::new();
            let mut job_out = Output::default();
            let code = match engine
                .execute_statement(&mut job_state, &job_stmt, &mut job_out, "")
                .await
            {
                Ok(status) => status,
                Err(ExecError::Exit(code))
                | Err(ExecError::Return(code))
                | Err(ExecError::ErrExit(code)) => code,
                Err(ExecError::Break(_)) | Err(ExecError::Continue(_)) => 0,
                Err(ExecError::Expansion { message, status }) => {
                    job_out.push_stderr(&format!("oxsh: {}\n", message));
                    status
                }
            };
            ExecResult::new(job_out.stdout, job_out.stderr, code)
        });

        let job = state.jobs.add(handle, command_text);
        state.last_bg_pid = job.pid;
        Ok(0)
    }

    // =========================================================================
    // PIPELINES
    // =========================================================================

    pub async fn execute_pipeline(
        &self,
        state: &mut ShellState,
        pipeline: &PipelineNode,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        let count = pipeline.commands.len();

        let mut status;
        if count == 1 {
            let suppress = pipeline.negated;
            if suppress {
                state.errexit_suppressed += 1;
            }
            let result = self
                .execute_command(state, &pipeline.commands[0], out, stdin)
                .await;
            if suppress {
                state.errexit_suppressed -= 1;
            }
            status = result?;
            state.pipestatus = vec![status];
        } else {
            // Each stage runs over a cloned state: mutations do not escape
            // a multi-command pipeline.
            let mut statuses = Vec::with_capacity(count);
            let mut data = stdin.to_string();
            let mut rightmost_failure = 0;

            for (i, command) in pipeline.commands.iter().enumerate() {
                let is_last = i == count - 1;
                let mut stage_state = state.clone();
                stage_state.stdin_buf =
                    crate::interpreter::state::StdinBuf::attached(data.clone());
                let mut stage_out = Output::default();

                let stage_status = match self
                    .execute_command(&mut stage_state, command, &mut stage_out, &data)
                    .await
                {
                    Ok(s) => s,
                    Err(ExecError::Exit(code))
                    | Err(ExecError::Return(code))
                    | Err(ExecError::ErrExit(code)) => code,
                    Err(ExecError::Break(_)) | Err(ExecError::Continue(_)) => 0,
                    Err(ExecError::Expansion { message, status }) => {
                        stage_out.push_stderr(&format!("oxsh: {}\n", message));
                        status
                    }
                };

                out.push_stderr(&stage_out.stderr);
                if is_last {
                    out.push_stdout(&stage_out.stdout);
                } else {
                    data = stage_out.stdout;
                }

                statuses.push(stage_status);
                if stage_status != 0 {
                    rightmost_failure = stage_status;
                }
            }

            status = *statuses.last().unwrap_or(&0);
            if state.options.pipefail && rightmost_failure != 0 {
                status = rightmost_failure;
            }
            state.pipestatus = statuses;
        }

        if pipeline.negated {
            status = if status == 0 { 1 } else { 0 };
        }
        Ok(status)
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    pub async fn execute_command(
        &self,
        state: &mut ShellState,
        command: &CommandNode,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        match command {
            CommandNode::Simple(simple) => self.execute_simple(state, simple, out, stdin).await,
            CommandNode::Compound(compound) => {
                self.execute_compound(state, compound, out, stdin).await
            }
            CommandNode::FunctionDef(def) => {
                state.functions.insert(def.name.clone(), def.clone());
                Ok(0)
            }
        }
    }

    // =========================================================================
    // COMPOUND COMMANDS
    // =========================================================================

    pub async fn execute_compound(
        &self,
        state: &mut ShellState,
        compound: &CompoundCommandNode,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        let redirections = compound.redirections();
        if redirections.is_empty() {
            return self.run_compound_body(state, compound, out, stdin).await;
        }

        // Redirection failure aborts this command with status 1, restoring
        // nothing because the plan never took effect.
        let plan = match self.prepare_redirections(state, redirections, out).await {
            Ok(plan) => plan,
            Err(ExecError::Expansion { message, .. }) => {
                out.push_stderr(&format!("oxsh: {}\n", message));
                return Ok(1);
            }
            Err(e) => return Err(e),
        };

        let effective_stdin = plan.stdin.clone().unwrap_or_else(|| stdin.to_string());
        let saved_stdin = match &plan.stdin {
            Some(content) => Some(std::mem::replace(
                &mut state.stdin_buf,
                crate::interpreter::state::StdinBuf::attached(content.clone()),
            )),
            None => None,
        };

        let mut local = Output::default();
        let result = self
            .run_compound_body(state, compound, &mut local, &effective_stdin)
            .await;

        if let Some(saved) = saved_stdin {
            state.stdin_buf = saved;
        }
        self.route_output(&plan, local, out);
        result
    }

    async fn run_compound_body(
        &self,
        state: &mut ShellState,
        compound: &CompoundCommandNode,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        match compound {
            CompoundCommandNode::If(n) => self.run_if(state, n, out, stdin).await,
            CompoundCommandNode::While(n) => {
                self.run_loop(state, &n.condition, &n.body, false, out, stdin).await
            }
            CompoundCommandNode::Until(n) => {
                self.run_loop(state, &n.condition, &n.body, true, out, stdin).await
            }
            CompoundCommandNode::For(n) => self.run_for(state, n, out, stdin).await,
            CompoundCommandNode::ArithFor(n) => self.run_arith_for(state, n, out, stdin).await,
            CompoundCommandNode::Case(n) => self.run_case(state, n, out, stdin).await,
            CompoundCommandNode::Subshell(n) => self.run_subshell(state, n, out, stdin).await,
            CompoundCommandNode::Group(n) => {
                self.execute_statements(state, &n.body, out, stdin).await
            }
            CompoundCommandNode::Arithmetic(n) => {
                match self.eval_arith_node(state, &n.expression, out).await {
                    Ok(value) => Ok(if value != 0 { 0 } else { 1 }),
                    Err(ExecError::Expansion { message, .. }) => {
                        out.push_stderr(&format!("oxsh: {}\n", message));
                        Ok(1)
                    }
                    Err(e) => Err(e),
                }
            }
            CompoundCommandNode::Conditional(n) => {
                match self.eval_cond(state, &n.expression, out).await {
                    Ok(true) => Ok(0),
                    Ok(false) => Ok(1),
                    Err(ExecError::Expansion { message, .. }) => {
                        out.push_stderr(&format!("oxsh: {}\n", message));
                        Ok(2)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn run_if(
        &self,
        state: &mut ShellState,
        node: &IfNode,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        for clause in &node.clauses {
            let cond = self.run_condition(state, &clause.condition, out, stdin).await?;
            if cond == 0 {
                return self.execute_statements(state, &clause.body, out, stdin).await;
            }
        }
        if let Some(else_body) = &node.else_body {
            return self.execute_statements(state, else_body, out, stdin).await;
        }
        Ok(0)
    }

    /// Run a condition list with errexit suppressed.
    async fn run_condition(
        &self,
        state: &mut ShellState,
        statements: &[StatementNode],
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        state.errexit_suppressed += 1;
        let result = self.execute_statements(state, statements, out, stdin).await;
        state.errexit_suppressed -= 1;
        result
    }

    /// Shared while/until driver; `until` negates the condition.
    async fn run_loop(
        &self,
        state: &mut ShellState,
        condition: &[StatementNode],
        body: &[StatementNode],
        until: bool,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        let mut status = 0;
        let mut iterations = 0u64;
        loop {
            iterations += 1;
            if iterations > MAX_LOOP_ITERATIONS {
                return Err(ExecError::expansion("loop iteration limit exceeded"));
            }

            let cond = self.run_condition(state, condition, out, stdin).await?;
            let proceed = if until { cond != 0 } else { cond == 0 };
            if !proceed {
                break;
            }

            match self.run_loop_body(state, body, out, stdin).await {
                LoopStep::Done(s) => status = s,
                LoopStep::Break(s) => {
                    status = s;
                    break;
                }
                LoopStep::Err(e) => return Err(e),
            }
        }
        Ok(status)
    }

    async fn run_for(
        &self,
        state: &mut ShellState,
        node: &ForNode,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        let items = match &node.words {
            Some(words) => {
                let mut fields = Vec::new();
                for word in words {
                    fields.extend(self.expand_word_fields(state, word, out).await?);
                }
                fields
            }
            None => state.positional.clone(),
        };

        let mut status = 0;
        for item in items {
            state.set(&node.variable, item)?;
            match self.run_loop_body(state, &node.body, out, stdin).await {
                LoopStep::Done(s) => status = s,
                LoopStep::Break(s) => {
                    status = s;
                    break;
                }
                LoopStep::Err(e) => return Err(e),
            }
        }
        Ok(status)
    }

    async fn run_arith_for(
        &self,
        state: &mut ShellState,
        node: &ArithForNode,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        if let Some(init) = &node.init {
            self.eval_arith_node(state, init, out).await?;
        }

        let mut status = 0;
        let mut iterations = 0u64;
        loop {
            iterations += 1;
            if iterations > MAX_LOOP_ITERATIONS {
                return Err(ExecError::expansion("loop iteration limit exceeded"));
            }

            if let Some(cond) = &node.condition {
                if self.eval_arith_node(state, cond, out).await? == 0 {
                    break;
                }
            }

            match self.run_loop_body(state, &node.body, out, stdin).await {
                LoopStep::Done(s) => status = s,
                LoopStep::Break(s) => {
                    status = s;
                    break;
                }
                LoopStep::Err(e) => return Err(e),
            }

            if let Some(step) = &node.step {
                self.eval_arith_node(state, step, out).await?;
            }
        }
        Ok(status)
    }

    /// Execute one loop body pass, consuming one level of break/continue.
    async fn run_loop_body(
        &self,
        state: &mut ShellState,
        body: &[StatementNode],
        out: &mut Output,
        stdin: &str,
    ) -> LoopStep {
        state.loop_depth += 1;
        let result = self.execute_statements(state, body, out, stdin).await;
        state.loop_depth -= 1;

        match result {
            Ok(status) => LoopStep::Done(status),
            Err(ExecError::Break(n)) => {
                if n > 1 {
                    LoopStep::Err(ExecError::Break(n - 1))
                } else {
                    LoopStep::Break(state.last_exit_status)
                }
            }
            Err(ExecError::Continue(n)) => {
                if n > 1 {
                    // Residual levels exit this loop for the next outer one
                    LoopStep::Err(ExecError::Continue(n - 1))
                } else {
                    LoopStep::Done(state.last_exit_status)
                }
            }
            Err(e) => LoopStep::Err(e),
        }
    }

    async fn run_case(
        &self,
        state: &mut ShellState,
        node: &CaseNode,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        let subject = self.expand_word_single(state, &node.word, out).await?;
        let ci = state.options.nocasematch;

        let mut status = 0;
        let mut fall_through = false;

        for (idx, item) in node.items.iter().enumerate() {
            let mut matched = fall_through;
            if !matched {
                for pattern in &item.patterns {
                    let pat = self.expand_word_pattern(state, pattern, out).await?;
                    if crate::interpreter::expansion::fnmatch(&pat, &subject, ci) {
                        matched = true;
                        break;
                    }
                }
            }
            if !matched {
                continue;
            }

            status = self.execute_statements(state, &item.body, out, stdin).await?;

            match item.terminator {
                CaseTerminator::Break => return Ok(status),
                CaseTerminator::FallThrough => {
                    fall_through = true;
                    if idx == node.items.len() - 1 {
                        return Ok(status);
                    }
                }
                CaseTerminator::Continue => {
                    fall_through = false;
                }
            }
        }
        Ok(status)
    }

    /// Subshell: a cloned state; mutations and control flow stay inside.
    async fn run_subshell(
        &self,
        state: &mut ShellState,
        node: &SubshellNode,
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        let mut sub_state = state.clone();
        sub_state.errexit_suppressed = 0;

        let status = match self
            .execute_statements(&mut sub_state, &node.body, out, stdin)
            .await
        {
            Ok(status) => status,
            Err(ExecError::Exit(code))
            | Err(ExecError::Return(code))
            | Err(ExecError::ErrExit(code)) => code,
            Err(ExecError::Break(_)) | Err(ExecError::Continue(_)) => sub_state.last_exit_status,
            Err(ExecError::Expansion { message, status }) => {
                out.push_stderr(&format!("oxsh: {}\n", message));
                status
            }
        };
        // $! escapes the subshell so `( cmd & ); wait` can see it; nothing
        // else does.
        state.last_bg_pid = sub_state.last_bg_pid;
        Ok(status)
    }

    /// Evaluate an arithmetic node, wrapping evaluator errors.
    pub async fn eval_arith_node(
        &self,
        state: &mut ShellState,
        node: &ArithmeticExpressionNode,
        out: &mut Output,
    ) -> Result<i64, ExecError> {
        self.eval_arith(state, &node.expression, out, 0).await
    }
}

/// Outcome of one loop body pass.
enum LoopStep {
    Done(i32),
    Break(i32),
    Err(ExecError),
}
