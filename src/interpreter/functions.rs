//! Shell function invocation.

use crate::ast::types::FunctionDefNode;
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::ExecError;
use crate::interpreter::state::{Output, ShellState};

/// Guard against runaway recursion.
const MAX_FUNCTION_DEPTH: u32 = 1000;

impl Engine {
    /// Call a function: push a scope and a positional frame, run the body,
    /// and consume `return` at this boundary.
    pub async fn call_function(
        &self,
        state: &mut ShellState,
        def: &FunctionDefNode,
        args: &[String],
        out: &mut Output,
        stdin: &str,
    ) -> Result<i32, ExecError> {
        if state.func_depth >= MAX_FUNCTION_DEPTH {
            out.push_stderr("oxsh: maximum function nesting level exceeded\n");
            return Err(ExecError::Exit(1));
        }

        state.func_depth += 1;
        state.push_scope();
        state.push_positional(args.to_vec());

        let result = self.execute_compound(state, &def.body, out, stdin).await;

        state.pop_positional();
        state.pop_scope();
        state.func_depth -= 1;

        match result {
            Err(ExecError::Return(code)) => Ok(code),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    async fn run(script: &str) -> (ShellState, Output, i32) {
        let engine = Engine::new();
        let mut state = ShellState::new();
        let mut out = Output::default();
        let ast = parse(script).unwrap();
        let status = engine
            .execute_script(&mut state, &ast, &mut out, "")
            .await
            .unwrap();
        (state, out, status)
    }

    #[tokio::test]
    async fn function_defines_and_calls() {
        let (_, out, status) = run("greet() { echo hi; }; greet").await;
        assert_eq!(out.stdout, "hi\n");
        assert_eq!(status, 0);
    }

    #[tokio::test]
    async fn function_arguments_are_positional() {
        let (_, out, _) = run("show() { echo $1:$2; }; show a b").await;
        assert_eq!(out.stdout, "a:b\n");
    }

    #[tokio::test]
    async fn outer_positionals_restored() {
        let (_, out, _) = run("set -- x y; f() { echo in=$1; }; f inner; echo out=$1").await;
        assert_eq!(out.stdout, "in=inner\nout=x\n");
    }

    #[tokio::test]
    async fn return_sets_status() {
        let (_, _, status) = run("f() { return 7; echo unreachable; }; f").await;
        assert_eq!(status, 7);
    }

    #[tokio::test]
    async fn return_stops_at_boundary() {
        let (_, out, status) = run("f() { return 3; }; f; echo after=$?").await;
        assert_eq!(out.stdout, "after=3\n");
        assert_eq!(status, 0);
    }
}
