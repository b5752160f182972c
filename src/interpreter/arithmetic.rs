//! The arithmetic evaluator.
//!
//! 64-bit two's-complement with wrapping `+ - *`, truncated division and
//! modulo that trap on a zero divisor, short-circuit `&&`/`||`/`?:` whose
//! untaken side runs no side effects, and lvalue assignment to variables
//! and array elements. Non-numeric variable content re-enters the
//! evaluator recursively; empty or unresolvable variables count as 0.

use crate::ast::types::{ArithAssignOp, ArithBinaryOp, ArithExpr, ArithUnaryOp, IncDecOp};
use crate::interpreter::engine::{BoxFuture, Engine};
use crate::interpreter::errors::ExecError;
use crate::interpreter::state::{Output, ShellState};

/// Cap for self-referential variable chains.
const MAX_ARITH_RECURSION: u32 = 128;

impl Engine {
    pub fn eval_arith<'a>(
        &'a self,
        state: &'a mut ShellState,
        expr: &'a ArithExpr,
        out: &'a mut Output,
        depth: u32,
    ) -> BoxFuture<'a, Result<i64, ExecError>> {
        Box::pin(async move {
            if depth > MAX_ARITH_RECURSION {
                return Err(ExecError::expansion(
                    "expression recursion level exceeded",
                ));
            }

            match expr {
                ArithExpr::Number(n) => Ok(*n),
                ArithExpr::Group(inner) => self.eval_arith(state, inner, out, depth).await,
                ArithExpr::Variable { name, index } => {
                    self.arith_variable(state, name, index.as_deref(), out, depth)
                        .await
                }
                ArithExpr::Special(s) => Ok(self.arith_special(state, s)),
                ArithExpr::CommandSubst(script) => {
                    let text = self.run_substitution(state, script, out).await?;
                    self.arith_from_text(state, text.trim(), out, depth + 1).await
                }
                ArithExpr::Unary { op, operand } => {
                    let v = self.eval_arith(state, operand, out, depth).await?;
                    Ok(match op {
                        ArithUnaryOp::Neg => v.wrapping_neg(),
                        ArithUnaryOp::Pos => v,
                        ArithUnaryOp::Not => i64::from(v == 0),
                        ArithUnaryOp::BitNot => !v,
                    })
                }
                ArithExpr::IncDec {
                    op,
                    prefix,
                    name,
                    index,
                } => {
                    let idx = match index {
                        Some(e) => Some(self.eval_arith(state, e, out, depth).await?),
                        None => None,
                    };
                    let old = self
                        .arith_read_lvalue(state, name, idx, out, depth)
                        .await?;
                    let new = match op {
                        IncDecOp::Inc => old.wrapping_add(1),
                        IncDecOp::Dec => old.wrapping_sub(1),
                    };
                    self.arith_write_lvalue(state, name, idx, new)?;
                    Ok(if *prefix { new } else { old })
                }
                ArithExpr::Binary { op, left, right } => {
                    self.arith_binary(state, *op, left, right, out, depth).await
                }
                ArithExpr::Ternary {
                    condition,
                    consequent,
                    alternate,
                } => {
                    let c = self.eval_arith(state, condition, out, depth).await?;
                    if c != 0 {
                        self.eval_arith(state, consequent, out, depth).await
                    } else {
                        self.eval_arith(state, alternate, out, depth).await
                    }
                }
                ArithExpr::Assignment {
                    op,
                    name,
                    index,
                    value,
                } => {
                    let idx = match index {
                        Some(e) => Some(self.eval_arith(state, e, out, depth).await?),
                        None => None,
                    };
                    let rhs = self.eval_arith(state, value, out, depth).await?;
                    let result = if *op == ArithAssignOp::Assign {
                        rhs
                    } else {
                        let current = self
                            .arith_read_lvalue(state, name, idx, out, depth)
                            .await?;
                        apply_compound(*op, current, rhs)?
                    };
                    self.arith_write_lvalue(state, name, idx, result)?;
                    Ok(result)
                }
            }
        })
    }

    async fn arith_binary(
        &self,
        state: &mut ShellState,
        op: ArithBinaryOp,
        left: &ArithExpr,
        right: &ArithExpr,
        out: &mut Output,
        depth: u32,
    ) -> Result<i64, ExecError> {
        // Short-circuit forms evaluate only the taken side.
        match op {
            ArithBinaryOp::LogAnd => {
                let l = self.eval_arith(state, left, out, depth).await?;
                if l == 0 {
                    return Ok(0);
                }
                let r = self.eval_arith(state, right, out, depth).await?;
                return Ok(i64::from(r != 0));
            }
            ArithBinaryOp::LogOr => {
                let l = self.eval_arith(state, left, out, depth).await?;
                if l != 0 {
                    return Ok(1);
                }
                let r = self.eval_arith(state, right, out, depth).await?;
                return Ok(i64::from(r != 0));
            }
            ArithBinaryOp::Comma => {
                self.eval_arith(state, left, out, depth).await?;
                return self.eval_arith(state, right, out, depth).await;
            }
            _ => {}
        }

        let l = self.eval_arith(state, left, out, depth).await?;
        let r = self.eval_arith(state, right, out, depth).await?;
        match op {
            ArithBinaryOp::Add => Ok(l.wrapping_add(r)),
            ArithBinaryOp::Sub => Ok(l.wrapping_sub(r)),
            ArithBinaryOp::Mul => Ok(l.wrapping_mul(r)),
            ArithBinaryOp::Div => {
                if r == 0 {
                    Err(ExecError::expansion("division by 0"))
                } else {
                    Ok(l.wrapping_div(r))
                }
            }
            ArithBinaryOp::Mod => {
                if r == 0 {
                    Err(ExecError::expansion("division by 0"))
                } else {
                    Ok(l.wrapping_rem(r))
                }
            }
            ArithBinaryOp::Pow => {
                if r < 0 {
                    Err(ExecError::expansion("exponent less than 0"))
                } else {
                    Ok(l.wrapping_pow(r.min(u32::MAX as i64) as u32))
                }
            }
            ArithBinaryOp::LShift => Ok(l.wrapping_shl(r as u32)),
            ArithBinaryOp::RShift => Ok(l.wrapping_shr(r as u32)),
            ArithBinaryOp::Lt => Ok(i64::from(l < r)),
            ArithBinaryOp::Le => Ok(i64::from(l <= r)),
            ArithBinaryOp::Gt => Ok(i64::from(l > r)),
            ArithBinaryOp::Ge => Ok(i64::from(l >= r)),
            ArithBinaryOp::Eq => Ok(i64::from(l == r)),
            ArithBinaryOp::Ne => Ok(i64::from(l != r)),
            ArithBinaryOp::BitAnd => Ok(l & r),
            ArithBinaryOp::BitOr => Ok(l | r),
            ArithBinaryOp::BitXor => Ok(l ^ r),
            ArithBinaryOp::LogAnd | ArithBinaryOp::LogOr | ArithBinaryOp::Comma => {
                unreachable!("handled above")
            }
        }
    }

    async fn arith_variable(
        &self,
        state: &mut ShellState,
        name: &str,
        index: Option<&ArithExpr>,
        out: &mut Output,
        depth: u32,
    ) -> Result<i64, ExecError> {
        let idx = match index {
            Some(e) => Some(self.eval_arith(state, e, out, depth).await?),
            None => None,
        };
        self.arith_read_lvalue(state, name, idx, out, depth).await
    }

    async fn arith_read_lvalue(
        &self,
        state: &mut ShellState,
        name: &str,
        index: Option<i64>,
        out: &mut Output,
        depth: u32,
    ) -> Result<i64, ExecError> {
        let raw = match index {
            Some(i) => state
                .get_array(name)
                .and_then(|items| items.get(i.max(0) as usize).cloned()),
            None => state.get(name),
        };
        match raw {
            None => Ok(0),
            Some(text) => self.arith_from_text(state, text.trim(), out, depth + 1).await,
        }
    }

    /// Interpret variable content: a plain integer directly, anything else
    /// as a nested arithmetic expression; empty is 0.
    async fn arith_from_text(
        &self,
        state: &mut ShellState,
        text: &str,
        out: &mut Output,
        depth: u32,
    ) -> Result<i64, ExecError> {
        if text.is_empty() {
            return Ok(0);
        }
        if let Ok(v) = text.parse::<i64>() {
            return Ok(v);
        }
        let node = match crate::parser::arithmetic_parser::parse_arithmetic(text) {
            Ok(node) => node,
            // Unresolvable content counts as 0
            Err(_) => return Ok(0),
        };
        self.eval_arith(state, &node.expression, out, depth).await
    }

    fn arith_write_lvalue(
        &self,
        state: &mut ShellState,
        name: &str,
        index: Option<i64>,
        value: i64,
    ) -> Result<(), ExecError> {
        match index {
            Some(i) => {
                if i < 0 {
                    return Err(ExecError::expansion(format!(
                        "{}: bad array subscript",
                        name
                    )));
                }
                state.set_array_element(name, i as usize, value.to_string())
            }
            None => state.set(name, value.to_string()),
        }
    }

    fn arith_special(&self, state: &ShellState, name: &str) -> i64 {
        match name {
            "?" => state.last_exit_status as i64,
            "$" => state.shell_pid as i64,
            "#" => state.positional.len() as i64,
            "!" => state.last_bg_pid as i64,
            digit => digit
                .parse::<usize>()
                .ok()
                .and_then(|n| state.positional_param(n))
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0),
        }
    }
}

fn apply_compound(op: ArithAssignOp, current: i64, rhs: i64) -> Result<i64, ExecError> {
    Ok(match op {
        ArithAssignOp::Assign => rhs,
        ArithAssignOp::Add => current.wrapping_add(rhs),
        ArithAssignOp::Sub => current.wrapping_sub(rhs),
        ArithAssignOp::Mul => current.wrapping_mul(rhs),
        ArithAssignOp::Div => {
            if rhs == 0 {
                return Err(ExecError::expansion("division by 0"));
            }
            current.wrapping_div(rhs)
        }
        ArithAssignOp::Mod => {
            if rhs == 0 {
                return Err(ExecError::expansion("division by 0"));
            }
            current.wrapping_rem(rhs)
        }
        ArithAssignOp::LShift => current.wrapping_shl(rhs as u32),
        ArithAssignOp::RShift => current.wrapping_shr(rhs as u32),
        ArithAssignOp::BitAnd => current & rhs,
        ArithAssignOp::BitOr => current | rhs,
        ArithAssignOp::BitXor => current ^ rhs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::arithmetic_parser::parse_arithmetic;

    async fn eval_in(state: &mut ShellState, text: &str) -> Result<i64, ExecError> {
        let engine = Engine::new();
        let mut out = Output::default();
        let node = parse_arithmetic(text).unwrap();
        engine.eval_arith(state, &node.expression, &mut out, 0).await
    }

    async fn eval(text: &str) -> i64 {
        let mut state = ShellState::new();
        eval_in(&mut state, text).await.unwrap()
    }

    #[tokio::test]
    async fn basic_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").await, 7);
        assert_eq!(eval("(1 + 2) * 3").await, 9);
        assert_eq!(eval("7 / 2").await, 3);
        assert_eq!(eval("-7 / 2").await, -3);
        assert_eq!(eval("7 % 3").await, 1);
        assert_eq!(eval("-7 % 3").await, -1);
        assert_eq!(eval("2 ** 10").await, 1024);
    }

    #[tokio::test]
    async fn wrapping_semantics() {
        let mut state = ShellState::new();
        state.set("big", i64::MAX.to_string()).unwrap();
        assert_eq!(eval_in(&mut state, "big + 1").await.unwrap(), i64::MIN);
    }

    #[tokio::test]
    async fn division_by_zero_traps() {
        let mut state = ShellState::new();
        assert!(eval_in(&mut state, "1 / 0").await.is_err());
        assert!(eval_in(&mut state, "1 % 0").await.is_err());
        assert!(eval_in(&mut state, "x /= 0").await.is_err());
    }

    #[tokio::test]
    async fn comparisons_and_logic() {
        assert_eq!(eval("3 < 5").await, 1);
        assert_eq!(eval("3 >= 5").await, 0);
        assert_eq!(eval("1 && 2").await, 1);
        assert_eq!(eval("0 || 3").await, 1);
        assert_eq!(eval("!5").await, 0);
        assert_eq!(eval("~0").await, -1);
    }

    #[tokio::test]
    async fn short_circuit_skips_side_effects() {
        let mut state = ShellState::new();
        assert_eq!(eval_in(&mut state, "0 && (x = 9)").await.unwrap(), 0);
        assert_eq!(state.get("x"), None);
        assert_eq!(eval_in(&mut state, "1 || (y = 9)").await.unwrap(), 1);
        assert_eq!(state.get("y"), None);
        // Including a division by zero on the untaken side
        assert_eq!(eval_in(&mut state, "0 && 1 / 0").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn assignment_and_compound() {
        let mut state = ShellState::new();
        assert_eq!(eval_in(&mut state, "x = 10").await.unwrap(), 10);
        assert_eq!(state.get("x"), Some("10".to_string()));
        assert_eq!(eval_in(&mut state, "x += 5").await.unwrap(), 15);
        assert_eq!(eval_in(&mut state, "x <<= 2").await.unwrap(), 60);
        assert_eq!(state.get("x"), Some("60".to_string()));
    }

    #[tokio::test]
    async fn comma_sequences() {
        let mut state = ShellState::new();
        assert_eq!(eval_in(&mut state, "x = 10, x += 5, x * 2").await.unwrap(), 30);
        assert_eq!(state.get("x"), Some("15".to_string()));
    }

    #[tokio::test]
    async fn inc_dec() {
        let mut state = ShellState::new();
        state.set("n", "5").unwrap();
        assert_eq!(eval_in(&mut state, "n++").await.unwrap(), 5);
        assert_eq!(state.get("n"), Some("6".to_string()));
        assert_eq!(eval_in(&mut state, "++n").await.unwrap(), 7);
        assert_eq!(eval_in(&mut state, "--n").await.unwrap(), 6);
        assert_eq!(eval_in(&mut state, "n--").await.unwrap(), 6);
        assert_eq!(state.get("n"), Some("5".to_string()));
    }

    #[tokio::test]
    async fn ternary_evaluates_one_side() {
        let mut state = ShellState::new();
        assert_eq!(eval_in(&mut state, "1 ? 10 : (z = 5)").await.unwrap(), 10);
        assert_eq!(state.get("z"), None);
        assert_eq!(eval_in(&mut state, "0 ? 10 : 20").await.unwrap(), 20);
    }

    #[tokio::test]
    async fn variable_content_recurses() {
        let mut state = ShellState::new();
        state.set("a", "b + 1").unwrap();
        state.set("b", "2").unwrap();
        assert_eq!(eval_in(&mut state, "a * 10").await.unwrap(), 30);
    }

    #[tokio::test]
    async fn unset_and_garbage_are_zero() {
        let mut state = ShellState::new();
        assert_eq!(eval_in(&mut state, "missing + 1").await.unwrap(), 1);
        state.set("junk", "???").unwrap();
        assert_eq!(eval_in(&mut state, "junk").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn self_reference_is_caught() {
        let mut state = ShellState::new();
        state.set("x", "x").unwrap();
        assert!(eval_in(&mut state, "x").await.is_err());
    }

    #[tokio::test]
    async fn array_elements() {
        let mut state = ShellState::new();
        assert_eq!(eval_in(&mut state, "a[2] = 7").await.unwrap(), 7);
        assert_eq!(
            state.get_array("a").unwrap(),
            vec!["", "", "7"]
        );
        assert_eq!(eval_in(&mut state, "a[1+1] * 3").await.unwrap(), 21);
        assert_eq!(eval_in(&mut state, "a[2]++").await.unwrap(), 7);
        assert_eq!(state.get_array("a").unwrap()[2], "8");
    }

    #[tokio::test]
    async fn special_parameters() {
        let mut state = ShellState::new();
        state.set_status(42);
        assert_eq!(eval_in(&mut state, "$? + 1").await.unwrap(), 43);
        state.positional = vec!["7".to_string()];
        assert_eq!(eval_in(&mut state, "$# * 10 + $1").await.unwrap(), 17);
    }
}
