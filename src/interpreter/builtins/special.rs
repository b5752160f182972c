//! POSIX special builtins.
//!
//! Usage errors travel on the expansion channel, which aborts a
//! non-interactive shell; ordinary non-zero statuses do not.

use crate::interpreter::engine::Engine;
use crate::interpreter::errors::ExecError;
use crate::interpreter::state::{Output, ShellState};
use crate::interpreter::trap;

/// `.`/`source`: read and execute a file in the current environment.
pub async fn bi_source(
    engine: &Engine,
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
    stdin: &str,
) -> Result<i32, ExecError> {
    let Some(file) = args.first() else {
        return Err(ExecError::expansion_with_status(".: filename argument required", 2));
    };

    let path = find_source_file(state, file);
    let content = match path.and_then(|p| std::fs::read_to_string(p).ok()) {
        Some(content) => content,
        None => {
            out.push_stderr(&format!("oxsh: .: {}: No such file or directory\n", file));
            return Ok(1);
        }
    };

    let script = match crate::parser::parse(&content) {
        Ok(script) => script,
        Err(e) => {
            out.push_stderr(&format!("oxsh: {}: {}\n", file, e));
            return Ok(2);
        }
    };

    let has_args = args.len() > 1;
    if has_args {
        state.push_positional(args[1..].to_vec());
    }
    state.source_depth += 1;

    let result = engine.execute_script(state, &script, out, stdin).await;

    state.source_depth -= 1;
    if has_args {
        state.pop_positional();
    }

    // `return` is consumed at the source boundary
    match result {
        Err(ExecError::Return(code)) => Ok(code),
        other => other,
    }
}

/// `.` searches PATH, then the working directory.
fn find_source_file(state: &ShellState, file: &str) -> Option<std::path::PathBuf> {
    if file.contains('/') {
        let path = crate::interpreter::redirections::resolve_path(state, file);
        return path.is_file().then_some(path);
    }
    let path_var = state.get("PATH").unwrap_or_default();
    for dir in path_var.split(':') {
        let candidate = std::path::Path::new(dir).join(file);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    let local = state.cwd.join(file);
    local.is_file().then_some(local)
}

pub fn bi_break(state: &mut ShellState, args: &[String]) -> Result<i32, ExecError> {
    let levels = parse_loop_count(args)?;
    if state.loop_depth == 0 {
        return Ok(0);
    }
    Err(ExecError::Break(levels))
}

pub fn bi_continue(state: &mut ShellState, args: &[String]) -> Result<i32, ExecError> {
    let levels = parse_loop_count(args)?;
    if state.loop_depth == 0 {
        return Ok(0);
    }
    Err(ExecError::Continue(levels))
}

fn parse_loop_count(args: &[String]) -> Result<u32, ExecError> {
    match args.first() {
        None => Ok(1),
        Some(arg) => match arg.parse::<i64>() {
            Ok(n) if n >= 1 => Ok(n as u32),
            Ok(n) => Err(ExecError::expansion_with_status(
                format!("{}: loop count out of range", n),
                2,
            )),
            Err(_) => Err(ExecError::expansion_with_status(
                format!("{}: numeric argument required", arg),
                2,
            )),
        },
    }
}

/// `eval`: concatenate the arguments and run them through the full
/// parse/execute pipeline in the current environment.
pub async fn bi_eval(
    engine: &Engine,
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
    stdin: &str,
) -> Result<i32, ExecError> {
    let source = args.join(" ");
    if source.trim().is_empty() {
        return Ok(0);
    }
    let script = match crate::parser::parse(&source) {
        Ok(script) => script,
        Err(e) => {
            out.push_stderr(&format!("oxsh: eval: {}\n", e));
            return Ok(2);
        }
    };
    engine.execute_script(state, &script, out, stdin).await
}

/// `exec`: with arguments, the command replaces the shell — the shell
/// terminates with its status.
pub async fn bi_exec(
    engine: &Engine,
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
    stdin: &str,
) -> Result<i32, ExecError> {
    let Some(name) = args.first() else {
        // exec with only redirections: they were already applied for this
        // command; nothing persists in the captured model.
        return Ok(0);
    };
    let status = engine
        .run_external(state, name, &args[1..], &[], stdin, out)
        .await?;
    Err(ExecError::Exit(status))
}

pub fn bi_exit(state: &mut ShellState, args: &[String]) -> Result<i32, ExecError> {
    let code = match args.first() {
        None => state.last_exit_status,
        Some(arg) => match arg.parse::<i32>() {
            Ok(n) => n & 0xff,
            Err(_) => {
                return Err(ExecError::expansion_with_status(
                    format!("exit: {}: numeric argument required", arg),
                    2,
                ))
            }
        },
    };
    Err(ExecError::Exit(code))
}

pub async fn bi_export(
    _engine: &Engine,
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    if args.is_empty() || args[0] == "-p" {
        let mut names: Vec<&String> = state
            .vars
            .iter()
            .filter(|(_, v)| v.exported)
            .map(|(n, _)| n)
            .collect();
        names.sort();
        for name in names {
            if let Some(value) = state.get(name) {
                out.push_stdout(&format!("export {}=\"{}\"\n", name, value));
            }
        }
        return Ok(0);
    }

    let mut status = 0;
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => {
                if !crate::parser::lexer::is_valid_name(name) {
                    out.push_stderr(&format!("oxsh: export: `{}': not a valid identifier\n", arg));
                    status = 1;
                    continue;
                }
                state.set_exported(name, value)?;
            }
            None => {
                if !crate::parser::lexer::is_valid_name(arg) {
                    out.push_stderr(&format!("oxsh: export: `{}': not a valid identifier\n", arg));
                    status = 1;
                    continue;
                }
                state.mark_exported(arg);
            }
        }
    }
    Ok(status)
}

pub async fn bi_readonly(
    _engine: &Engine,
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    if args.is_empty() || args[0] == "-p" {
        let mut names: Vec<&String> = state
            .vars
            .iter()
            .filter(|(_, v)| v.readonly)
            .map(|(n, _)| n)
            .collect();
        names.sort();
        for name in names {
            if let Some(value) = state.get(name) {
                out.push_stdout(&format!("readonly {}=\"{}\"\n", name, value));
            }
        }
        return Ok(0);
    }

    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => {
                state.set(name, value)?;
                state.mark_readonly(name);
            }
            None => state.mark_readonly(arg),
        }
    }
    Ok(0)
}

pub fn bi_return(state: &mut ShellState, args: &[String]) -> Result<i32, ExecError> {
    if state.func_depth == 0 && state.source_depth == 0 {
        return Err(ExecError::expansion(
            "return: can only `return' from a function or sourced script",
        ));
    }
    let code = match args.first() {
        None => state.last_exit_status,
        Some(arg) => arg.parse::<i32>().unwrap_or(2) & 0xff,
    };
    Err(ExecError::Return(code))
}

/// `set`: option flags, `-o`/`+o` names, and positional parameters.
pub fn bi_set(
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    if args.is_empty() {
        let mut names: Vec<&String> = state.vars.keys().collect();
        names.sort();
        for name in names {
            if let Some(value) = state.get(name) {
                out.push_stdout(&format!("{}='{}'\n", name, value));
            }
        }
        return Ok(0);
    }

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--" => {
                state.positional = args[i + 1..].to_vec();
                return Ok(0);
            }
            "-o" | "+o" => {
                let enable = arg.starts_with('-');
                match args.get(i + 1) {
                    None => {
                        for name in crate::interpreter::state::ShellOptions::long_names() {
                            let on = state.options.get_long(name).unwrap_or(false);
                            out.push_stdout(&format!(
                                "{:<16}{}\n",
                                name,
                                if on { "on" } else { "off" }
                            ));
                        }
                    }
                    Some(name) => {
                        if let Err(msg) = state.options.set_long(name, enable) {
                            return Err(ExecError::expansion_with_status(
                                format!("set: {}", msg),
                                2,
                            ));
                        }
                        i += 1;
                    }
                }
            }
            s if s.starts_with('-') && s.len() > 1 => {
                for flag in s[1..].chars() {
                    if let Err(msg) = state.options.set_short(flag, true) {
                        return Err(ExecError::expansion_with_status(format!("set: {}", msg), 2));
                    }
                }
            }
            s if s.starts_with('+') && s.len() > 1 => {
                for flag in s[1..].chars() {
                    if let Err(msg) = state.options.set_short(flag, false) {
                        return Err(ExecError::expansion_with_status(format!("set: {}", msg), 2));
                    }
                }
            }
            _ => {
                // First non-option argument starts the positional params
                state.positional = args[i..].to_vec();
                return Ok(0);
            }
        }
        i += 1;
    }
    Ok(0)
}

pub fn bi_shift(state: &mut ShellState, args: &[String]) -> Result<i32, ExecError> {
    let n = match args.first() {
        None => 1usize,
        Some(arg) => match arg.parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                return Err(ExecError::expansion_with_status(
                    format!("shift: {}: numeric argument required", arg),
                    2,
                ))
            }
        },
    };
    if n > state.positional.len() {
        return Ok(1);
    }
    state.positional.drain(..n);
    Ok(0)
}

/// `times`: user and system time of the shell and its children.
pub fn bi_times(out: &mut Output) -> Result<i32, ExecError> {
    fn fmt(seconds: f64) -> String {
        let minutes = (seconds / 60.0).floor() as u64;
        format!("{}m{:.3}s", minutes, seconds % 60.0)
    }

    fn usage(who: i32) -> (f64, f64) {
        let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::getrusage(who, &mut ru) };
        if rc != 0 {
            return (0.0, 0.0);
        }
        let user = ru.ru_utime.tv_sec as f64 + ru.ru_utime.tv_usec as f64 / 1e6;
        let sys = ru.ru_stime.tv_sec as f64 + ru.ru_stime.tv_usec as f64 / 1e6;
        (user, sys)
    }

    let (self_user, self_sys) = usage(libc::RUSAGE_SELF);
    let (child_user, child_sys) = usage(libc::RUSAGE_CHILDREN);
    out.push_stdout(&format!("{} {}\n", fmt(self_user), fmt(self_sys)));
    out.push_stdout(&format!("{} {}\n", fmt(child_user), fmt(child_sys)));
    Ok(0)
}

/// `trap`: register, reset, or list signal actions.
pub fn bi_trap(
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    if args.is_empty() || args[0] == "-p" {
        let mut conds: Vec<&String> = state.traps.keys().collect();
        conds.sort();
        for cond in conds {
            out.push_stdout(&format!("trap -- '{}' {}\n", state.traps[cond], cond));
        }
        return Ok(0);
    }

    // `trap -l` lists signal names
    if args[0] == "-l" {
        for &(num, name) in trap::signal_table() {
            out.push_stdout(&format!("{:>2}) SIG{}\n", num, name));
        }
        return Ok(0);
    }

    let (action, conditions) = if args.len() == 1 {
        // A single operand that is a condition resets it
        ("-".to_string(), &args[..])
    } else {
        (args[0].clone(), &args[1..])
    };

    let mut status = 0;
    for cond in conditions {
        let Some(name) = trap::normalize_condition(cond) else {
            out.push_stderr(&format!("oxsh: trap: {}: invalid signal specification\n", cond));
            status = 1;
            continue;
        };
        if action == "-" {
            state.traps.remove(&name);
        } else {
            state.traps.insert(name.clone(), action.clone());
            trap::install_listener(state, &name);
        }
    }
    Ok(status)
}

pub fn bi_unset(
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    let mut functions_only = false;
    let mut vars_only = false;
    let mut names = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-f" => functions_only = true,
            "-v" => vars_only = true,
            name => names.push(name.to_string()),
        }
    }

    let mut status = 0;
    for name in names {
        if functions_only {
            state.functions.remove(&name);
            continue;
        }
        match state.unset(&name) {
            Ok(()) => {
                if !vars_only {
                    // Without -v, a function of the same name goes too when
                    // no variable existed
                    state.functions.remove(&name);
                }
            }
            Err(ExecError::Expansion { message, .. }) => {
                out.push_stderr(&format!("oxsh: unset: {}\n", message));
                status = 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(status)
}
