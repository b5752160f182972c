//! Regular builtins.

use crate::ast::types::CondUnaryOp;
use crate::interpreter::conditionals::file_test;
use crate::interpreter::engine::Engine;
use crate::interpreter::errors::ExecError;
use crate::interpreter::expansion::quoting::decode_ansi_c_escapes;
use crate::interpreter::expansion::split::split_ifs;
use crate::interpreter::state::{Output, ShellState};

pub fn bi_alias(
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    if args.is_empty() {
        let mut names: Vec<&String> = state.aliases.keys().collect();
        names.sort();
        for name in names {
            out.push_stdout(&format!("alias {}='{}'\n", name, state.aliases[name]));
        }
        return Ok(0);
    }

    let mut status = 0;
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => {
                state.aliases.insert(name.to_string(), value.to_string());
            }
            None => match state.aliases.get(arg) {
                Some(value) => out.push_stdout(&format!("alias {}='{}'\n", arg, value)),
                None => {
                    out.push_stderr(&format!("oxsh: alias: {}: not found\n", arg));
                    status = 1;
                }
            },
        }
    }
    Ok(status)
}

pub fn bi_unalias(
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    if args.first().map(|s| s.as_str()) == Some("-a") {
        state.aliases.clear();
        return Ok(0);
    }
    let mut status = 0;
    for name in args {
        if state.aliases.remove(name).is_none() {
            out.push_stderr(&format!("oxsh: unalias: {}: not found\n", name));
            status = 1;
        }
    }
    Ok(status)
}

pub fn bi_cd(state: &mut ShellState, args: &[String], out: &mut Output) -> Result<i32, ExecError> {
    let target = match args.first().map(|s| s.as_str()) {
        None => match state.get("HOME") {
            Some(home) if !home.is_empty() => home,
            _ => {
                out.push_stderr("oxsh: cd: HOME not set\n");
                return Ok(1);
            }
        },
        Some("-") => match state.get("OLDPWD") {
            Some(oldpwd) => {
                out.push_stdout(&format!("{}\n", oldpwd));
                oldpwd
            }
            None => {
                out.push_stderr("oxsh: cd: OLDPWD not set\n");
                return Ok(1);
            }
        },
        Some(dir) => dir.to_string(),
    };

    let new_path = if target.starts_with('/') {
        normalize_path(&target)
    } else {
        normalize_path(&format!("{}/{}", state.cwd.display(), target))
    };

    if !std::path::Path::new(&new_path).is_dir() {
        out.push_stderr(&format!("oxsh: cd: {}: No such file or directory\n", target));
        return Ok(1);
    }

    let old = state
        .get("PWD")
        .unwrap_or_else(|| state.cwd.display().to_string());
    state.cwd = std::path::PathBuf::from(&new_path);
    state.set("OLDPWD", old)?;
    state.set("PWD", new_path)?;
    Ok(0)
}

/// Resolve `.` and `..` textually (logical cd).
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    format!("/{}", joined)
}

pub fn bi_pwd(state: &mut ShellState, out: &mut Output) -> Result<i32, ExecError> {
    let pwd = state
        .get("PWD")
        .unwrap_or_else(|| state.cwd.display().to_string());
    out.push_stdout(&format!("{}\n", pwd));
    Ok(0)
}

pub fn bi_echo(args: &[String], out: &mut Output) -> Result<i32, ExecError> {
    let mut newline = true;
    let mut escapes = false;
    let mut start = 0;

    for arg in args {
        match arg.as_str() {
            "-n" => newline = false,
            "-e" => escapes = true,
            "-E" => escapes = false,
            "-ne" | "-en" => {
                newline = false;
                escapes = true;
            }
            _ => break,
        }
        start += 1;
    }

    let joined = args[start..].join(" ");
    let text = if escapes {
        // \c truncates output and suppresses the newline
        match joined.find("\\c") {
            Some(idx) => {
                out.push_stdout(&decode_ansi_c_escapes(&joined[..idx]));
                return Ok(0);
            }
            None => decode_ansi_c_escapes(&joined),
        }
    } else {
        joined
    };

    out.push_stdout(&text);
    if newline {
        out.push_stdout("\n");
    }
    Ok(0)
}

pub fn bi_printf(args: &[String], out: &mut Output) -> Result<i32, ExecError> {
    let Some(format) = args.first() else {
        return Err(ExecError::expansion_with_status("printf: usage: printf format [arguments]", 2));
    };
    let mut values = args[1..].iter();
    let mut status = 0;

    // The format string is reused until the arguments run out.
    loop {
        let mut consumed_any = false;
        let chars: Vec<char> = format.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '\\' if i + 1 < chars.len() => {
                    let mut esc = String::from("\\");
                    esc.push(chars[i + 1]);
                    out.push_stdout(&decode_ansi_c_escapes(&esc));
                    i += 2;
                }
                '%' => {
                    let (spec, next) = scan_format_spec(&chars, i);
                    i = next;
                    match spec.conversion {
                        '%' => out.push_stdout("%"),
                        's' => {
                            let v = values.next().map(|s| s.as_str()).unwrap_or("");
                            out.push_stdout(&pad(v, &spec));
                            consumed_any = true;
                        }
                        'c' => {
                            let v = values.next().map(|s| s.as_str()).unwrap_or("");
                            let c: String = v.chars().take(1).collect();
                            out.push_stdout(&pad(&c, &spec));
                            consumed_any = true;
                        }
                        'q' => {
                            let v = values.next().map(|s| s.as_str()).unwrap_or("");
                            out.push_stdout(&crate::interpreter::expansion::quoting::shell_quote(v));
                            consumed_any = true;
                        }
                        'd' | 'i' => {
                            let raw = values.next().map(|s| s.as_str()).unwrap_or("0");
                            let n = parse_printf_int(raw).unwrap_or_else(|| {
                                status = 1;
                                0
                            });
                            out.push_stdout(&pad(&n.to_string(), &spec));
                            consumed_any = true;
                        }
                        'u' => {
                            let raw = values.next().map(|s| s.as_str()).unwrap_or("0");
                            let n = parse_printf_int(raw).unwrap_or(0).unsigned_abs();
                            out.push_stdout(&pad(&n.to_string(), &spec));
                            consumed_any = true;
                        }
                        'x' => {
                            let raw = values.next().map(|s| s.as_str()).unwrap_or("0");
                            let n = parse_printf_int(raw).unwrap_or(0);
                            out.push_stdout(&pad(&format!("{:x}", n), &spec));
                            consumed_any = true;
                        }
                        'X' => {
                            let raw = values.next().map(|s| s.as_str()).unwrap_or("0");
                            let n = parse_printf_int(raw).unwrap_or(0);
                            out.push_stdout(&pad(&format!("{:X}", n), &spec));
                            consumed_any = true;
                        }
                        'o' => {
                            let raw = values.next().map(|s| s.as_str()).unwrap_or("0");
                            let n = parse_printf_int(raw).unwrap_or(0);
                            out.push_stdout(&pad(&format!("{:o}", n), &spec));
                            consumed_any = true;
                        }
                        other => {
                            out.push_stdout(&format!("%{}", other));
                        }
                    }
                }
                c => {
                    out.push_stdout(&c.to_string());
                    i += 1;
                }
            }
        }

        if values.len() == 0 || !consumed_any {
            break;
        }
    }
    Ok(status)
}

struct FormatSpec {
    left_align: bool,
    zero_pad: bool,
    width: usize,
    conversion: char,
}

fn scan_format_spec(chars: &[char], start: usize) -> (FormatSpec, usize) {
    let mut i = start + 1;
    let mut spec = FormatSpec {
        left_align: false,
        zero_pad: false,
        width: 0,
        conversion: '%',
    };
    while matches!(chars.get(i), Some('-') | Some('0')) {
        if chars[i] == '-' {
            spec.left_align = true;
        } else {
            spec.zero_pad = true;
        }
        i += 1;
    }
    while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
        spec.width = spec.width * 10 + d as usize;
        i += 1;
    }
    // Precision is accepted and ignored
    if chars.get(i) == Some(&'.') {
        i += 1;
        while chars.get(i).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            i += 1;
        }
    }
    if let Some(&c) = chars.get(i) {
        spec.conversion = c;
        i += 1;
    }
    (spec, i)
}

fn pad(value: &str, spec: &FormatSpec) -> String {
    if value.chars().count() >= spec.width {
        return value.to_string();
    }
    let fill = if spec.zero_pad && !spec.left_align { '0' } else { ' ' };
    let padding: String = std::iter::repeat(fill)
        .take(spec.width - value.chars().count())
        .collect();
    if spec.left_align {
        format!("{}{}", value, padding)
    } else {
        format!("{}{}", padding, value)
    }
}

fn parse_printf_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    // A leading quote yields the character code
    if let Some(stripped) = trimmed.strip_prefix('\'').or_else(|| trimmed.strip_prefix('"')) {
        return stripped.chars().next().map(|c| c as i64);
    }
    trimmed.parse().ok()
}

/// `read [-r] [-p prompt] [name...]`
pub fn bi_read(
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    let mut raw = false;
    let mut names = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-r" => raw = true,
            "-p" => {
                if let Some(prompt) = args.get(i + 1) {
                    if state.options.interactive {
                        eprint!("{}", prompt);
                    }
                    i += 1;
                }
            }
            name => names.push(name.to_string()),
        }
        i += 1;
    }
    if names.is_empty() {
        names.push("REPLY".to_string());
    }

    let line = match read_input_line(state) {
        Some(line) => line,
        None => return Ok(1),
    };

    let line = if raw {
        line
    } else {
        // Without -r, backslash-newline was already joined by the caller;
        // remaining backslashes escape the next character
        let mut result = String::new();
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    result.push(next);
                }
            } else {
                result.push(c);
            }
        }
        result
    };

    let ifs = state.ifs();
    if names.len() == 1 {
        let trimmed = trim_ifs_whitespace(&line, &ifs);
        state.set(&names[0], trimmed)?;
        return Ok(0);
    }

    // Split into at most names.len() fields; the last name takes the rest.
    let mut remaining = line.as_str();
    for (idx, name) in names.iter().enumerate() {
        if idx == names.len() - 1 {
            state.set(name, trim_ifs_whitespace(remaining, &ifs))?;
            break;
        }
        let trimmed = remaining.trim_start_matches(|c: char| {
            (c == ' ' || c == '\t' || c == '\n') && ifs.contains(c)
        });
        let split = split_ifs(trimmed, &ifs);
        match split.parts.first() {
            Some(first) => {
                state.set(name, first.clone())?;
                // Advance past the first field and its delimiter
                let consumed = trimmed.find(first.as_str()).unwrap_or(0) + first.len();
                let after = &trimmed[consumed..];
                remaining = after
                    .strip_prefix(|c: char| ifs.contains(c))
                    .unwrap_or(after);
            }
            None => {
                state.set(name, "")?;
                remaining = "";
            }
        }
    }
    let _ = out;
    Ok(0)
}

fn trim_ifs_whitespace<'a>(s: &'a str, ifs: &str) -> &'a str {
    let is_ws = |c: char| (c == ' ' || c == '\t' || c == '\n') && ifs.contains(c);
    s.trim_start_matches(is_ws).trim_end_matches(is_ws)
}

fn read_input_line(state: &mut ShellState) -> Option<String> {
    if state.stdin_buf.attached {
        return state.stdin_buf.read_line();
    }
    // Fall back to the shell's real standard input
    let mut line = String::new();
    match std::io::BufRead::read_line(&mut std::io::stdin().lock(), &mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            if line.ends_with('\n') {
                line.pop();
            }
            Some(line)
        }
    }
}

/// `test` / `[` over already-expanded arguments.
pub async fn bi_test(
    engine: &Engine,
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    let mut parser = TestParser {
        args,
        pos: 0,
        engine,
    };
    match parser.parse_or(state, out).await {
        Ok(value) => {
            if parser.pos != args.len() {
                out.push_stderr("oxsh: test: too many arguments\n");
                return Ok(2);
            }
            Ok(if value { 0 } else { 1 })
        }
        Err(TestError::Usage(message)) => {
            out.push_stderr(&format!("oxsh: test: {}\n", message));
            Ok(2)
        }
        Err(TestError::Exec(e)) => Err(e),
    }
}

enum TestError {
    Usage(String),
    Exec(ExecError),
}

struct TestParser<'a> {
    args: &'a [String],
    pos: usize,
    engine: &'a Engine,
}

impl<'a> TestParser<'a> {
    fn current(&self) -> Option<&str> {
        self.args.get(self.pos).map(|s| s.as_str())
    }

    fn parse_or<'b>(
        &'b mut self,
        state: &'b mut ShellState,
        out: &'b mut Output,
    ) -> crate::interpreter::engine::BoxFuture<'b, Result<bool, TestError>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            let mut left = self.parse_and(state, out).await?;
            while self.current() == Some("-o") {
                self.pos += 1;
                let right = self.parse_and(state, out).await?;
                left = left || right;
            }
            Ok(left)
        })
    }

    async fn parse_and(
        &mut self,
        state: &mut ShellState,
        out: &mut Output,
    ) -> Result<bool, TestError> {
        let mut left = self.parse_term(state, out).await?;
        while self.current() == Some("-a") {
            self.pos += 1;
            let right = self.parse_term(state, out).await?;
            left = left && right;
        }
        Ok(left)
    }

    fn parse_term<'b>(
        &'b mut self,
        state: &'b mut ShellState,
        out: &'b mut Output,
    ) -> crate::interpreter::engine::BoxFuture<'b, Result<bool, TestError>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            match self.current() {
                None => Ok(false),
                Some("!") => {
                    self.pos += 1;
                    let inner = self.parse_term(state, out).await?;
                    Ok(!inner)
                }
                Some("(") => {
                    self.pos += 1;
                    let inner = self.parse_or(state, out).await?;
                    if self.current() != Some(")") {
                        return Err(TestError::Usage("expected `)'".to_string()));
                    }
                    self.pos += 1;
                    Ok(inner)
                }
                Some(_) => self.parse_primary(state, out).await,
            }
        })
    }

    async fn parse_primary(
        &mut self,
        state: &mut ShellState,
        out: &mut Output,
    ) -> Result<bool, TestError> {
        let first = self.args[self.pos].clone();

        // Binary operator?
        let op = self.args.get(self.pos + 1).cloned();
        if let Some(op) = op {
            if let Some(result) = self.try_binary(state, &first, &op, out).await? {
                return Ok(result);
            }
        }

        // Unary operator?
        if first.starts_with('-') && first.len() == 2 && self.args.len() > self.pos + 1 {
            let operand = self.args[self.pos + 1].clone();
            self.pos += 2;
            return self.unary(state, &first, &operand);
        }

        // Bare string: true when non-empty
        self.pos += 1;
        Ok(!first.is_empty())
    }

    async fn try_binary(
        &mut self,
        state: &mut ShellState,
        left: &str,
        op: &str,
        out: &mut Output,
    ) -> Result<Option<bool>, TestError> {
        let Some(right) = self.args.get(self.pos + 2).cloned() else {
            return Ok(None);
        };

        let result = match op {
            "=" | "==" => left == right,
            "!=" => left != right,
            "<" => left < right.as_str(),
            ">" => left > right.as_str(),
            "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" => {
                let l = self.number(state, left, out).await?;
                let r = self.number(state, &right, out).await?;
                match op {
                    "-eq" => l == r,
                    "-ne" => l != r,
                    "-lt" => l < r,
                    "-le" => l <= r,
                    "-gt" => l > r,
                    _ => l >= r,
                }
            }
            "-nt" | "-ot" | "-ef" => {
                let op_mapped = match op {
                    "-nt" => crate::ast::types::CondBinaryOp::NewerThan,
                    "-ot" => crate::ast::types::CondBinaryOp::OlderThan,
                    _ => crate::ast::types::CondBinaryOp::SameFile,
                };
                file_pair_test(state, op_mapped, left, &right)
            }
            _ => return Ok(None),
        };
        self.pos += 3;
        Ok(Some(result))
    }

    async fn number(
        &self,
        state: &mut ShellState,
        text: &str,
        out: &mut Output,
    ) -> Result<i64, TestError> {
        if let Ok(v) = text.trim().parse::<i64>() {
            return Ok(v);
        }
        self.engine
            .arith_operand(state, text, out)
            .await
            .map_err(|_| TestError::Usage(format!("{}: integer expression expected", text)))
    }

    fn unary(
        &self,
        state: &mut ShellState,
        op: &str,
        operand: &str,
    ) -> Result<bool, TestError> {
        let mapped = match op {
            "-n" => return Ok(!operand.is_empty()),
            "-z" => return Ok(operand.is_empty()),
            "-v" => return Ok(state.is_set(operand)),
            "-o" => return Ok(state.options.get_long(operand).unwrap_or(false)),
            "-t" => {
                return Ok(match operand.parse::<i32>() {
                    Ok(fd) => unsafe { libc::isatty(fd) == 1 },
                    Err(_) => false,
                })
            }
            "-e" | "-a" => CondUnaryOp::Exists,
            "-f" => CondUnaryOp::IsFile,
            "-d" => CondUnaryOp::IsDir,
            "-b" => CondUnaryOp::IsBlock,
            "-c" => CondUnaryOp::IsChar,
            "-p" => CondUnaryOp::IsPipe,
            "-h" | "-L" => CondUnaryOp::IsSymlink,
            "-S" => CondUnaryOp::IsSocket,
            "-g" => CondUnaryOp::IsSetgid,
            "-u" => CondUnaryOp::IsSetuid,
            "-k" => CondUnaryOp::IsSticky,
            "-r" => CondUnaryOp::Readable,
            "-w" => CondUnaryOp::Writable,
            "-x" => CondUnaryOp::Executable,
            "-s" => CondUnaryOp::NonEmptyFile,
            "-G" => CondUnaryOp::OwnedByGroup,
            "-O" => CondUnaryOp::OwnedByUser,
            other => return Err(TestError::Usage(format!("{}: unary operator expected", other))),
        };
        Ok(file_test(state, mapped, operand))
    }
}

fn file_pair_test(
    state: &ShellState,
    op: crate::ast::types::CondBinaryOp,
    left: &str,
    right: &str,
) -> bool {
    use crate::ast::types::CondBinaryOp;
    use crate::interpreter::redirections::resolve_path;
    use std::os::unix::fs::MetadataExt;

    let lm = std::fs::metadata(resolve_path(state, left));
    let rm = std::fs::metadata(resolve_path(state, right));
    match op {
        CondBinaryOp::SameFile => match (lm, rm) {
            (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
            _ => false,
        },
        CondBinaryOp::NewerThan => match (lm.and_then(|m| m.modified()), rm.and_then(|m| m.modified())) {
            (Ok(a), Ok(b)) => a > b,
            (Ok(_), Err(_)) => true,
            _ => false,
        },
        _ => match (lm.and_then(|m| m.modified()), rm.and_then(|m| m.modified())) {
            (Ok(a), Ok(b)) => a < b,
            (Err(_), Ok(_)) => true,
            _ => false,
        },
    }
}

pub fn bi_type(
    engine: &Engine,
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    let mut status = 0;
    for name in args {
        if let Some(value) = state.aliases.get(name) {
            out.push_stdout(&format!("{} is aliased to `{}'\n", name, value));
        } else if state.functions.contains_key(name) {
            out.push_stdout(&format!("{} is a function\n", name));
        } else if super::is_builtin(name) {
            out.push_stdout(&format!("{} is a shell builtin\n", name));
        } else if let Some(path) = engine.resolve_command(state, name) {
            out.push_stdout(&format!("{} is {}\n", name, path.display()));
        } else {
            out.push_stderr(&format!("oxsh: type: {}: not found\n", name));
            status = 1;
        }
    }
    Ok(status)
}

pub fn bi_hash(
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    if args.first().map(|s| s.as_str()) == Some("-r") {
        state.command_hash.clear();
        return Ok(0);
    }
    if args.is_empty() {
        let mut names: Vec<&String> = state.command_hash.keys().collect();
        names.sort();
        for name in names {
            out.push_stdout(&format!("{}\t{}\n", name, state.command_hash[name].display()));
        }
        return Ok(0);
    }
    Ok(0)
}

pub fn bi_local(
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    if state.func_depth == 0 {
        out.push_stderr("oxsh: local: can only be used in a function\n");
        return Ok(1);
    }
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => state.declare_local(name, Some(value.to_string()))?,
            None => state.declare_local(arg, Some(String::new()))?,
        }
    }
    Ok(0)
}

/// `getopts optstring name [args...]`
pub fn bi_getopts(
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    let (Some(optstring), Some(name)) = (args.first().cloned(), args.get(1).cloned()) else {
        return Err(ExecError::expansion_with_status(
            "getopts: usage: getopts optstring name [arg ...]",
            2,
        ));
    };

    let params: Vec<String> = if args.len() > 2 {
        args[2..].to_vec()
    } else {
        state.positional.clone()
    };

    let silent = optstring.starts_with(':');
    let optstring = optstring.trim_start_matches(':');

    let mut optind: usize = state
        .get("OPTIND")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    // Sub-position within a bundled option word, carried in OPTIND's
    // fractional companion variable.
    let mut subpos: usize = state
        .get("OPTPOS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);

    let finish = |state: &mut ShellState, name: &str| -> Result<i32, ExecError> {
        state.set(name, "?")?;
        Ok(1)
    };

    loop {
        let Some(word) = params.get(optind.wrapping_sub(1)) else {
            return finish(state, &name);
        };
        if !word.starts_with('-') || word == "-" {
            return finish(state, &name);
        }
        if word == "--" {
            state.set("OPTIND", (optind + 1).to_string())?;
            return finish(state, &name);
        }

        let chars: Vec<char> = word.chars().collect();
        if subpos >= chars.len() {
            optind += 1;
            subpos = 1;
            continue;
        }
        let opt = chars[subpos];

        let spec_pos = optstring.find(opt);
        let takes_arg = spec_pos
            .map(|p| optstring[p + opt.len_utf8()..].starts_with(':'))
            .unwrap_or(false);

        if spec_pos.is_none() {
            if silent {
                state.set(&name, "?")?;
                state.set("OPTARG", opt.to_string())?;
            } else {
                out.push_stderr(&format!("oxsh: getopts: illegal option -- {}\n", opt));
                state.set(&name, "?")?;
                state.unset("OPTARG").ok();
            }
            advance(state, &mut optind, &mut subpos, &chars)?;
            return Ok(0);
        }

        if takes_arg {
            let rest: String = chars[subpos + 1..].iter().collect();
            let optarg = if !rest.is_empty() {
                optind += 1;
                subpos = 1;
                rest
            } else {
                optind += 1;
                match params.get(optind.wrapping_sub(1)) {
                    Some(next) => {
                        optind += 1;
                        subpos = 1;
                        next.clone()
                    }
                    None => {
                        if silent {
                            state.set(&name, ":")?;
                            state.set("OPTARG", opt.to_string())?;
                        } else {
                            out.push_stderr(&format!(
                                "oxsh: getopts: option requires an argument -- {}\n",
                                opt
                            ));
                            state.set(&name, "?")?;
                        }
                        state.set("OPTIND", optind.to_string())?;
                        state.set("OPTPOS", "1")?;
                        return Ok(0);
                    }
                }
            };
            state.set(&name, opt.to_string())?;
            state.set("OPTARG", optarg)?;
            state.set("OPTIND", optind.to_string())?;
            state.set("OPTPOS", subpos.to_string())?;
            return Ok(0);
        }

        state.set(&name, opt.to_string())?;
        state.unset("OPTARG").ok();
        advance(state, &mut optind, &mut subpos, &chars)?;
        return Ok(0);
    }

    fn advance(
        state: &mut ShellState,
        optind: &mut usize,
        subpos: &mut usize,
        chars: &[char],
    ) -> Result<(), ExecError> {
        if *subpos + 1 < chars.len() {
            *subpos += 1;
        } else {
            *optind += 1;
            *subpos = 1;
        }
        state.set("OPTIND", optind.to_string())?;
        state.set("OPTPOS", subpos.to_string())?;
        Ok(())
    }
}

pub fn bi_jobs(state: &mut ShellState, out: &mut Output) -> Result<i32, ExecError> {
    for job in state.jobs.list() {
        let status = if job.is_finished() { "Done" } else { "Running" };
        out.push_stdout(&format!("[{}]  {}  {}\n", job.id, status, job.command));
    }
    Ok(0)
}

/// `wait [id...]`: join background jobs, surfacing their captured output.
pub async fn bi_wait(
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    let jobs = if args.is_empty() {
        state.jobs.take_all()
    } else {
        let mut selected = Vec::new();
        for arg in args {
            let job = if let Some(id_text) = arg.strip_prefix('%') {
                id_text
                    .parse::<usize>()
                    .ok()
                    .and_then(|id| state.jobs.get(id).cloned())
            } else {
                arg.parse::<u32>()
                    .ok()
                    .and_then(|pid| state.jobs.by_pid(pid).cloned())
            };
            match job {
                Some(job) => selected.push(job.clone()),
                None => {
                    out.push_stderr(&format!("oxsh: wait: {}: no such job\n", arg));
                    return Ok(127);
                }
            }
        }
        selected
    };

    let mut status = 0;
    for job in &jobs {
        if let Some(result) = job.join().await {
            out.push_stdout(&result.stdout);
            out.push_stderr(&result.stderr);
            status = result.exit_code;
        }
        state.jobs.remove(job.id);
    }
    Ok(status)
}

pub fn bi_kill(
    state: &mut ShellState,
    args: &[String],
    out: &mut Output,
) -> Result<i32, ExecError> {
    let mut signal = libc::SIGTERM;
    let mut targets = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if arg == "-s" {
            if let Some(name) = args.get(i + 1) {
                match crate::interpreter::trap::signal_number(name) {
                    Some(n) => signal = n,
                    None => {
                        out.push_stderr(&format!("oxsh: kill: {}: invalid signal\n", name));
                        return Ok(1);
                    }
                }
                i += 1;
            }
        } else if let Some(spec) = arg.strip_prefix('-') {
            match spec.parse::<i32>() {
                Ok(n) => signal = n,
                Err(_) => match crate::interpreter::trap::signal_number(spec) {
                    Some(n) => signal = n,
                    None => {
                        out.push_stderr(&format!("oxsh: kill: {}: invalid signal\n", spec));
                        return Ok(1);
                    }
                },
            }
        } else {
            targets.push(arg.clone());
        }
        i += 1;
    }

    let mut status = 0;
    for target in targets {
        if let Some(id_text) = target.strip_prefix('%') {
            match id_text
                .parse::<usize>()
                .ok()
                .and_then(|id| state.jobs.get(id))
            {
                Some(job) => job.abort(),
                None => {
                    out.push_stderr(&format!("oxsh: kill: {}: no such job\n", target));
                    status = 1;
                }
            }
            continue;
        }
        match target.parse::<i32>() {
            Ok(pid) => {
                if unsafe { libc::kill(pid, signal) } != 0 {
                    out.push_stderr(&format!("oxsh: kill: ({}) - No such process\n", pid));
                    status = 1;
                }
            }
            Err(_) => {
                out.push_stderr(&format!("oxsh: kill: {}: arguments must be process or job IDs\n", target));
                status = 1;
            }
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_basics() {
        let mut out = Output::default();
        bi_echo(&["a".to_string(), "b".to_string()], &mut out).unwrap();
        assert_eq!(out.stdout, "a b\n");

        let mut out = Output::default();
        bi_echo(&["-n".to_string(), "x".to_string()], &mut out).unwrap();
        assert_eq!(out.stdout, "x");

        let mut out = Output::default();
        bi_echo(&["-e".to_string(), "a\\tb".to_string()], &mut out).unwrap();
        assert_eq!(out.stdout, "a\tb\n");
    }

    #[test]
    fn printf_basics() {
        let mut out = Output::default();
        bi_printf(
            &["%s=%d\\n".to_string(), "x".to_string(), "7".to_string()],
            &mut out,
        )
        .unwrap();
        assert_eq!(out.stdout, "x=7\n");
    }

    #[test]
    fn printf_reuses_format() {
        let mut out = Output::default();
        bi_printf(
            &[
                "[%s]".to_string(),
                "a".to_string(),
                "b".to_string(),
            ],
            &mut out,
        )
        .unwrap();
        assert_eq!(out.stdout, "[a][b]");
    }

    #[test]
    fn printf_width() {
        let mut out = Output::default();
        bi_printf(&["%5d|".to_string(), "42".to_string()], &mut out).unwrap();
        assert_eq!(out.stdout, "   42|");
        let mut out = Output::default();
        bi_printf(&["%-5s|".to_string(), "ab".to_string()], &mut out).unwrap();
        assert_eq!(out.stdout, "ab   |");
    }

    #[test]
    fn cd_normalizes() {
        assert_eq!(normalize_path("/a/b/../c/./d"), "/a/c/d");
        assert_eq!(normalize_path("/.."), "/");
    }

    #[test]
    fn read_splits_fields() {
        let mut state = ShellState::new();
        state.stdin_buf = crate::interpreter::state::StdinBuf::attached("a b c\n".to_string());
        let mut out = Output::default();
        let status = bi_read(
            &mut state,
            &["x".to_string(), "y".to_string()],
            &mut out,
        )
        .unwrap();
        assert_eq!(status, 0);
        assert_eq!(state.get("x"), Some("a".to_string()));
        assert_eq!(state.get("y"), Some("b c".to_string()));
    }

    #[test]
    fn read_consumes_lines_in_turn() {
        let mut state = ShellState::new();
        state.stdin_buf =
            crate::interpreter::state::StdinBuf::attached("one\ntwo\n".to_string());
        let mut out = Output::default();
        bi_read(&mut state, &["a".to_string()], &mut out).unwrap();
        bi_read(&mut state, &["b".to_string()], &mut out).unwrap();
        assert_eq!(state.get("a"), Some("one".to_string()));
        assert_eq!(state.get("b"), Some("two".to_string()));
        // Third read hits end of input
        assert_eq!(bi_read(&mut state, &["c".to_string()], &mut out).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_builtin_strings_and_numbers() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        let mut out = Output::default();
        let args = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };

        assert_eq!(
            bi_test(&engine, &mut state, &args(&["abc", "=", "abc"]), &mut out)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            bi_test(&engine, &mut state, &args(&["abc", "!=", "abc"]), &mut out)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            bi_test(&engine, &mut state, &args(&["3", "-lt", "5"]), &mut out)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            bi_test(&engine, &mut state, &args(&["-n", ""]), &mut out)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            bi_test(&engine, &mut state, &args(&["-d", "/"]), &mut out)
                .await
                .unwrap(),
            0
        );
        // Combined with -a / -o
        assert_eq!(
            bi_test(
                &engine,
                &mut state,
                &args(&["a", "=", "a", "-a", "b", "=", "b"]),
                &mut out
            )
            .await
            .unwrap(),
            0
        );
        assert_eq!(
            bi_test(
                &engine,
                &mut state,
                &args(&["!", "a", "=", "a"]),
                &mut out
            )
            .await
            .unwrap(),
            1
        );
    }

    #[test]
    fn getopts_walks_options() {
        let mut state = ShellState::new();
        state.positional = vec!["-a".to_string(), "-b".to_string(), "arg".to_string()];
        state.set("OPTIND", "1").unwrap();
        let mut out = Output::default();

        let args = vec!["ab".to_string(), "opt".to_string()];
        assert_eq!(bi_getopts(&mut state, &args, &mut out).unwrap(), 0);
        assert_eq!(state.get("opt"), Some("a".to_string()));
        assert_eq!(bi_getopts(&mut state, &args, &mut out).unwrap(), 0);
        assert_eq!(state.get("opt"), Some("b".to_string()));
        // No more options
        assert_eq!(bi_getopts(&mut state, &args, &mut out).unwrap(), 1);
        assert_eq!(state.get("opt"), Some("?".to_string()));
    }

    #[test]
    fn getopts_option_argument() {
        let mut state = ShellState::new();
        state.positional = vec!["-f".to_string(), "file.txt".to_string()];
        state.set("OPTIND", "1").unwrap();
        let mut out = Output::default();

        let args = vec!["f:".to_string(), "opt".to_string()];
        assert_eq!(bi_getopts(&mut state, &args, &mut out).unwrap(), 0);
        assert_eq!(state.get("opt"), Some("f".to_string()));
        assert_eq!(state.get("OPTARG"), Some("file.txt".to_string()));
    }
}
