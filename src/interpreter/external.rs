//! External command execution.
//!
//! Commands resolve through PATH (with the command hash cache), run as
//! real child processes with the exported variables as their environment,
//! and report 126 for a file that exists but cannot execute, 127 for not
//! found, and 128+N for death by signal. A file the kernel rejects as a
//! binary is retried through `/bin/sh`.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;

use crate::interpreter::engine::Engine;
use crate::interpreter::errors::ExecError;
use crate::interpreter::redirections::resolve_path;
use crate::interpreter::state::{Output, ShellState};

impl Engine {
    /// Run an external command with the given stdin content; stdout and
    /// stderr are captured into `out`.
    pub async fn run_external(
        &self,
        state: &mut ShellState,
        name: &str,
        args: &[String],
        env_overrides: &[(String, String)],
        stdin: &str,
        out: &mut Output,
    ) -> Result<i32, ExecError> {
        let path = match self.resolve_command(state, name) {
            Some(path) => path,
            None => {
                out.push_stderr(&format!("oxsh: {}: command not found\n", name));
                return Ok(127);
            }
        };

        if !is_executable(&path) {
            out.push_stderr(&format!("oxsh: {}: Permission denied\n", name));
            return Ok(126);
        }

        let span = tracing::info_span!(
            "shell.cmd",
            cmd = %name,
            exit_code = tracing::field::Empty,
        );
        let _guard = span.enter();

        let output = match self
            .spawn_child(state, &path, args, env_overrides, stdin)
            .await
        {
            Ok(output) => output,
            Err(err) if err.raw_os_error() == Some(libc::ENOEXEC) => {
                // Not a binary: run it through /bin/sh
                let mut sh_args = vec![path.display().to_string()];
                sh_args.extend(args.iter().cloned());
                match self
                    .spawn_child(state, Path::new("/bin/sh"), &sh_args, env_overrides, stdin)
                    .await
                {
                    Ok(output) => output,
                    Err(err) => {
                        out.push_stderr(&format!("oxsh: {}: {}\n", name, err));
                        return Ok(126);
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                out.push_stderr(&format!("oxsh: {}: Permission denied\n", name));
                return Ok(126);
            }
            Err(err) => {
                out.push_stderr(&format!("oxsh: {}: {}\n", name, err));
                return Ok(127);
            }
        };

        out.push_stdout(&String::from_utf8_lossy(&output.stdout));
        out.push_stderr(&String::from_utf8_lossy(&output.stderr));

        let status = match output.status.code() {
            Some(code) => code,
            None => 128 + output.status.signal().unwrap_or(0),
        };
        span.record("exit_code", status);
        Ok(status)
    }

    async fn spawn_child(
        &self,
        state: &ShellState,
        path: &Path,
        args: &[String],
        env_overrides: &[(String, String)],
        stdin: &str,
    ) -> std::io::Result<std::process::Output> {
        let mut command = tokio::process::Command::new(path);
        command.args(args);
        command.current_dir(&state.cwd);
        command.env_clear();
        for (key, value) in state.build_exported_env() {
            command.env(key, value);
        }
        for (key, value) in env_overrides {
            command.env(key, value);
        }
        command.stdin(Stdio::piped());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command.spawn()?;

        if let Some(mut child_stdin) = child.stdin.take() {
            let data = stdin.as_bytes().to_vec();
            // The write races the child reading; a child that exits early
            // just drops the pipe.
            let _ = child_stdin.write_all(&data).await;
            drop(child_stdin);
        }

        child.wait_with_output().await
    }

    /// Resolve a command name to a path: explicit paths go straight
    /// through, everything else searches PATH via the hash cache.
    pub fn resolve_command(&self, state: &mut ShellState, name: &str) -> Option<PathBuf> {
        if name.contains('/') {
            let path = resolve_path(state, name);
            return if path.exists() { Some(path) } else { None };
        }

        if let Some(cached) = state.command_hash.get(name) {
            if cached.exists() {
                return Some(cached.clone());
            }
        }

        let path_var = state.get("PATH").unwrap_or_default();
        for dir in path_var.split(':') {
            let dir = if dir.is_empty() { "." } else { dir };
            let candidate = Path::new(dir).join(name);
            let candidate = if candidate.is_absolute() {
                candidate
            } else {
                state.cwd.join(candidate)
            };
            if candidate.is_file() {
                state
                    .command_hash
                    .insert(name.to_string(), candidate.clone());
                return Some(candidate);
            }
        }
        None
    }
}

fn is_executable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(cpath.as_ptr(), libc::X_OK) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_from_path() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        state.set("PATH", "/usr/bin:/bin").unwrap();
        let resolved = engine.resolve_command(&mut state, "sh");
        assert!(resolved.is_some());
        // Second lookup hits the cache
        assert!(state.command_hash.contains_key("sh"));
        assert!(engine.resolve_command(&mut state, "sh").is_some());
    }

    #[test]
    fn missing_command_is_none() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        state.set("PATH", "/nonexistent-dir-xyz").unwrap();
        assert!(engine
            .resolve_command(&mut state, "no-such-command-xyz")
            .is_none());
    }

    #[test]
    fn explicit_path_bypasses_search() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        assert!(engine.resolve_command(&mut state, "/bin/sh").is_some());
        assert!(state.command_hash.is_empty());
    }

    #[tokio::test]
    async fn runs_true_and_false() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        state.set("PATH", "/usr/bin:/bin").unwrap();
        let mut out = Output::default();
        let status = engine
            .run_external(&mut state, "true", &[], &[], "", &mut out)
            .await
            .unwrap();
        assert_eq!(status, 0);
        let status = engine
            .run_external(&mut state, "false", &[], &[], "", &mut out)
            .await
            .unwrap();
        assert_eq!(status, 1);
    }

    #[tokio::test]
    async fn captures_stdout() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        state.set("PATH", "/usr/bin:/bin").unwrap();
        let mut out = Output::default();
        let status = engine
            .run_external(
                &mut state,
                "echo",
                &["hello".to_string()],
                &[],
                "",
                &mut out,
            )
            .await
            .unwrap();
        assert_eq!(status, 0);
        assert_eq!(out.stdout, "hello\n");
    }

    #[tokio::test]
    async fn stdin_feeds_child() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        state.set("PATH", "/usr/bin:/bin").unwrap();
        let mut out = Output::default();
        let status = engine
            .run_external(&mut state, "cat", &[], &[], "piped\n", &mut out)
            .await
            .unwrap();
        assert_eq!(status, 0);
        assert_eq!(out.stdout, "piped\n");
    }

    #[tokio::test]
    async fn not_found_is_127() {
        let engine = Engine::new();
        let mut state = ShellState::new();
        state.set("PATH", "/nonexistent-dir-xyz").unwrap();
        let mut out = Output::default();
        let status = engine
            .run_external(&mut state, "no-such-cmd", &[], &[], "", &mut out)
            .await
            .unwrap();
        assert_eq!(status, 127);
        assert!(out.stderr.contains("command not found"));
    }
}
