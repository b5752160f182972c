//! Prompt-string expansion for PS1/PS2/PS4 and `${var@P}`.

use chrono::Local;

use crate::interpreter::state::ShellState;

/// Expand the backslash escapes of a prompt string.
pub fn expand_prompt(state: &ShellState, text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let esc = chars[i + 1];
        i += 2;
        match esc {
            'u' => out.push_str(&state.get("USER").unwrap_or_else(|| "user".to_string())),
            'h' => {
                let host = state.get("HOSTNAME").unwrap_or_default();
                out.push_str(host.split('.').next().unwrap_or(""));
            }
            'H' => out.push_str(&state.get("HOSTNAME").unwrap_or_default()),
            'w' => out.push_str(&contract_home(state, &cwd_display(state))),
            'W' => {
                let cwd = cwd_display(state);
                let contracted = contract_home(state, &cwd);
                if contracted == "~" {
                    out.push('~');
                } else {
                    out.push_str(cwd.rsplit('/').next().unwrap_or(&cwd));
                }
            }
            's' => out.push_str(&state.shell_name),
            '$' => {
                if unsafe { libc::geteuid() } == 0 {
                    out.push('#');
                } else {
                    out.push('$');
                }
            }
            't' => out.push_str(&Local::now().format("%H:%M:%S").to_string()),
            'd' => out.push_str(&Local::now().format("%a %b %d").to_string()),
            '#' => out.push_str(&state.command_number.to_string()),
            '!' => out.push_str(&state.command_number.to_string()),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'e' => out.push('\x1b'),
            '\\' => out.push('\\'),
            // Non-printing delimiters are dropped
            '[' | ']' => {}
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

fn cwd_display(state: &ShellState) -> String {
    state
        .get("PWD")
        .unwrap_or_else(|| state.cwd.display().to_string())
}

fn contract_home(state: &ShellState, path: &str) -> String {
    if let Some(home) = state.get("HOME") {
        if !home.is_empty() {
            if path == home {
                return "~".to_string();
            }
            if let Some(rest) = path.strip_prefix(&format!("{}/", home)) {
                return format!("~/{}", rest);
            }
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_text_passes_through() {
        let state = ShellState::new();
        assert_eq!(expand_prompt(&state, "$ "), "$ ");
    }

    #[test]
    fn newline_and_backslash() {
        let state = ShellState::new();
        assert_eq!(expand_prompt(&state, "a\\nb\\\\"), "a\nb\\");
    }

    #[test]
    fn working_directory_contraction() {
        let mut state = ShellState::new();
        state.set("HOME", "/home/u").unwrap();
        state.set("PWD", "/home/u/src").unwrap();
        assert_eq!(expand_prompt(&state, "\\w"), "~/src");
        assert_eq!(expand_prompt(&state, "\\W"), "src");
    }

    #[test]
    fn user_escape() {
        let mut state = ShellState::new();
        state.set("USER", "alice").unwrap();
        assert_eq!(expand_prompt(&state, "\\u"), "alice");
    }
}
