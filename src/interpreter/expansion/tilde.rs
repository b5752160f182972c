//! Tilde expansion: `~`, `~+`, `~-`, `~user`.

use crate::interpreter::state::ShellState;

/// Expand a tilde prefix. Returns the literal tilde text when the
/// expansion has no value (unknown user, unset OLDPWD).
pub fn expand_tilde(state: &ShellState, user: Option<&str>) -> String {
    match user {
        None => state
            .get("HOME")
            .unwrap_or_else(|| "~".to_string()),
        Some("+") => state
            .get("PWD")
            .unwrap_or_else(|| state.cwd.display().to_string()),
        Some("-") => state.get("OLDPWD").unwrap_or_else(|| "~-".to_string()),
        Some(name) => home_for_user(name).unwrap_or_else(|| format!("~{}", name)),
    }
}

/// Look up a user's home directory in /etc/passwd.
fn home_for_user(name: &str) -> Option<String> {
    let passwd = std::fs::read_to_string("/etc/passwd").ok()?;
    for line in passwd.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.first() == Some(&name) {
            return fields.get(5).map(|s| s.to_string());
        }
    }
    None
}
