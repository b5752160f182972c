//! Command history: an in-memory list persisted to `$HISTFILE`, one
//! command per line in insertion order.

use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<String>,
    path: Option<PathBuf>,
}

impl History {
    /// Open a history backed by `path`, loading existing entries.
    pub fn with_file(path: PathBuf) -> Self {
        let entries = std::fs::read_to_string(&path)
            .map(|content| content.lines().map(|l| l.to_string()).collect())
            .unwrap_or_default();
        History {
            entries,
            path: Some(path),
        }
    }

    pub fn add(&mut self, command: &str) {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return;
        }
        if self.entries.last().map(|s| s.as_str()) == Some(trimmed) {
            return;
        }
        self.entries.push(trimmed.to_string());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Write all entries back to the history file.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut file = std::fs::File::create(path)?;
        for entry in &self.entries {
            writeln!(file, "{}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_and_dedups_consecutive() {
        let mut history = History::default();
        history.add("ls");
        history.add("ls");
        history.add("pwd");
        history.add("   ");
        assert_eq!(history.entries(), &["ls", "pwd"]);
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hist");

        let mut history = History::with_file(path.clone());
        history.add("echo one");
        history.add("echo two");
        history.save().unwrap();

        let reloaded = History::with_file(path);
        assert_eq!(reloaded.entries(), &["echo one", "echo two"]);
    }
}
