//! Pathname expansion.
//!
//! The pattern arrives with quoted bytes backslash-escaped, so only the
//! unquoted metacharacters are active. Each `/`-separated component either
//! descends literally or filters a directory listing through the shared
//! pattern matcher. `*`, `?`, and brackets never match a leading dot.

use std::path::{Path, PathBuf};

use crate::interpreter::expansion::pattern::{fnmatch, has_glob_chars, unescape_glob};

/// Expand a glob pattern against the filesystem, relative to `cwd`.
/// Returns matches sorted; empty when nothing matches.
pub fn glob_expand(cwd: &Path, pattern: &str) -> Vec<String> {
    let trailing_slash = pattern.ends_with('/');
    let absolute = pattern.starts_with('/');

    let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return if absolute && Path::new("/").is_dir() {
            vec!["/".to_string()]
        } else {
            Vec::new()
        };
    }

    // (filesystem path, display string)
    let mut current: Vec<(PathBuf, String)> = vec![if absolute {
        (PathBuf::from("/"), String::new())
    } else {
        (cwd.to_path_buf(), String::new())
    }];

    for (ci, component) in components.iter().enumerate() {
        let last = ci == components.len() - 1;
        let mut next = Vec::new();

        if has_glob_chars(component) {
            let matches_leading_dot =
                component.starts_with('.') || component.starts_with("\\.");
            for (dir, display) in &current {
                let mut names: Vec<String> = match std::fs::read_dir(dir) {
                    Ok(entries) => entries
                        .filter_map(|e| e.ok())
                        .filter_map(|e| e.file_name().into_string().ok())
                        .collect(),
                    Err(_) => continue,
                };
                names.sort();
                for name in names {
                    if name.starts_with('.') && !matches_leading_dot {
                        continue;
                    }
                    if !fnmatch(component, &name, false) {
                        continue;
                    }
                    let path = dir.join(&name);
                    if !last && !path.is_dir() {
                        continue;
                    }
                    if last && trailing_slash && !path.is_dir() {
                        continue;
                    }
                    next.push((path, join_display(display, &name, absolute)));
                }
            }
        } else {
            let literal = unescape_glob(component);
            for (dir, display) in &current {
                let path = dir.join(&literal);
                if last {
                    if std::fs::symlink_metadata(&path).is_err() {
                        continue;
                    }
                    if trailing_slash && !path.is_dir() {
                        continue;
                    }
                } else if !path.is_dir() {
                    continue;
                }
                next.push((path, join_display(display, &literal, absolute)));
            }
        }

        current = next;
        if current.is_empty() {
            return Vec::new();
        }
    }

    let mut results: Vec<String> = current
        .into_iter()
        .map(|(_, mut display)| {
            if trailing_slash {
                display.push('/');
            }
            display
        })
        .collect();
    results.sort();
    results
}

fn join_display(prefix: &str, name: &str, absolute: bool) -> String {
    if prefix.is_empty() {
        if absolute {
            format!("/{}", name)
        } else {
            name.to_string()
        }
    } else {
        format!("{}/{}", prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("c.log"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("inner.txt"), "").unwrap();
        dir
    }

    #[test]
    fn star_matches_sorted() {
        let dir = setup();
        assert_eq!(
            glob_expand(dir.path(), "*.txt"),
            vec!["a.txt", "b.txt"]
        );
    }

    #[test]
    fn question_mark_component() {
        let dir = setup();
        assert_eq!(glob_expand(dir.path(), "?.log"), vec!["c.log"]);
    }

    #[test]
    fn hidden_files_need_literal_dot() {
        let dir = setup();
        assert!(glob_expand(dir.path(), "*").iter().all(|n| n != ".hidden"));
        assert_eq!(glob_expand(dir.path(), ".h*"), vec![".hidden"]);
    }

    #[test]
    fn nested_components() {
        let dir = setup();
        assert_eq!(
            glob_expand(dir.path(), "*/inner.txt"),
            vec!["sub/inner.txt"]
        );
        assert_eq!(
            glob_expand(dir.path(), "sub/*.txt"),
            vec!["sub/inner.txt"]
        );
    }

    #[test]
    fn no_match_is_empty() {
        let dir = setup();
        assert!(glob_expand(dir.path(), "*.nope").is_empty());
    }

    #[test]
    fn escaped_star_is_literal() {
        let dir = setup();
        fs::write(dir.path().join("x*y"), "").unwrap();
        assert_eq!(glob_expand(dir.path(), "x\\*y"), vec!["x*y"]);
    }

    #[test]
    fn trailing_slash_requires_directory() {
        let dir = setup();
        assert_eq!(glob_expand(dir.path(), "s*/"), vec!["sub/"]);
        assert!(glob_expand(dir.path(), "a.txt/").is_empty());
    }
}
