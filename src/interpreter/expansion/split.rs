//! IFS field splitting.
//!
//! IFS whitespace (the subset of space/tab/newline present in IFS) acts in
//! runs: consecutive whitespace collapses and leading/trailing whitespace
//! trims. A non-whitespace IFS byte is a field terminator on its own, with
//! adjacent IFS whitespace absorbed, so consecutive non-whitespace
//! separators yield empty fields.

/// Result of splitting one splittable segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitResult {
    pub parts: Vec<String>,
    /// Segment began with IFS whitespace (closes a field built so far).
    pub leading_ws: bool,
    /// Segment ended with any IFS delimiter (the next segment starts a new
    /// field).
    pub trailing_delim: bool,
}

/// Split `text` on the IFS class.
pub fn split_ifs(text: &str, ifs: &str) -> SplitResult {
    if ifs.is_empty() || text.is_empty() {
        return SplitResult {
            parts: if text.is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            },
            leading_ws: false,
            trailing_delim: false,
        };
    }

    let is_ws = |c: char| (c == ' ' || c == '\t' || c == '\n') && ifs.contains(c);
    let is_nws = |c: char| ifs.contains(c) && !(c == ' ' || c == '\t' || c == '\n');

    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let leading_ws = is_ws(chars[0]);
    let trailing_delim = ifs.contains(chars[n - 1]);

    let mut parts = Vec::new();
    let mut cur = String::new();
    let mut i = 0;

    // Leading whitespace trims without opening a field
    while i < n && is_ws(chars[i]) {
        i += 1;
    }

    while i < n {
        let c = chars[i];
        if is_nws(c) {
            parts.push(std::mem::take(&mut cur));
            i += 1;
            // Whitespace adjacent to the separator is absorbed
            while i < n && is_ws(chars[i]) {
                i += 1;
            }
        } else if is_ws(c) {
            parts.push(std::mem::take(&mut cur));
            while i < n && is_ws(chars[i]) {
                i += 1;
            }
            // A non-whitespace separator right after the run is the same
            // delimiter
            if i < n && is_nws(chars[i]) {
                i += 1;
                while i < n && is_ws(chars[i]) {
                    i += 1;
                }
                if i >= n {
                    // e.g. "a : " — the trailing nws delimiter leaves no
                    // empty field
                    break;
                }
                if is_nws(chars[i]) {
                    // back-to-back nws separators: loop will handle the
                    // next one and produce the empty field
                    continue;
                }
            }
        } else {
            cur.push(c);
            i += 1;
        }
    }

    if !cur.is_empty() {
        parts.push(cur);
    }

    SplitResult {
        parts,
        leading_ws,
        trailing_delim,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(text: &str, ifs: &str) -> Vec<String> {
        split_ifs(text, ifs).parts
    }

    #[test]
    fn default_ifs_runs() {
        assert_eq!(parts("a b  c", " \t\n"), vec!["a", "b", "c"]);
        assert_eq!(parts("  a  ", " \t\n"), vec!["a"]);
        assert_eq!(parts("a\tb\nc", " \t\n"), vec!["a", "b", "c"]);
    }

    #[test]
    fn non_whitespace_separator_keeps_empties() {
        assert_eq!(parts("a::b", ":"), vec!["a", "", "b"]);
        assert_eq!(parts(":x", ":"), vec!["", "x"]);
        // trailing single separator produces no empty field
        assert_eq!(parts("a:", ":"), vec!["a"]);
        assert_eq!(parts("a::", ":"), vec!["a", ""]);
    }

    #[test]
    fn mixed_ws_and_nws() {
        // ws + nws + ws collapses into one separator
        assert_eq!(parts("a : b", ": "), vec!["a", "b"]);
        assert_eq!(parts("a : : b", ": "), vec!["a", "", "b"]);
        assert_eq!(parts(" :x", ": "), vec!["", "x"]);
    }

    #[test]
    fn empty_ifs_no_split() {
        assert_eq!(parts("a b c", ""), vec!["a b c"]);
    }

    #[test]
    fn all_whitespace_yields_nothing() {
        assert_eq!(parts("   ", " \t\n"), Vec::<String>::new());
    }

    #[test]
    fn flags() {
        let r = split_ifs(" x", " ");
        assert!(r.leading_ws);
        assert!(!r.trailing_delim);
        let r = split_ifs("x:", ":");
        assert!(!r.leading_ws);
        assert!(r.trailing_delim);
        let r = split_ifs(":x", ":");
        assert!(!r.leading_ws); // nws leading is an empty field, not a close
        assert!(r.parts[0].is_empty());
    }
}
