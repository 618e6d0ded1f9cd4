//! Content hashing and line diffs for `plan` output.

use sha2::{Digest, Sha256};

/// Lines whose value must never appear in a diff
const SECRET_KEYS: &[&str] = &["PrivateKey", "PresharedKey"];

/// Lines of unchanged context kept around each change
const CONTEXT: usize = 2;

/// SHA-256 of `content`, hex encoded
pub fn content_hash(content: &str) -> String {
    Sha256::digest(content.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Replace secret values with a placeholder
pub fn redact(content: &str) -> String {
    content
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            match SECRET_KEYS.iter().find(|key| {
                trimmed
                    .strip_prefix(**key)
                    .is_some_and(|rest| rest.trim_start().starts_with('='))
            }) {
                Some(key) => format!("{} = <redacted>", key),
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine<'a> {
    Same(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

/// Longest-common-subsequence line diff
pub fn line_diff<'a>(old: &'a str, new: &'a str) -> Vec<DiffLine<'a>> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let mut lcs = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(a.len().max(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            out.push(DiffLine::Same(a[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push(DiffLine::Removed(a[i]));
            i += 1;
        } else {
            out.push(DiffLine::Added(b[j]));
            j += 1;
        }
    }
    out.extend(a[i..].iter().map(|l| DiffLine::Removed(*l)));
    out.extend(b[j..].iter().map(|l| DiffLine::Added(*l)));
    out
}

/// Redacted unified-style diff with a little context; empty when equal
pub fn render_diff(old: &str, new: &str) -> String {
    let old = redact(old);
    let new = redact(new);
    let lines = line_diff(&old, &new);

    let changed: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !matches!(l, DiffLine::Same(_)))
        .map(|(i, _)| i)
        .collect();
    if changed.is_empty() {
        return String::new();
    }

    let keep = |i: usize| {
        changed
            .iter()
            .any(|c| i + CONTEXT >= *c && i <= c + CONTEXT)
    };

    let mut out = String::new();
    let mut last: Option<usize> = None;
    for (i, line) in lines.iter().enumerate() {
        if !keep(i) {
            continue;
        }
        if last.is_some_and(|l| i > l + 1) {
            out.push_str("...\n");
        }
        let (mark, text) = match line {
            DiffLine::Same(t) => (' ', t),
            DiffLine::Removed(t) => ('-', t),
            DiffLine::Added(t) => ('+', t),
        };
        out.push(mark);
        out.push_str(text);
        out.push('\n');
        last = Some(i);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn test_diff_marks_changed_lines() {
        let old = "hostname lhr-r001\nrouter bgp 4242421869\n neighbor 172.20.53.97 remote-as 4242423914\n";
        let new = "hostname lhr-r001\nrouter bgp 4242421869\n neighbor 172.20.53.98 remote-as 4242423914\n";
        let diff = render_diff(old, new);
        assert!(diff.contains("- neighbor 172.20.53.97"));
        assert!(diff.contains("+ neighbor 172.20.53.98"));
        assert!(diff.contains(" hostname lhr-r001"));
        assert_eq!(render_diff(old, old), "");
    }

    #[test]
    fn test_private_keys_redacted() {
        let old = "[Interface]\nPrivateKey = b2xkLXNlY3JldA==\nListenPort = 5323\n";
        let new = "[Interface]\nPrivateKey = bmV3LXNlY3JldA==\nListenPort = 5324\n";
        let diff = render_diff(old, new);
        assert!(!diff.contains("b2xkLXNlY3JldA=="));
        assert!(!diff.contains("bmV3LXNlY3JldA=="));
        assert!(diff.contains("+ListenPort = 5324"));
    }

    #[test]
    fn test_distant_hunks_separated() {
        let old: String = (0..20).map(|i| format!("line {}\n", i)).collect();
        let new = old.replace("line 1\n", "line one\n").replace("line 18\n", "line eighteen\n");
        let diff = render_diff(&old, &new);
        assert!(diff.contains("...\n"));
        assert!(!diff.contains("line 10"));
    }
}
