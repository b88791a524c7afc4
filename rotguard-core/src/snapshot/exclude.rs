//! fnmatch-style name patterns (`*`, `?`, `[...]`, `[!...]`), matched against
//! a single file or directory name, case-sensitively.

use regex::RegexSet;

use crate::error::{Result, RotError};

#[derive(Clone, Debug)]
pub struct ExcludeSet {
    patterns: Vec<String>,
    set: RegexSet,
}

impl ExcludeSet {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let set = RegexSet::new(patterns.iter().map(|p| translate(p)))
            .map_err(|e| RotError::Config(format!("bad EXCLUDE_PATTERNS entry: {e}")))?;
        Ok(Self { patterns, set })
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.set.is_match(name)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Compile one fnmatch pattern into an anchored regex.
fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^(?s:");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match bracket_end(&chars, i) {
                Some(end) => {
                    let mut body = &chars[i + 1..end];
                    out.push('[');
                    if let Some(('!', rest)) = body.split_first() {
                        out.push('^');
                        body = rest;
                    }
                    for &c in body {
                        if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                    out.push(']');
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push_str(")$");
    out
}

/// Index of the `]` closing the class opened at `open`. A `]` directly after
/// `[` or `[!` is a literal member.
fn bracket_end(chars: &[char], open: usize) -> Option<usize> {
    let mut j = open + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}
