use serde::{Deserialize, Serialize};

/// Set of caller identifiers permitted to start a batch.
///
/// Entries are matched case-insensitively and support `*` wildcards.
/// An empty allowlist denies everyone; it never means "open".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Allowlist {
    entries: Vec<String>,
}

impl Allowlist {
    pub fn new(entries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.into().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether `caller` matches any entry.
    pub fn permits(&self, caller: &str) -> bool {
        let caller = caller.trim().to_lowercase();
        self.entries.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, &caller)
            } else {
                *pattern == caller
            }
        })
    }
}

impl From<Vec<String>> for Allowlist {
    fn from(entries: Vec<String>) -> Self {
        Self::new(entries)
    }
}

impl From<Allowlist> for Vec<String> {
    fn from(list: Allowlist) -> Self {
        list.entries
    }
}

/// Glob matching supporting `*` as a wildcard for any sequence of chars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() < 2 {
        return pattern == text;
    }
    let first = parts[0];
    let last = parts[parts.len() - 1];

    if !text.starts_with(first) {
        return false;
    }
    let mut pos = first.len();

    let middle = &parts[1..parts.len() - 1];
    for part in middle.iter().filter(|p| !p.is_empty()) {
        match text[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }

    // The tail must fit after everything consumed so far.
    text.len() >= pos + last.len() && text.ends_with(last)
}
