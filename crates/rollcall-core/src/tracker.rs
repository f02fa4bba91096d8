//! Per-session record of who has already been marked present.

use std::collections::HashSet;

/// Identities already logged during the current recognition session.
///
/// Grows monotonically and is dropped with the session; nothing is persisted.
#[derive(Debug, Default, Clone)]
pub struct SessionTracker {
    marked: HashSet<String>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn already_marked(&self, name: &str) -> bool {
        self.marked.contains(name)
    }

    /// Record `name` as logged. Returns `false` if it was already marked.
    pub fn mark(&mut self, name: &str) -> bool {
        self.marked.insert(name.to_string())
    }

    pub fn len(&self) -> usize {
        self.marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }

    /// Marked names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.marked.iter().cloned().collect();
        names.sort();
        names
    }
}
