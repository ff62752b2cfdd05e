//! Bounded, newest-first list of recently generated image references

use serde::Serialize;
use std::collections::VecDeque;

/// Number of references kept
pub const HISTORY_LIMIT: usize = 5;

/// Recent image references, newest first
#[derive(Debug, Clone, Default, Serialize)]
pub struct History {
    entries: VecDeque<String>,
}

impl History {
    /// Empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a reference, evicting the oldest past [`HISTORY_LIMIT`].
    pub fn push(&mut self, reference: impl Into<String>) {
        self.entries.push_front(reference.into());
        self.entries.truncate(HISTORY_LIMIT);
    }

    /// Entries, newest first
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&str> {
        self.entries.front().map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been generated yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
