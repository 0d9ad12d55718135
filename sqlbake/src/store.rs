//! Entry Store
//!
//! Accumulates the compiled queries of one run. Entries are keyed by the
//! exact query text: recording a query a second time is a no-op and the
//! first fragment wins. Two different queries with the same hash are both
//! kept and later share a bucket.

use std::collections::HashSet;
use std::fmt;

use crate::hash::QueryHash;

/// Generated source implementing one query, as produced by an oracle.
///
/// Opaque to the emitter, which copies it verbatim.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct CodeFragment(String);

impl CodeFragment {
    /// Wraps generated source text.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the source text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the fragment has no text.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for CodeFragment {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CodeFragment {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Debug for CodeFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeFragment({} bytes)", self.0.len())
    }
}

/// One compiled query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Hash of `original`
    pub hash: QueryHash,
    /// The query text recognized at runtime
    pub original: String,
    /// The code run when `original` is recognized
    pub fragment: CodeFragment,
}

/// Append-only, duplicate-suppressing entry collection.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: Vec<Entry>,
    seen: HashSet<String>,
}

impl EntryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a compiled query.
    ///
    /// Returns `false` without touching the store if `original` was
    /// already recorded.
    pub fn record(&mut self, original: &str, fragment: CodeFragment) -> bool {
        if self.seen.contains(original) {
            return false;
        }
        self.seen.insert(original.to_string());
        self.entries.push(Entry {
            hash: QueryHash::of_str(original),
            original: original.to_string(),
            fragment,
        });
        true
    }

    /// Returns true if `original` has been recorded.
    pub fn contains(&self, original: &str) -> bool {
        self.seen.contains(original)
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in ascending hash order, ties in insertion order.
    pub fn all_entries(&self) -> Vec<&Entry> {
        let mut sorted: Vec<&Entry> = self.entries.iter().collect();
        // Stable: equal hashes keep insertion order.
        sorted.sort_by_key(|entry| entry.hash);
        sorted
    }

    /// Entries grouped into runs sharing a hash, in ascending hash order.
    pub fn buckets(&self) -> Vec<(QueryHash, Vec<&Entry>)> {
        self.all_entries()
            .chunk_by(|a, b| a.hash == b.hash)
            .map(|run| (run[0].hash, run.to_vec()))
            .collect()
    }
}
