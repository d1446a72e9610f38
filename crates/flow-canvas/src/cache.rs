//! Time-windowed records of local mutations
//!
//! A manager stamps every locally added or removed id with the time of the
//! mutation. Until a snapshot fetch that started after the mutation has been
//! applied, the snapshot cannot be trusted to know about it:
//!
//! - an id in `added` is not deleted by a snapshot that omits it
//! - an id in `removed` is not re-added by a snapshot that still lists it
//!
//! The clock is never read here. Callers pass the mutation time and the
//! expiry cutoff explicitly, so reconciliation is deterministic under test.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Ids mutated locally, each with the time of the mutation
#[derive(Debug, Clone, Default)]
pub struct MutationCache {
    entries: HashMap<String, DateTime<Utc>>,
}

impl MutationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation of `id` at `at`, replacing any earlier stamp
    pub fn stamp(&mut self, id: impl Into<String>, at: DateTime<Utc>) {
        self.entries.insert(id.into(), at);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn stamped_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(id).copied()
    }

    pub fn forget(&mut self, id: &str) {
        self.entries.remove(id);
    }

    /// Drop every entry stamped strictly before `cutoff`
    ///
    /// Returns the number of entries removed.
    pub fn expire(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, stamped| *stamped >= cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The pair of caches a manager consults during reconciliation
#[derive(Debug, Clone, Default)]
pub struct RecentMutations {
    pub added: MutationCache,
    pub removed: MutationCache,
}

impl RecentMutations {
    pub fn record_added(&mut self, id: &str, at: DateTime<Utc>) {
        self.removed.forget(id);
        self.added.stamp(id, at);
    }

    pub fn record_removed(&mut self, id: &str, at: DateTime<Utc>) {
        self.added.forget(id);
        self.removed.stamp(id, at);
    }

    /// Expire both caches against the same cutoff
    pub fn expire(&mut self, cutoff: DateTime<Utc>) -> usize {
        self.added.expire(cutoff) + self.removed.expire(cutoff)
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.removed.clear();
    }
}
