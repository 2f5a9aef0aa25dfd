//! Retention policy
//!

use core::cmp::Ordering;

use crate::storage::Entry;

/// The result of applying the retention policy to a listing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Partition {
    /// The entries that survive, newest first.
    pub keep: Vec<Entry>,

    /// The entries to delete, newest first.
    pub purge: Vec<Entry>,
}

/// Split `entries` into the `retention_count` most recent entries and the rest.
///
/// Entries are ordered by timestamp, newest first, ties broken by name descending so the result
/// does not depend on listing order. Entries without a readable timestamp are treated as the
/// oldest.
pub fn partition(mut entries: Vec<Entry>, retention_count: usize) -> Partition {
    entries.sort_by(newest_first);

    let purge = entries.split_off(retention_count.min(entries.len()));

    Partition {
        keep: entries,
        purge,
    }
}

fn newest_first(a: &Entry, b: &Entry) -> Ordering {
    // `None < Some(_)`, so reversing the comparison puts unknown timestamps last.
    b.modified
        .cmp(&a.modified)
        .then_with(|| b.name.cmp(&a.name))
}
