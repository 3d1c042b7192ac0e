//! Bounded newest-first list and the pure reducers that fold pushes and
//! refresh responses into it.

use super::entry::LiveEntry;
use serde::Serialize;
use std::collections::VecDeque;

/// Newest-first list holding at most `max_size` entries.
///
/// Arrival order is the only ordering; entries are never re-sorted by
/// payload timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveList<T> {
    items: VecDeque<T>,
    max_size: usize,
}

impl<T> LiveList<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Build from entries already ordered newest-first, keeping the first `max_size`
    pub fn from_items(items: Vec<T>, max_size: usize) -> Self {
        let mut items = VecDeque::from(items);
        items.truncate(max_size);
        Self { items, max_size }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Most recent entry
    pub fn newest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> LiveList<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// Fold one pushed entry into `current`: prepend, then truncate to `max_size`.
///
/// Entries that share a key are kept as separate rows; the list is always
/// the last `max_size` pushes in arrival order.
pub fn apply_push<T: Clone>(current: &LiveList<T>, entry: T) -> LiveList<T> {
    let mut items = VecDeque::with_capacity(current.max_size.saturating_add(1));
    items.push_back(entry);
    items.extend(current.items.iter().cloned());
    items.truncate(current.max_size);

    LiveList {
        items,
        max_size: current.max_size,
    }
}

/// Keyed variant of [`apply_push`].
///
/// An older entry with the same key is removed and absorbed into the new
/// one, so a row moves to the front instead of appearing twice.
pub fn apply_upsert<T: LiveEntry>(current: &LiveList<T>, mut entry: T) -> LiveList<T> {
    let key = entry.key();
    let mut items = VecDeque::with_capacity(current.max_size);

    for existing in current.items.iter() {
        if existing.key() == key {
            entry.absorb(existing);
        } else {
            items.push_back(existing.clone());
        }
    }

    items.push_front(entry);
    items.truncate(current.max_size);

    LiveList {
        items,
        max_size: current.max_size,
    }
}

/// Replace `current` wholesale with a fetched page (newest-first)
pub fn apply_refresh<T>(current: &LiveList<T>, response: Vec<T>) -> LiveList<T> {
    LiveList::from_items(response, current.max_size)
}
