//! State container owning one live list, the filter the page is showing
//! and the refresh requests still outstanding.

use super::entry::LiveEntry;
use super::list::{apply_push, apply_refresh, apply_upsert, LiveList};
use crate::domain::event::LiveEvent;
use std::collections::BTreeSet;
use tracing::debug;

/// Identifies one issued refresh request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(u64);

pub struct LiveState<T> {
    list: LiveList<T>,
    filter: Option<String>,
    next_ticket: u64,
    in_flight: BTreeSet<FetchTicket>,
    keyed: bool,
}

impl<T: LiveEntry> LiveState<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            list: LiveList::new(max_size),
            filter: None,
            next_ticket: 0,
            in_flight: BTreeSet::new(),
            keyed: false,
        }
    }

    /// State whose pushes replace an older row with the same key
    pub fn keyed(max_size: usize) -> Self {
        Self {
            keyed: true,
            ..Self::new(max_size)
        }
    }

    pub fn list(&self) -> &LiveList<T> {
        &self.list
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Change the filter; the caller must fetch with the returned ticket
    pub fn set_filter(&mut self, filter: Option<String>) -> FetchTicket {
        self.filter = filter;
        self.begin_refresh()
    }

    pub fn begin_refresh(&mut self) -> FetchTicket {
        let ticket = FetchTicket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight.insert(ticket);
        ticket
    }

    /// Apply a completed fetch. The latest completion always wins, even
    /// when a newer request was issued before it; returns false in that case.
    /// Tickets that were never issued or already settled are ignored.
    pub fn complete_refresh(&mut self, ticket: FetchTicket, items: Vec<T>) -> bool {
        if !self.in_flight.remove(&ticket) {
            debug!("Ignoring completion for unknown refresh {:?}", ticket);
            return false;
        }
        let superseded = self.in_flight.iter().any(|pending| *pending > ticket);
        if superseded {
            debug!("Applying refresh {:?} while a newer one is pending", ticket);
        }
        self.list = apply_refresh(&self.list, items);
        !superseded
    }

    pub fn fail_refresh(&mut self, ticket: FetchTicket) {
        self.in_flight.remove(&ticket);
    }

    pub fn is_loading(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Prepend an entry. Pushes ignore the active filter.
    pub fn push(&mut self, entry: T) {
        self.list = if self.keyed {
            apply_upsert(&self.list, entry)
        } else {
            apply_push(&self.list, entry)
        };
    }

    /// Push the event if it normalizes to this entry type
    pub fn apply_event(&mut self, event: &LiveEvent) -> bool {
        match T::from_event(event) {
            Some(entry) => {
                self.push(entry);
                true
            }
            None => false,
        }
    }
}
