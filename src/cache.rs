//! Query cache for fetched todo lists
//!
//! Entries are keyed by the exact query signature (mode, filters, paging).
//! The cache never reorders todos; it only stores what the server returned
//! plus whatever optimistic patches are in flight.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::filters::{FilterQuery, ViewMode};
use crate::models::{PaginatedTodosResponse, ScrollTodosResponse, Todo, UpdateTodo};

/// Cache partition for one list query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Paged {
        filters: FilterQuery,
        page: u32,
        limit: u32,
    },
    Scroll {
        filters: FilterQuery,
        limit: u32,
    },
}

impl QueryKey {
    pub fn paged(filters: FilterQuery, page: u32, limit: u32) -> Self {
        QueryKey::Paged {
            filters,
            page,
            limit,
        }
    }

    pub fn scroll(filters: FilterQuery, limit: u32) -> Self {
        QueryKey::Scroll { filters, limit }
    }

    pub fn mode(&self) -> ViewMode {
        match self {
            QueryKey::Paged { .. } => ViewMode::Page,
            QueryKey::Scroll { .. } => ViewMode::Scroll,
        }
    }
}

/// Pages of a scrolled list, in fetch order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrollPages {
    pub pages: Vec<ScrollTodosResponse>,
}

impl ScrollPages {
    pub fn todos(&self) -> impl Iterator<Item = &Todo> {
        self.pages.iter().flat_map(|page| page.todos.iter())
    }

    pub fn has_next_page(&self) -> bool {
        self.pages.last().is_some_and(|page| page.has_next_page)
    }

    /// Cursor for the page after the last one fetched
    pub fn next_cursor(&self) -> Option<&str> {
        self.pages
            .last()
            .filter(|page| page.has_next_page)
            .and_then(|page| page.next_cursor.as_deref())
    }
}

/// Cached payload for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheData {
    Paged(PaginatedTodosResponse),
    Scroll(ScrollPages),
}

impl CacheData {
    /// Insert a new todo at the top of the list.
    ///
    /// Scrolled lists only grow their first page.
    pub fn prepend(&mut self, todo: Todo) {
        match self {
            CacheData::Paged(data) => {
                data.todos.insert(0, todo);
                data.total_todos += 1;
            }
            CacheData::Scroll(scroll) => {
                if let Some(first) = scroll.pages.first_mut() {
                    first.todos.insert(0, todo);
                }
            }
        }
    }

    /// Patch the todo with `id` in place; returns whether it was found
    pub fn update(&mut self, id: &str, updates: &UpdateTodo) -> bool {
        let mut found = false;
        for todo in self.todos_mut().filter(|todo| todo.id == id) {
            todo.apply(updates);
            found = true;
        }
        found
    }

    /// Drop the todo with `id`.
    ///
    /// The paged total always goes down by one (never below zero): the
    /// todo may sit on another page of the same view.
    pub fn remove(&mut self, id: &str) -> bool {
        match self {
            CacheData::Paged(data) => {
                let before = data.todos.len();
                data.todos.retain(|todo| todo.id != id);
                data.total_todos = data.total_todos.saturating_sub(1);
                data.todos.len() != before
            }
            CacheData::Scroll(scroll) => {
                let mut removed = false;
                for page in &mut scroll.pages {
                    let before = page.todos.len();
                    page.todos.retain(|todo| todo.id != id);
                    removed |= page.todos.len() != before;
                }
                removed
            }
        }
    }

    pub fn find(&self, id: &str) -> Option<&Todo> {
        match self {
            CacheData::Paged(data) => data.todos.iter().find(|todo| todo.id == id),
            CacheData::Scroll(scroll) => scroll.todos().find(|todo| todo.id == id),
        }
    }

    fn todos_mut(&mut self) -> Box<dyn Iterator<Item = &mut Todo> + '_> {
        match self {
            CacheData::Paged(data) => Box::new(data.todos.iter_mut()),
            CacheData::Scroll(scroll) => {
                Box::new(scroll.pages.iter_mut().flat_map(|page| page.todos.iter_mut()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub data: CacheData,
    fetched_at: Instant,
    last_accessed: Instant,
    invalidated: bool,
}

impl CacheEntry {
    fn new(data: CacheData) -> Self {
        let now = Instant::now();
        Self {
            data,
            fetched_at: now,
            last_accessed: now,
            invalidated: false,
        }
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }
}

/// Copy of every list entry, taken right before an optimistic patch
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: Vec<(QueryKey, CacheEntry)>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identifies one in-flight fetch. Only the newest ticket for a key may
/// write its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

#[derive(Debug)]
pub struct QueryCache {
    entries: HashMap<QueryKey, CacheEntry>,
    in_flight: HashMap<QueryKey, FetchTicket>,
    next_ticket: u64,
    stale_time: Duration,
    gc_time: Duration,
}

impl QueryCache {
    pub fn new(stale_time: Duration, gc_time: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            next_ticket: 0,
            stale_time,
            gc_time,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn peek(&self, key: &QueryKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Read an entry, counting it as used for garbage collection
    pub fn get(&mut self, key: &QueryKey) -> Option<&CacheData> {
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = Instant::now();
        Some(&entry.data)
    }

    /// Present, not invalidated, and younger than the freshness window
    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.entries.get(key).is_some_and(|entry| {
            !entry.invalidated && entry.fetched_at.elapsed() < self.stale_time
        })
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Register a fetch for `key`, superseding any fetch already running
    pub fn begin_fetch(&mut self, key: &QueryKey) -> FetchTicket {
        self.next_ticket += 1;
        let ticket = FetchTicket(self.next_ticket);
        self.in_flight.insert(key.clone(), ticket);
        ticket
    }

    fn finish_fetch(&mut self, key: &QueryKey, ticket: FetchTicket) -> bool {
        if self.in_flight.get(key) == Some(&ticket) {
            self.in_flight.remove(key);
            true
        } else {
            false
        }
    }

    /// Store a full fetch result. Returns false (and stores nothing) when
    /// the ticket has been superseded.
    pub fn complete_fetch(&mut self, key: &QueryKey, ticket: FetchTicket, data: CacheData) -> bool {
        if !self.finish_fetch(key, ticket) {
            return false;
        }
        self.entries.insert(key.clone(), CacheEntry::new(data));
        true
    }

    /// Append a continuation page to a scrolled entry
    pub fn append_page(
        &mut self,
        key: &QueryKey,
        ticket: FetchTicket,
        page: ScrollTodosResponse,
    ) -> bool {
        if !self.finish_fetch(key, ticket) {
            return false;
        }
        match self.entries.get_mut(key) {
            Some(CacheEntry {
                data: CacheData::Scroll(scroll),
                last_accessed,
                ..
            }) => {
                scroll.pages.push(page);
                *last_accessed = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Forget a failed fetch
    pub fn abandon_fetch(&mut self, key: &QueryKey, ticket: FetchTicket) {
        self.finish_fetch(key, ticket);
    }

    /// Drop every in-flight ticket so their results are discarded
    pub fn cancel_fetches(&mut self) {
        self.in_flight.clear();
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self
                .entries
                .iter()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect(),
        }
    }

    /// Put every captured entry back exactly as it was
    pub fn restore(&mut self, snapshot: Snapshot) {
        for (key, entry) in snapshot.entries {
            self.entries.insert(key, entry);
        }
    }

    /// Apply `patch` to every entry; returns how many were touched
    pub fn patch_all(&mut self, mut patch: impl FnMut(&mut CacheData)) -> usize {
        for entry in self.entries.values_mut() {
            patch(&mut entry.data);
        }
        self.entries.len()
    }

    /// Any cached copy of the todo with `id`
    pub fn find_todo(&self, id: &str) -> Option<&Todo> {
        self.entries.values().find_map(|entry| entry.data.find(id))
    }

    /// Mark everything stale; the next read of each key refetches
    pub fn invalidate_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.invalidated = true;
        }
    }

    /// Evict entries unused for longer than the gc window
    pub fn collect_garbage(&mut self) -> usize {
        let before = self.entries.len();
        let gc_time = self.gc_time;
        let in_flight = &self.in_flight;
        self.entries.retain(|key, entry| {
            in_flight.contains_key(key) || entry.last_accessed.elapsed() < gc_time
        });
        before - self.entries.len()
    }
}
