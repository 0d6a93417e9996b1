//! Turning cached pages into the list that gets rendered

use std::fmt;

use crate::cache::ScrollPages;
use crate::filters::{FilterQuery, Tab, ViewMode};
use crate::models::{PaginatedTodosResponse, ScrollTodosResponse, Todo};

/// Page-mode metadata reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub current_page: u32,
    pub total_todos: u64,
    pub has_next_page: bool,
}

/// The flat, ordered list for the active view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledList {
    pub mode: ViewMode,
    pub todos: Vec<Todo>,
    pub limit: u32,
    pub has_next_page: bool,
    /// Present in page mode only
    pub page: Option<PageInfo>,
    /// Noun used in the footer
    pub label: &'static str,
}

impl Default for AssembledList {
    fn default() -> Self {
        Self {
            mode: ViewMode::default(),
            todos: Vec::new(),
            limit: 10,
            has_next_page: false,
            page: None,
            label: "todos",
        }
    }
}

impl AssembledList {
    pub fn from_paged(data: &PaginatedTodosResponse, current_page: u32, limit: u32) -> Self {
        Self {
            mode: ViewMode::Page,
            todos: data.todos.clone(),
            limit,
            has_next_page: data.has_next_page,
            page: Some(PageInfo {
                current_page,
                total_todos: data.total_todos,
                has_next_page: data.has_next_page,
            }),
            label: "todos",
        }
    }

    pub fn from_scroll(pages: &ScrollPages, limit: u32) -> Self {
        Self {
            mode: ViewMode::Scroll,
            todos: flatten_pages(&pages.pages),
            limit,
            has_next_page: pages.has_next_page(),
            page: None,
            label: "todos",
        }
    }

    /// Use the wording of the given tab in the footer
    pub fn for_tab(mut self, tab: Tab) -> Self {
        self.label = match tab {
            Tab::Completed => "completed todos",
            Tab::Today | Tab::Upcoming => "todos",
        };
        self
    }

    /// Number shown to the user: what is on screen, not the server total
    pub fn count(&self) -> usize {
        self.todos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    /// Index of the item whose visibility loads the next page
    pub fn trigger_index(&self) -> Option<usize> {
        match self.mode {
            ViewMode::Scroll => scroll_trigger_index(self.todos.len(), self.limit),
            ViewMode::Page => None,
        }
    }

    pub fn is_trigger(&self, index: usize) -> bool {
        self.trigger_index() == Some(index)
    }

    /// Called when the item at `visible_index` scrolls into view
    pub fn should_fetch_next(&self, visible_index: usize, fetch_in_flight: bool) -> bool {
        self.is_trigger(visible_index) && self.has_next_page && !fetch_in_flight
    }

    pub fn footer(&self) -> Option<PageFooter> {
        let page = self.page?;
        Some(PageFooter {
            shown: self.todos.len(),
            total: page.total_todos,
            current_page: page.current_page,
            can_prev: page.current_page > 1,
            can_next: page.has_next_page,
            label: self.label,
        })
    }
}

/// Concatenate pages in fetch order
pub fn flatten_pages(pages: &[ScrollTodosResponse]) -> Vec<Todo> {
    pages.iter().flat_map(|page| page.todos.iter().cloned()).collect()
}

/// Last item of the last complete page, i.e. the largest index whose
/// position (index + 1) is a multiple of `limit`.
pub fn scroll_trigger_index(len: usize, limit: u32) -> Option<usize> {
    let limit = limit as usize;
    if limit == 0 {
        return None;
    }
    let complete = len / limit * limit;
    complete.checked_sub(1)
}

/// Pagination controls for page mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFooter {
    pub shown: usize,
    pub total: u64,
    pub current_page: u32,
    pub can_prev: bool,
    pub can_next: bool,
    label: &'static str,
}

impl fmt::Display for PageFooter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Showing {} of {} {}", self.shown, self.total, self.label)
    }
}

/// Why a list came back empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyState {
    NoSearchResults { query: String },
    NoFilterResults,
    NothingYet,
}

impl EmptyState {
    /// Date bounds are ignored: the today/upcoming tabs always set them.
    pub fn classify(filters: &FilterQuery) -> Self {
        match filters.search.as_deref() {
            Some(query) if !query.is_empty() => EmptyState::NoSearchResults {
                query: query.to_string(),
            },
            _ if filters.has_active_filters() => EmptyState::NoFilterResults,
            _ => EmptyState::NothingYet,
        }
    }

    pub fn title(&self) -> String {
        match self {
            EmptyState::NoSearchResults { query } => format!("No todos found for \"{}\"", query),
            EmptyState::NoFilterResults => "No todos found".to_string(),
            EmptyState::NothingYet => "Nothing to do yet!".to_string(),
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            EmptyState::NoSearchResults { .. } => "Try a different keyword.",
            EmptyState::NoFilterResults => "Try adjusting your filters to see more todos.",
            EmptyState::NothingYet => "Get started by adding your first todo!",
        }
    }
}
