//! Filter and view state
//!
//! `ViewStore` is the single writer for the active filters and pagination
//! settings. Every change is published on a watch channel so the list view
//! (or anything else) can react to it.

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::SyncError;
use crate::models::Priority;

/// Field the server sorts by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Date,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// How the list is consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Page,
    #[default]
    Scroll,
}

macro_rules! lowercase_enum_str {
    ($ty:ty, $what:literal, { $($variant:path => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $name,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = SyncError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    _ => Err(SyncError::Validation(format!("unknown {} '{}'", $what, s))),
                }
            }
        }
    };
}

lowercase_enum_str!(SortField, "sort field", {
    SortField::Date => "date",
    SortField::Priority => "priority",
});

lowercase_enum_str!(SortOrder, "sort order", {
    SortOrder::Asc => "asc",
    SortOrder::Desc => "desc",
});

lowercase_enum_str!(ViewMode, "view mode", {
    ViewMode::Page => "page",
    ViewMode::Scroll => "scroll",
});

lowercase_enum_str!(Tab, "tab", {
    Tab::Today => "today",
    Tab::Upcoming => "upcoming",
    Tab::Completed => "completed",
});

/// Server-side filter parameters.
///
/// Two queries with the same field values hash and compare equal, which is
/// what makes this usable as the cache partition key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterQuery {
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub date_gte: Option<DateTime<Utc>>,
    pub date_lte: Option<DateTime<Utc>>,
    pub sort: Option<SortField>,
    pub order: SortOrder,
    pub search: Option<String>,
}

impl FilterQuery {
    /// The query actually issued for a tab.
    ///
    /// The completed tab shows every completed todo regardless of date.
    pub fn for_tab(&self, tab: Tab) -> FilterQuery {
        match tab {
            Tab::Completed => FilterQuery {
                completed: Some(true),
                date_gte: None,
                date_lte: None,
                ..self.clone()
            },
            Tab::Today | Tab::Upcoming => self.clone(),
        }
    }

    /// Non-date filters that narrow the list (search excluded)
    pub fn has_active_filters(&self) -> bool {
        self.priority.is_some() || self.completed.is_some()
    }
}

/// Pagination settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewState {
    pub mode: ViewMode,
    pub current_page: u32,
    pub limit: u32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            mode: ViewMode::Scroll,
            current_page: 1,
            limit: 10,
        }
    }
}

/// Everything a list read depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    pub filters: FilterQuery,
    pub view: ViewState,
}

/// Top-level list views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tab {
    #[default]
    Today,
    Upcoming,
    Completed,
}

/// Single-writer state container for filters and view settings
pub struct ViewStore {
    tx: watch::Sender<AppState>,
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new(ViewState::default())
    }
}

impl ViewStore {
    pub fn new(view: ViewState) -> Self {
        let (tx, _rx) = watch::channel(AppState {
            filters: FilterQuery::default(),
            view,
        });
        Self { tx }
    }

    pub fn state(&self) -> AppState {
        self.tx.borrow().clone()
    }

    pub fn filters(&self) -> FilterQuery {
        self.tx.borrow().filters.clone()
    }

    pub fn view(&self) -> ViewState {
        self.tx.borrow().view
    }

    /// Receive every state change from now on
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }

    /// Apply a change; subscribers are only woken if something changed.
    fn update(&self, f: impl FnOnce(&mut AppState)) {
        self.tx.send_if_modified(|state| {
            let before = state.clone();
            f(state);
            *state != before
        });
    }

    pub fn set_completed(&self, completed: Option<bool>) {
        self.update(|s| s.filters.completed = completed);
    }

    pub fn set_priority(&self, priority: Option<Priority>) {
        self.update(|s| s.filters.priority = priority);
    }

    pub fn set_date_gte(&self, date: Option<DateTime<Utc>>) {
        self.update(|s| s.filters.date_gte = date);
    }

    pub fn set_date_lte(&self, date: Option<DateTime<Utc>>) {
        self.update(|s| s.filters.date_lte = date);
    }

    /// Set both date bounds as one change
    pub fn set_date_range(&self, gte: Option<DateTime<Utc>>, lte: Option<DateTime<Utc>>) {
        self.update(|s| {
            s.filters.date_gte = gte;
            s.filters.date_lte = lte;
        });
    }

    pub fn set_sort(&self, sort: Option<SortField>) {
        self.update(|s| s.filters.sort = sort);
    }

    pub fn set_order(&self, order: SortOrder) {
        self.update(|s| s.filters.order = order);
    }

    /// Blank search text is the same query as no search
    pub fn set_search(&self, search: Option<String>) {
        let search = search.filter(|text| !text.trim().is_empty());
        self.update(|s| s.filters.search = search);
    }

    pub fn reset_filters(&self) {
        self.update(|s| s.filters = FilterQuery::default());
    }

    /// Switching modes always starts over at page 1
    pub fn set_view_mode(&self, mode: ViewMode) {
        self.update(|s| {
            s.view.mode = mode;
            s.view.current_page = 1;
        });
    }

    pub fn set_current_page(&self, page: u32) {
        self.update(|s| s.view.current_page = page);
    }

    pub fn set_limit(&self, limit: u32) {
        self.update(|s| s.view.limit = limit);
    }

    /// Callers must not advance past the last known page.
    pub fn next_page(&self) {
        self.update(|s| s.view.current_page = s.view.current_page.saturating_add(1));
    }

    pub fn prev_page(&self) {
        self.update(|s| {
            if s.view.current_page > 1 {
                s.view.current_page -= 1;
            }
        });
    }

    /// Point the date filters at a tab, using the local clock.
    pub fn select_tab(&self, tab: Tab) {
        self.select_tab_in(tab, Local::now().date_naive(), &Local);
    }

    /// Upcoming leaves the bounds alone; its `UpcomingCursor` owns them.
    pub fn select_tab_in<Tz: TimeZone>(&self, tab: Tab, today: NaiveDate, tz: &Tz) {
        match tab {
            Tab::Today => {
                let (start, end) = day_bounds(today, tz);
                self.set_date_range(Some(start), Some(end));
            }
            Tab::Completed => self.set_date_range(None, None),
            Tab::Upcoming => {}
        }
    }
}

/// First and last millisecond of `date` in `tz`, as UTC instants
pub fn day_bounds<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = resolve_local(tz, date.and_time(NaiveTime::MIN));
    let next = resolve_local(tz, (date + Days::new(1)).and_time(NaiveTime::MIN));
    (start, next - chrono::Duration::milliseconds(1))
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    // Midnight can fall in a DST gap; fall back to reading it as UTC
    tz.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        .with_timezone(&Utc)
}

/// Day picker for the upcoming tab
#[derive(Debug, Clone)]
pub struct UpcomingCursor<Tz: TimeZone = Local> {
    tz: Tz,
    selected: NaiveDate,
}

impl UpcomingCursor<Local> {
    /// Start on today's date in local time
    pub fn today() -> Self {
        Self::new(Local, Local::now().date_naive())
    }
}

impl<Tz: TimeZone> UpcomingCursor<Tz> {
    pub fn new(tz: Tz, selected: NaiveDate) -> Self {
        Self { tz, selected }
    }

    pub fn selected(&self) -> NaiveDate {
        self.selected
    }

    /// Header label, e.g. "Mar 1, 2024"
    pub fn label(&self) -> String {
        self.selected.format("%b %-d, %Y").to_string()
    }

    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        day_bounds(self.selected, &self.tz)
    }

    /// Push the selected day's bounds into the store
    pub fn apply(&self, store: &ViewStore) {
        let (start, end) = self.bounds();
        store.set_date_range(Some(start), Some(end));
    }

    pub fn select(&mut self, date: NaiveDate, store: &ViewStore) {
        self.selected = date;
        self.apply(store);
    }

    pub fn next_day(&mut self, store: &ViewStore) {
        self.select(self.selected + Days::new(1), store);
    }

    pub fn prev_day(&mut self, store: &ViewStore) {
        self.select(self.selected - Days::new(1), store);
    }

    pub fn jump_to_today(&mut self, today: NaiveDate, store: &ViewStore) {
        self.select(today, store);
    }
}
