//! A list view bound to the filter store and the sync layer

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use crate::api::TodoBackend;
use crate::assembly::{AssembledList, EmptyState};
use crate::cache::QueryKey;
use crate::error::{MutationKind, Result, SyncError};
use crate::filters::{FilterQuery, Tab, ViewMode, ViewState, ViewStore};
use crate::models::{NewTodo, Todo, UpdateTodo};
use crate::sync::{MutationStatus, TodoSync};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed(String),
}

/// What the list view renders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListState {
    pub status: LoadStatus,
    pub list: AssembledList,
    /// Set when a successful read returned nothing
    pub empty: Option<EmptyState>,
    pub mutation: MutationStatus,
}

pub struct TodoSession<B> {
    store: Arc<ViewStore>,
    sync: Arc<TodoSync<B>>,
    tab: Mutex<Tab>,
    tx: watch::Sender<ListState>,
}

impl<B: TodoBackend> TodoSession<B> {
    pub fn new(store: Arc<ViewStore>, sync: Arc<TodoSync<B>>) -> Self {
        let (tx, _rx) = watch::channel(ListState::default());
        Self {
            store,
            sync,
            tab: Mutex::new(Tab::default()),
            tx,
        }
    }

    pub fn store(&self) -> &Arc<ViewStore> {
        &self.store
    }

    pub fn sync(&self) -> &Arc<TodoSync<B>> {
        &self.sync
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> ListState {
        self.tx.borrow().clone()
    }

    pub fn tab(&self) -> Tab {
        *self.tab.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Switch tabs; today and completed update the date filters.
    pub fn set_tab(&self, tab: Tab) {
        *self.tab.lock().unwrap_or_else(PoisonError::into_inner) = tab;
        self.store.select_tab(tab);
    }

    fn query(&self) -> (FilterQuery, ViewState, Tab) {
        let state = self.store.state();
        let tab = self.tab();
        (state.filters.for_tab(tab), state.view, tab)
    }

    /// False once the filters, view or tab moved on from what was read
    fn is_current(&self, filters: &FilterQuery, view: &ViewState, tab: Tab) -> bool {
        let (now_filters, now_view, now_tab) = self.query();
        now_filters == *filters && now_view == *view && now_tab == tab
    }

    fn publish(&self, f: impl FnOnce(&mut ListState)) {
        self.tx.send_modify(f);
    }

    fn ready(&self, list: AssembledList, filters: &FilterQuery) {
        let empty = list.is_empty().then(|| EmptyState::classify(filters));
        self.publish(|state| {
            state.status = LoadStatus::Ready;
            state.list = list;
            state.empty = empty;
        });
    }

    fn failed(&self, err: &SyncError) {
        tracing::warn!(error = %err, "Failed to load todos");
        let message = err.to_string();
        self.publish(|state| state.status = LoadStatus::Failed(message));
    }

    /// Read the list for the current filters and publish it
    pub async fn refresh(&self) -> Result<AssembledList> {
        let (filters, view, tab) = self.query();
        self.publish(|state| state.status = LoadStatus::Loading);

        let result = match view.mode {
            ViewMode::Page => self
                .sync
                .fetch_paged(&filters, view.current_page, view.limit)
                .await
                .map(|data| AssembledList::from_paged(&data, view.current_page, view.limit)),
            ViewMode::Scroll => self
                .sync
                .fetch_scroll(&filters, view.limit)
                .await
                .map(|pages| AssembledList::from_scroll(&pages, view.limit)),
        };

        if !self.is_current(&filters, &view, tab) {
            tracing::debug!("Discarding list read for superseded filters");
            return result.map(|list| list.for_tab(tab));
        }

        match result {
            Ok(list) => {
                let list = list.for_tab(tab);
                self.ready(list.clone(), &filters);
                Ok(list)
            }
            Err(err) => {
                self.failed(&err);
                Err(err)
            }
        }
    }

    /// Load the next scroll page; page mode uses `ViewStore::next_page`.
    pub async fn load_more(&self) -> Result<AssembledList> {
        let (filters, view, tab) = self.query();
        if view.mode != ViewMode::Scroll {
            return self.refresh().await;
        }

        let result = self.sync.fetch_next_page(&filters, view.limit).await;
        if !self.is_current(&filters, &view, tab) {
            tracing::debug!("Discarding next page read for superseded filters");
            return result
                .map(|pages| AssembledList::from_scroll(&pages, view.limit).for_tab(tab));
        }

        match result {
            Ok(pages) => {
                let list = AssembledList::from_scroll(&pages, view.limit).for_tab(tab);
                self.ready(list.clone(), &filters);
                Ok(list)
            }
            Err(err) => {
                self.failed(&err);
                Err(err)
            }
        }
    }

    /// Report that the item at `index` became visible; loads the next page
    /// when it is the scroll trigger.
    pub async fn item_visible(&self, index: usize) -> Result<bool> {
        let (filters, view, _) = self.query();
        let key = QueryKey::scroll(filters, view.limit);
        let fetching = self.sync.is_fetching(&key);
        if !self.state().list.should_fetch_next(index, fetching) {
            return Ok(false);
        }
        self.load_more().await?;
        Ok(true)
    }

    /// Assemble the current view from the cache alone
    pub fn current_list(&self) -> Option<AssembledList> {
        let (filters, view, tab) = self.query();
        let list = match view.mode {
            ViewMode::Page => self
                .sync
                .cached_paged(&filters, view.current_page, view.limit)
                .map(|data| AssembledList::from_paged(&data, view.current_page, view.limit)),
            ViewMode::Scroll => self
                .sync
                .cached_scroll(&filters, view.limit)
                .map(|pages| AssembledList::from_scroll(&pages, view.limit)),
        };
        list.map(|list| list.for_tab(tab))
    }

    pub async fn create(&self, new: &NewTodo) -> Result<Todo> {
        new.validate()?;
        self.settle(MutationKind::Create, self.sync.create(new)).await
    }

    pub async fn update(&self, id: &str, updates: &UpdateTodo) -> Result<Todo> {
        updates.validate()?;
        self.settle(MutationKind::Update, self.sync.update(id, updates))
            .await
    }

    /// Flip the completed flag of a todo that is currently cached
    pub async fn toggle_completed(&self, id: &str) -> Result<Todo> {
        let todo = self
            .sync
            .find_cached(id)
            .ok_or_else(|| SyncError::Validation(format!("todo '{}' is not loaded", id)))?;
        self.update(id, &UpdateTodo::completed(!todo.completed))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.settle(MutationKind::Delete, self.sync.delete(id)).await
    }

    async fn settle<T>(
        &self,
        kind: MutationKind,
        mutation: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.publish(|state| state.mutation = MutationStatus::Pending(kind));
        let result = mutation.await;
        let status = MutationStatus::settled(kind, &result);
        self.publish(|state| state.mutation = status);

        if let Err(err) = self.refresh().await {
            tracing::debug!(%kind, error = %err, "Reload after mutation failed");
        }
        result
    }
}
