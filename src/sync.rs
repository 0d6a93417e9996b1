//! Data-synchronization layer
//!
//! `TodoSync` sits between the list views and the backend. Reads are served
//! from the query cache while fresh. Mutations patch every cached list
//! optimistically, call the backend, then either keep the patch until the
//! refetch or roll back to the snapshot taken just before patching.
//!
//! The cache lock is only held for synchronous sections, never across an
//! `.await`, so a snapshot and its patch are always applied together.

use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::api::{INITIAL_CURSOR, PageParams, ScrollParams, TodoBackend};
use crate::cache::{CacheData, QueryCache, QueryKey, ScrollPages};
use crate::config::CacheConfig;
use crate::error::{ApiError, MutationKind, Result, SyncError};
use crate::filters::FilterQuery;
use crate::models::{NewTodo, PaginatedTodosResponse, Todo, UpdateTodo};

/// A mutation whose backend call has not settled yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub kind: MutationKind,
    /// Target todo; the temporary id for creates
    pub id: String,
}

/// Outcome of the most recent mutation, for UI feedback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MutationStatus {
    #[default]
    Idle,
    Pending(MutationKind),
    Success(MutationKind),
    Error { kind: MutationKind, message: String },
}

impl MutationStatus {
    pub fn settled<T>(kind: MutationKind, result: &Result<T>) -> Self {
        match result {
            Ok(_) => MutationStatus::Success(kind),
            Err(err) => MutationStatus::Error {
                kind,
                message: err.to_string(),
            },
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MutationStatus::Pending(_))
    }
}

#[derive(Debug)]
struct Inner {
    cache: QueryCache,
    pending: HashMap<u64, PendingMutation>,
    next_mutation: u64,
}

pub struct TodoSync<B> {
    backend: B,
    inner: Mutex<Inner>,
    version: watch::Sender<u64>,
}

impl<B: TodoBackend> TodoSync<B> {
    pub fn new(backend: B, config: &CacheConfig) -> Self {
        let (version, _rx) = watch::channel(0);
        Self {
            backend,
            inner: Mutex::new(Inner {
                cache: QueryCache::new(config.stale_time(), config.gc_time()),
                pending: HashMap::new(),
                next_mutation: 0,
            }),
            version,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Notified whenever cached list data changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn notify(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Fetch one page in page mode
    pub async fn fetch_paged(
        &self,
        filters: &FilterQuery,
        page: u32,
        limit: u32,
    ) -> Result<PaginatedTodosResponse> {
        let key = QueryKey::paged(filters.clone(), page, limit);

        let ticket = {
            let mut inner = self.lock();
            inner.cache.collect_garbage();
            if inner.cache.is_fresh(&key)
                && let Some(CacheData::Paged(data)) = inner.cache.get(&key)
            {
                tracing::debug!(page, limit, "Paged list served from cache");
                return Ok(data.clone());
            }
            inner.cache.begin_fetch(&key)
        };

        let params = PageParams {
            filters: filters.clone(),
            page,
            limit,
        };
        let result = self.backend.list_paged(&params).await;

        let mut inner = self.lock();
        match result {
            Ok(data) => {
                if inner
                    .cache
                    .complete_fetch(&key, ticket, CacheData::Paged(data.clone()))
                {
                    drop(inner);
                    self.notify();
                    return Ok(data);
                }
                tracing::debug!(page, "Discarding superseded paged fetch");
                match inner.cache.get(&key) {
                    Some(CacheData::Paged(current)) => Ok(current.clone()),
                    _ => Ok(data),
                }
            }
            Err(err) => {
                inner.cache.abandon_fetch(&key, ticket);
                Err(err.into())
            }
        }
    }

    /// Fetch a scrolled list.
    ///
    /// A stale entry is refetched page by page up to the number of pages it
    /// held, following the fresh cursors.
    pub async fn fetch_scroll(&self, filters: &FilterQuery, limit: u32) -> Result<ScrollPages> {
        let key = QueryKey::scroll(filters.clone(), limit);

        let (ticket, page_count) = {
            let mut inner = self.lock();
            inner.cache.collect_garbage();
            let page_count = match inner.cache.peek(&key).map(|entry| &entry.data) {
                Some(CacheData::Scroll(scroll)) => scroll.pages.len().max(1),
                _ => 1,
            };
            if inner.cache.is_fresh(&key)
                && let Some(CacheData::Scroll(scroll)) = inner.cache.get(&key)
            {
                tracing::debug!(limit, pages = scroll.pages.len(), "Scroll list served from cache");
                return Ok(scroll.clone());
            }
            (inner.cache.begin_fetch(&key), page_count)
        };

        let mut fetched = ScrollPages::default();
        let mut cursor = Some(INITIAL_CURSOR.to_string());
        while fetched.pages.len() < page_count {
            let params = ScrollParams {
                filters: filters.clone(),
                next_cursor: cursor.take(),
                limit,
            };
            let page = match self.backend.list_scrolled(&params).await {
                Ok(page) => page,
                Err(err) => {
                    self.lock().cache.abandon_fetch(&key, ticket);
                    return Err(err.into());
                }
            };
            cursor = page.next_cursor.clone().filter(|_| page.has_next_page);
            fetched.pages.push(page);
            if cursor.is_none() {
                break;
            }
        }

        let mut inner = self.lock();
        if inner
            .cache
            .complete_fetch(&key, ticket, CacheData::Scroll(fetched.clone()))
        {
            drop(inner);
            self.notify();
            return Ok(fetched);
        }
        tracing::debug!(limit, "Discarding superseded scroll fetch");
        match inner.cache.get(&key) {
            Some(CacheData::Scroll(current)) => Ok(current.clone()),
            _ => Ok(fetched),
        }
    }

    /// Load the page after the last one held for a scrolled list.
    ///
    /// Does nothing when the server reported no further page or a fetch for
    /// the same list is already running.
    pub async fn fetch_next_page(&self, filters: &FilterQuery, limit: u32) -> Result<ScrollPages> {
        let key = QueryKey::scroll(filters.clone(), limit);

        let cached = match self.lock().cache.get(&key) {
            Some(CacheData::Scroll(scroll)) => Some(scroll.clone()),
            _ => None,
        };
        let Some(current) = cached else {
            return self.fetch_scroll(filters, limit).await;
        };

        let (ticket, cursor) = {
            let mut inner = self.lock();
            if inner.cache.is_fetching(&key) {
                tracing::debug!("Next page already loading");
                return Ok(current);
            }
            let Some(cursor) = current.next_cursor().map(str::to_string) else {
                return Ok(current);
            };
            (inner.cache.begin_fetch(&key), cursor)
        };

        let params = ScrollParams {
            filters: filters.clone(),
            next_cursor: Some(cursor),
            limit,
        };
        let result = self.backend.list_scrolled(&params).await;

        let mut inner = self.lock();
        match result {
            Ok(page) => {
                let appended = inner.cache.append_page(&key, ticket, page);
                let current = match inner.cache.get(&key) {
                    Some(CacheData::Scroll(scroll)) => scroll.clone(),
                    _ => ScrollPages::default(),
                };
                drop(inner);
                if appended {
                    self.notify();
                } else {
                    tracing::debug!("Discarding superseded next-page fetch");
                }
                Ok(current)
            }
            Err(err) => {
                inner.cache.abandon_fetch(&key, ticket);
                Err(err.into())
            }
        }
    }

    /// Cached page-mode data without touching the network
    pub fn cached_paged(
        &self,
        filters: &FilterQuery,
        page: u32,
        limit: u32,
    ) -> Option<PaginatedTodosResponse> {
        let key = QueryKey::paged(filters.clone(), page, limit);
        match self.lock().cache.peek(&key).map(|entry| &entry.data) {
            Some(CacheData::Paged(data)) => Some(data.clone()),
            _ => None,
        }
    }

    /// Cached scroll-mode data without touching the network
    pub fn cached_scroll(&self, filters: &FilterQuery, limit: u32) -> Option<ScrollPages> {
        let key = QueryKey::scroll(filters.clone(), limit);
        match self.lock().cache.peek(&key).map(|entry| &entry.data) {
            Some(CacheData::Scroll(scroll)) => Some(scroll.clone()),
            _ => None,
        }
    }

    /// Look a todo up in whatever lists are cached
    pub fn find_cached(&self, id: &str) -> Option<Todo> {
        self.lock().cache.find_todo(id).cloned()
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.lock().cache.is_fetching(key)
    }

    /// Mark every cached list stale
    pub fn invalidate(&self) {
        self.lock().cache.invalidate_all();
        self.notify();
    }

    pub fn pending_mutations(&self) -> Vec<PendingMutation> {
        self.lock().pending.values().cloned().collect()
    }

    /// True while a mutation targeting `id` is in flight
    pub fn is_pending(&self, id: &str) -> bool {
        self.lock().pending.values().any(|m| m.id == id)
    }

    /// Create a todo, showing it at the top of every cached list until the
    /// server confirms it.
    pub async fn create(&self, new: &NewTodo) -> Result<Todo> {
        let optimistic = Todo::optimistic(new, Utc::now());
        let temp_id = optimistic.id.clone();

        self.mutate(
            MutationKind::Create,
            &temp_id,
            |data| data.prepend(optimistic.clone()),
            self.backend.create(new),
        )
        .await
    }

    /// Apply a partial update to the todo everywhere it is cached
    pub async fn update(&self, id: &str, updates: &UpdateTodo) -> Result<Todo> {
        self.mutate(
            MutationKind::Update,
            id,
            |data| {
                data.update(id, updates);
            },
            self.backend.update(id, updates),
        )
        .await
    }

    /// Remove the todo from every cached list
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.mutate(
            MutationKind::Delete,
            id,
            |data| {
                data.remove(id);
            },
            self.backend.delete(id),
        )
        .await
    }

    async fn mutate<T>(
        &self,
        kind: MutationKind,
        id: &str,
        patch: impl FnMut(&mut CacheData),
        call: impl Future<Output = std::result::Result<T, ApiError>>,
    ) -> Result<T> {
        let (snapshot, mutation) = {
            let mut inner = self.lock();
            // In-flight reads must not land on top of the optimistic state
            inner.cache.cancel_fetches();
            let snapshot = inner.cache.snapshot();
            let patched = inner.cache.patch_all(patch);

            inner.next_mutation += 1;
            let mutation = inner.next_mutation;
            inner.pending.insert(
                mutation,
                PendingMutation {
                    kind,
                    id: id.to_string(),
                },
            );
            tracing::debug!(%kind, id, entries = patched, "Applied optimistic update");
            (snapshot, mutation)
        };
        self.notify();

        let result = call.await;

        {
            let mut inner = self.lock();
            inner.pending.remove(&mutation);
            if let Err(err) = &result {
                tracing::warn!(%kind, id, error = %err, "Mutation failed, rolling back");
                inner.cache.restore(snapshot);
            } else {
                tracing::info!(%kind, id, "Mutation settled");
            }
            inner.cache.invalidate_all();
        }
        self.notify();

        result.map_err(|source| SyncError::mutation(kind, id, source))
    }
}
