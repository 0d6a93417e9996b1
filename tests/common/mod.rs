#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use todo_sync::api::{PageParams, ScrollParams, TodoBackend};
use todo_sync::error::ApiError;
use todo_sync::filters::{FilterQuery, SortField, SortOrder};
use todo_sync::models::{
    NewTodo, PaginatedTodosResponse, Priority, ScrollTodosResponse, Todo, UpdateTodo,
};

/// Gate that can hold calls until the test lets them through
pub struct Gate {
    held: AtomicBool,
    permits: Semaphore,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            held: AtomicBool::new(false),
            permits: Semaphore::new(0),
        }
    }
}

impl Gate {
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Let new calls through; calls already waiting stay held
    pub fn open(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    async fn pass(&self) {
        if self.held.load(Ordering::SeqCst) {
            self.permits
                .acquire()
                .await
                .expect("gate semaphore closed")
                .forget();
        }
    }
}

/// In-memory stand-in for the todo server
#[derive(Default)]
pub struct MockBackend {
    pub todos: Mutex<Vec<Todo>>,
    next_id: AtomicU64,
    pub fail_mutations: AtomicBool,
    pub fail_lists: AtomicBool,
    pub list_calls: AtomicUsize,
    pub started_lists: AtomicUsize,
    pub mutation_gate: Gate,
    pub list_gate: Gate,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_todos(todos: Vec<Todo>) -> Arc<Self> {
        let backend = Self::default();
        *backend.todos.lock().unwrap() = todos;
        Arc::new(backend)
    }

    pub fn server_todos(&self) -> Vec<Todo> {
        self.todos.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn failure(status: u16, reason: &str) -> ApiError {
        ApiError::RequestFailed {
            status,
            message: format!("API request failed: {}", reason),
        }
    }

    async fn before_list(&self) -> Result<(), ApiError> {
        self.started_lists.fetch_add(1, Ordering::SeqCst);
        self.list_gate.pass().await;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(Self::failure(500, "Internal Server Error"));
        }
        Ok(())
    }

    async fn before_mutation(&self) -> Result<(), ApiError> {
        self.mutation_gate.pass().await;
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(Self::failure(500, "Internal Server Error"));
        }
        Ok(())
    }

    fn query(&self, filters: &FilterQuery) -> Vec<Todo> {
        let search = filters.search.as_deref().map(str::to_lowercase);
        let mut todos: Vec<Todo> = self
            .todos
            .lock()
            .unwrap()
            .iter()
            .filter(|t| filters.completed.is_none_or(|c| t.completed == c))
            .filter(|t| filters.priority.is_none_or(|p| t.priority == p))
            .filter(|t| filters.date_gte.is_none_or(|d| t.date >= d))
            .filter(|t| filters.date_lte.is_none_or(|d| t.date <= d))
            .filter(|t| {
                search
                    .as_deref()
                    .is_none_or(|s| t.title.to_lowercase().contains(s))
            })
            .cloned()
            .collect();

        if let Some(sort) = filters.sort {
            todos.sort_by(|a, b| {
                let ord = match sort {
                    SortField::Date => a.date.cmp(&b.date),
                    SortField::Priority => a.priority.cmp(&b.priority),
                };
                match filters.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }
        todos
    }
}

#[async_trait]
impl TodoBackend for MockBackend {
    async fn list_paged(&self, params: &PageParams) -> Result<PaginatedTodosResponse, ApiError> {
        self.before_list().await?;
        let all = self.query(&params.filters);
        let limit = params.limit as usize;
        let start = (params.page.max(1) as usize - 1) * limit;
        let todos: Vec<Todo> = all.iter().skip(start).take(limit).cloned().collect();

        Ok(PaginatedTodosResponse {
            has_next_page: start + todos.len() < all.len(),
            total_todos: all.len() as u64,
            next_page: params.page + 1,
            todos,
        })
    }

    async fn list_scrolled(&self, params: &ScrollParams) -> Result<ScrollTodosResponse, ApiError> {
        self.before_list().await?;
        let all = self.query(&params.filters);
        let offset: usize = params
            .next_cursor
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let todos: Vec<Todo> = all
            .iter()
            .skip(offset)
            .take(params.limit as usize)
            .cloned()
            .collect();
        let end = offset + todos.len();
        let has_next_page = end < all.len();

        Ok(ScrollTodosResponse {
            todos,
            next_cursor: has_next_page.then(|| end.to_string()),
            has_next_page,
        })
    }

    async fn create(&self, new: &NewTodo) -> Result<Todo, ApiError> {
        self.before_mutation().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let todo = Todo {
            id: format!("srv-{}", id),
            title: new.title.clone(),
            completed: new.completed.unwrap_or(false),
            date: new.date.unwrap_or_else(Utc::now),
            priority: new.priority.unwrap_or_default(),
        };
        self.todos.lock().unwrap().insert(0, todo.clone());
        Ok(todo)
    }

    async fn update(&self, id: &str, updates: &UpdateTodo) -> Result<Todo, ApiError> {
        self.before_mutation().await?;
        let mut todos = self.todos.lock().unwrap();
        let todo = todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Self::failure(404, "Not Found"))?;
        todo.apply(updates);
        Ok(todo.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.before_mutation().await?;
        let mut todos = self.todos.lock().unwrap();
        let before = todos.len();
        todos.retain(|t| t.id != id);
        if todos.len() == before {
            return Err(Self::failure(404, "Not Found"));
        }
        Ok(())
    }
}

pub fn base_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
}

pub fn todo(id: &str, title: &str) -> Todo {
    Todo {
        id: id.to_string(),
        title: title.to_string(),
        completed: false,
        date: base_date(),
        priority: Priority::Medium,
    }
}

/// `count` todos with ids t1..tN, one hour apart
pub fn todos(count: usize) -> Vec<Todo> {
    (1..=count)
        .map(|i| Todo {
            date: base_date() + Duration::hours(i as i64),
            ..todo(&format!("t{}", i), &format!("Todo {}", i))
        })
        .collect()
}

/// Yield until `cond` holds; panics if it never does
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
