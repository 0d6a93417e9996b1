//! todo-sync - client data layer for a todo list backend
//!
//! Holds the filter/view state, talks to the REST API, and keeps a query
//! cache that mutations patch optimistically before the server answers.

pub mod api;
pub mod assembly;
pub mod cache;
pub mod config;
pub mod error;
pub mod filters;
pub mod models;
pub mod search;
pub mod session;
pub mod sync;

pub use api::{HttpTodoApi, TodoBackend};
pub use error::{ApiError, Result, SyncError};
pub use session::TodoSession;
pub use sync::TodoSync;
