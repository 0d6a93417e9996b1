//! Todo data models (shared wire types between client and server)
//!
//! Field names follow the server's camelCase JSON; instants are ISO-8601.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::error::SyncError;

/// Prefix reserved for ids of todos that only exist locally
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Longest title the server accepts, in characters
pub const MAX_TITLE_LEN: usize = 100;

/// Priority level for todos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            _ => Err(SyncError::Validation(format!(
                "unknown priority '{}', expected LOW, MEDIUM or HIGH",
                s
            ))),
        }
    }
}

/// A todo item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub title: String,
    pub completed: bool,
    #[serde(serialize_with = "serialize_instant")]
    pub date: DateTime<Utc>,
    pub priority: Priority,
}

impl Todo {
    /// Build the placeholder shown while a create is in flight.
    ///
    /// Unset fields take the values the server would assign.
    pub fn optimistic(new: &NewTodo, now: DateTime<Utc>) -> Self {
        Self {
            id: temp_id(),
            title: new.title.clone(),
            completed: new.completed.unwrap_or(false),
            date: new.date.unwrap_or(now),
            priority: new.priority.unwrap_or_default(),
        }
    }

    /// True for placeholders that have not been confirmed by the server
    pub fn is_optimistic(&self) -> bool {
        is_temp_id(&self.id)
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, updates: &UpdateTodo) {
        if let Some(title) = &updates.title {
            self.title = title.clone();
        }
        if let Some(completed) = updates.completed {
            self.completed = completed;
        }
        if let Some(date) = updates.date {
            self.date = date;
        }
        if let Some(priority) = updates.priority {
            self.priority = priority;
        }
    }
}

/// Generate a temporary id. UUIDv7 keeps ids ordered by creation time.
pub fn temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::now_v7())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Payload for creating a todo
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_instant"
    )]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl NewTodo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Reject input the server would refuse
    pub fn validate(&self) -> Result<(), SyncError> {
        validate_title(&self.title)
    }
}

/// Partial update payload; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTodo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_instant"
    )]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl UpdateTodo {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.completed.is_none()
            && self.date.is_none()
            && self.priority.is_none()
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.is_empty() {
            return Err(SyncError::Validation("no fields to update".to_string()));
        }
        match &self.title {
            Some(title) => validate_title(title),
            None => Ok(()),
        }
    }
}

fn validate_title(title: &str) -> Result<(), SyncError> {
    if title.trim().is_empty() {
        return Err(SyncError::Validation("Title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(SyncError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

/// Response of `GET /todos`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedTodosResponse {
    pub todos: Vec<Todo>,
    pub total_todos: u64,
    pub has_next_page: bool,
    pub next_page: u32,
}

/// Response of `GET /todos/scroll`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollTodosResponse {
    pub todos: Vec<Todo>,
    pub next_cursor: Option<String>,
    pub has_next_page: bool,
}

/// ISO-8601 in UTC with millisecond precision
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_instant<S: Serializer>(instant: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_instant(instant))
}

fn serialize_opt_instant<S: Serializer>(
    instant: &Option<DateTime<Utc>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match instant {
        Some(instant) => serialize_instant(instant, s),
        None => s.serialize_none(),
    }
}
