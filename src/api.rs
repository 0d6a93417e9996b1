//! HTTP client for the todo backend

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::filters::{FilterQuery, SortField, SortOrder};
use crate::models::{
    NewTodo, PaginatedTodosResponse, Priority, ScrollTodosResponse, Todo, UpdateTodo,
    format_instant,
};

/// Cursor sent for the first page of a scrolled list
pub const INITIAL_CURSOR: &str = "0";

/// Parameters for `GET /todos`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageParams {
    pub filters: FilterQuery,
    pub page: u32,
    pub limit: u32,
}

/// Parameters for `GET /todos/scroll`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScrollParams {
    pub filters: FilterQuery,
    pub next_cursor: Option<String>,
    pub limit: u32,
}

/// Operations the sync layer needs from the server
#[async_trait]
pub trait TodoBackend: Send + Sync {
    async fn list_paged(&self, params: &PageParams) -> Result<PaginatedTodosResponse, ApiError>;

    async fn list_scrolled(&self, params: &ScrollParams)
    -> Result<ScrollTodosResponse, ApiError>;

    async fn create(&self, todo: &NewTodo) -> Result<Todo, ApiError>;

    async fn update(&self, id: &str, updates: &UpdateTodo) -> Result<Todo, ApiError>;

    async fn delete(&self, id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl<B: TodoBackend + ?Sized> TodoBackend for Arc<B> {
    async fn list_paged(&self, params: &PageParams) -> Result<PaginatedTodosResponse, ApiError> {
        (**self).list_paged(params).await
    }

    async fn list_scrolled(
        &self,
        params: &ScrollParams,
    ) -> Result<ScrollTodosResponse, ApiError> {
        (**self).list_scrolled(params).await
    }

    async fn create(&self, todo: &NewTodo) -> Result<Todo, ApiError> {
        (**self).create(todo).await
    }

    async fn update(&self, id: &str, updates: &UpdateTodo) -> Result<Todo, ApiError> {
        (**self).update(id, updates).await
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        (**self).delete(id).await
    }
}

/// Query string for both list endpoints. Absent filters are not sent.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_cursor: Option<&'a str>,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_gte: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_lte: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sort: Option<SortField>,
    order: SortOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
}

impl<'a> ListQuery<'a> {
    fn new(filters: &'a FilterQuery, limit: u32) -> Self {
        Self {
            page: None,
            next_cursor: None,
            limit,
            completed: filters.completed,
            priority: filters.priority,
            date_gte: filters.date_gte.as_ref().map(format_instant),
            date_lte: filters.date_lte.as_ref().map(format_instant),
            sort: filters.sort,
            order: filters.order,
            search: filters.search.as_deref().filter(|s| !s.is_empty()),
        }
    }
}

/// `TodoBackend` over HTTP/JSON
#[derive(Clone)]
pub struct HttpTodoApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl std::fmt::Debug for HttpTodoApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTodoApi")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpTodoApi {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let mut base_url =
            Url::parse(base_url).map_err(|_| ApiError::InvalidBaseUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(base_url.to_string()));
        }
        // A trailing slash would produce an empty segment before "todos"
        if base_url.path().ends_with('/') {
            let trimmed = base_url.path().trim_end_matches('/').to_string();
            base_url.set_path(&trimmed);
        }

        Ok(Self {
            client: Client::builder().build()?,
            base_url,
            token: None,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut api = Self::new(&config.base_url)?;
        api.token = config.token.clone();
        Ok(api)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.client.request(method, self.url(segments));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn paged_request(&self, params: &PageParams) -> RequestBuilder {
        let mut query = ListQuery::new(&params.filters, params.limit);
        query.page = Some(params.page);
        self.request(Method::GET, &["todos"]).query(&query)
    }

    fn scroll_request(&self, params: &ScrollParams) -> RequestBuilder {
        let mut query = ListQuery::new(&params.filters, params.limit);
        query.next_cursor = params.next_cursor.as_deref().filter(|c| !c.is_empty());
        self.request(Method::GET, &["todos", "scroll"]).query(&query)
    }

    async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), url = %response.url(), "Request failed");
            return Err(ApiError::RequestFailed {
                status: status.as_u16(),
                message: format!(
                    "API request failed: {}",
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
        let body = Self::send(request).await?.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TodoBackend for HttpTodoApi {
    async fn list_paged(&self, params: &PageParams) -> Result<PaginatedTodosResponse, ApiError> {
        tracing::debug!(page = params.page, limit = params.limit, "GET /todos");
        Self::send_json(self.paged_request(params)).await
    }

    async fn list_scrolled(
        &self,
        params: &ScrollParams,
    ) -> Result<ScrollTodosResponse, ApiError> {
        tracing::debug!(cursor = ?params.next_cursor, limit = params.limit, "GET /todos/scroll");
        Self::send_json(self.scroll_request(params)).await
    }

    async fn create(&self, todo: &NewTodo) -> Result<Todo, ApiError> {
        tracing::debug!("POST /todos");
        Self::send_json(self.request(Method::POST, &["todos"]).json(todo)).await
    }

    async fn update(&self, id: &str, updates: &UpdateTodo) -> Result<Todo, ApiError> {
        tracing::debug!(id, "PUT /todos/{{id}}");
        Self::send_json(self.request(Method::PUT, &["todos", id]).json(updates)).await
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        tracing::debug!(id, "DELETE /todos/{{id}}");
        Self::send(self.request(Method::DELETE, &["todos", id])).await?;
        Ok(())
    }
}
