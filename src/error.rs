//! Error types for the API client and the sync layer

use thiserror::Error;

/// Failure talking to the todo backend
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message} (status {status})")]
    RequestFailed { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),
}

impl ApiError {
    /// HTTP status reported by the server, if the request got that far
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RequestFailed { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Which optimistic mutation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationKind::Create => write!(f, "create"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// The cache has already been rolled back when this is returned.
    #[error("failed to {kind} todo '{id}': {source}")]
    Mutation {
        kind: MutationKind,
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("{0}")]
    Validation(String),
}

impl SyncError {
    pub fn mutation(kind: MutationKind, id: impl Into<String>, source: ApiError) -> Self {
        SyncError::Mutation {
            kind,
            id: id.into(),
            source,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Api(err) | SyncError::Mutation { source: err, .. } => err.status(),
            SyncError::Validation(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
