//! Error types for overview fetching and configuration loading.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid http_addr {0:?}")]
    HttpAddr(String),
    #[error("query_timeout_secs must be greater than 0")]
    ZeroTimeout,
    #[error("default_server {0:?} is not a configured server")]
    UnknownDefaultServer(String),
}

/// Failures of a single remote overview fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Host unreachable, refused or timed out while connecting.
    #[error("failed to connect to server at {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// Bad credentials or invalid virtual server id.
    #[error("{0}")]
    Context(String),

    /// A query failed after the session was established.
    #[error("failed to fetch {query}: {reason}")]
    Query { query: &'static str, reason: String },

    /// The server sent something we could not understand.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unknown server name or invalid address supplied by the caller.
    #[error("{0}")]
    Config(#[from] RequestError),

    #[error("request cancelled")]
    Cancelled,
}

/// Caller-supplied lookup errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("unknown server: {0}")]
    UnknownServer(String),
    #[error("host cannot be empty")]
    EmptyHost,
    #[error("invalid port number: {0}")]
    InvalidPort(String),
    #[error("port must be between 1 and 65535")]
    PortOutOfRange,
}

impl FetchError {
    pub fn query(query: &'static str, reason: impl ToString) -> Self {
        Self::Query {
            query,
            reason: reason.to_string(),
        }
    }

    /// Static label used in log fields.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Context(_) => "context",
            Self::Query { .. } => "query",
            Self::Protocol(_) => "protocol",
            Self::Config(_) => "config",
            Self::Cancelled => "cancelled",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(RequestError::UnknownServer(_)) => StatusCode::NOT_FOUND,
            Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Connect { .. } | Self::Context(_) | Self::Query { .. } | Self::Protocol(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl IntoResponse for FetchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
