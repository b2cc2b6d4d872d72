//! Error types for the gateway and classification of GraphQL error lists.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operation::SourceLocation;

/// Message token Shopify uses to signal rate limiting.
pub const THROTTLED_MARKER: &str = "Throttled";

/// Extension code Shopify attaches to throttled errors.
const THROTTLED_CODE: &str = "THROTTLED";

/// HTTP error information captured from reqwest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorInfo {
    /// Error message.
    pub message: String,
    /// HTTP status code (if available).
    pub status_code: Option<u16>,
    /// Whether the error was a timeout.
    pub is_timeout: bool,
    /// Whether the error was a connection failure.
    pub is_connect: bool,
}

impl From<reqwest::Error> for HttpErrorInfo {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            status_code: err.status().map(|status| status.as_u16()),
            is_timeout: err.is_timeout(),
            is_connect: err.is_connect(),
        }
    }
}

/// GraphQL error location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorLocation {
    /// Line number in the query (1-based).
    pub line: u32,
    /// Column number in the query (1-based).
    pub column: u32,
}

/// GraphQL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphqlPathSegment {
    /// Field name.
    Key(String),
    /// Array index.
    Index(i64),
}

impl std::fmt::Display for GraphqlPathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// GraphQL error entry as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human-readable error message.
    pub message: String,
    /// Location(s) within the query.
    #[serde(default)]
    pub locations: Vec<GraphqlErrorLocation>,
    /// Path within the response where the error occurred.
    #[serde(default)]
    pub path: Vec<GraphqlPathSegment>,
    /// Extensions metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl GraphqlError {
    /// Create an error with a message and a response path.
    #[must_use]
    pub fn new<I, S>(message: impl Into<String>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: path
                .into_iter()
                .map(|segment| GraphqlPathSegment::Key(segment.into()))
                .collect(),
            extensions: None,
        }
    }

    /// Dotted path key used to group messages. Errors without a path belong to `data`.
    #[must_use]
    pub fn path_key(&self) -> String {
        if self.path.is_empty() {
            return "data".to_string();
        }
        self.path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Returns `true` if this entry signals rate limiting.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.message.contains(THROTTLED_MARKER)
            || self
                .extensions
                .as_ref()
                .and_then(|ext| ext.get("code"))
                .and_then(serde_json::Value::as_str)
                == Some(THROTTLED_CODE)
    }
}

/// One grouped server error after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedError {
    /// The group carries the throttling marker.
    Throttled(String),
    /// Any other server-reported error.
    Standard(String),
}

impl ClassifiedError {
    /// Display message (`"<path>: <messages>"`).
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Throttled(message) | Self::Standard(message) => message,
        }
    }

    /// Returns `true` for the throttled variant.
    #[must_use]
    pub const fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }
}

/// Group errors by path (first appearance order) and tag each group.
#[must_use]
pub fn classify(errors: &[GraphqlError]) -> Vec<ClassifiedError> {
    let mut groups: Vec<(String, Vec<&GraphqlError>)> = Vec::new();
    for error in errors {
        let key = error.path_key();
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, entries)) => entries.push(error),
            None => groups.push((key, vec![error])),
        }
    }

    groups
        .into_iter()
        .map(|(path, entries)| {
            let messages = entries
                .iter()
                .map(|entry| entry.message.as_str())
                .collect::<Vec<_>>()
                .join(" -");
            let message = format!("{path}: {messages}");
            if entries.iter().any(|entry| entry.is_throttled()) {
                ClassifiedError::Throttled(message)
            } else {
                ClassifiedError::Standard(message)
            }
        })
        .collect()
}

/// Error type for gateway operations.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Environment or setup problem. Not retryable.
    #[error("{message}")]
    Configuration {
        /// Details.
        message: String,
    },

    /// The API context has no site configured yet.
    #[error("API context is not configured")]
    NotConfigured,

    /// Schema file exists but could not be read or decoded.
    #[error("invalid schema at {}: {message}", .path.display())]
    InvalidSchema {
        /// Schema path.
        path: PathBuf,
        /// Details.
        message: String,
    },

    /// Query text could not be parsed or does not match the schema.
    #[error("{}", display_validation(.message, .location.as_ref()))]
    Validation {
        /// Details.
        message: String,
        /// Where the query was authored, when known.
        location: Option<SourceLocation>,
    },

    /// The server reported errors, none of them throttling.
    #[error("{message}")]
    Graphql {
        /// Concatenated display messages.
        message: String,
        /// Raw error entries.
        errors: Vec<GraphqlError>,
    },

    /// The server signaled rate limiting.
    #[error("{message}")]
    Throttled {
        /// Concatenated display messages.
        message: String,
        /// Estimated wait before the request can succeed.
        retry_after: Option<Duration>,
        /// Raw error entries (empty for HTTP 429).
        errors: Vec<GraphqlError>,
    },

    /// HTTP/network error.
    #[error("HTTP error: {}", .0.message)]
    Http(HttpErrorInfo),

    /// HTTP response status error.
    #[error("HTTP status {status} with body: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: StatusCode,
        /// Response body (truncated if needed).
        body: String,
    },

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(String),
}

fn display_validation(message: &str, location: Option<&SourceLocation>) -> String {
    match location {
        Some(location) => format!("{message} ({location})"),
        None => message.to_string(),
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(HttpErrorInfo::from(err))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl GatewayError {
    /// Schema file missing at `path`.
    #[must_use]
    pub fn schema_missing(path: &std::path::Path) -> Self {
        Self::Configuration {
            message: format!("The schema file does not exist at {}", path.display()),
        }
    }

    /// Build the single error for a non-empty server error list.
    ///
    /// Returns `None` when `errors` is empty.
    #[must_use]
    pub fn from_graphql_errors(
        errors: Vec<GraphqlError>,
        retry_after: Option<Duration>,
    ) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        let classified = classify(&errors);
        let message = classified
            .iter()
            .map(ClassifiedError::message)
            .collect::<Vec<_>>()
            .join("\n");

        if classified.iter().any(ClassifiedError::is_throttled) {
            Some(Self::Throttled {
                message,
                retry_after,
                errors,
            })
        } else {
            Some(Self::Graphql { message, errors })
        }
    }

    /// Returns `true` if the caller may retry the request later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Throttled { .. } => true,
            Self::Http(info) => info.is_timeout || info.is_connect,
            Self::HttpStatus { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    /// Suggested wait before retrying, when the server supplied one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns `true` for the throttled variant.
    #[must_use]
    pub const fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
