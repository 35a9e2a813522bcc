// src/error.rs
//! Application error types with structured error handling.
//!
//! Error types form the vocabulary for failure modes in the system.
//! Every API failure carries the endpoint, status, and Notion error code
//! so a caller can tell a revoked token from an exhausted retry budget
//! without parsing strings.

use std::fmt;
use thiserror::Error;

use crate::types::ValidationError;

/// Notion API error codes as a typed vocabulary.
///
/// Instead of matching against magic strings like `"rate_limited"`,
/// the domain vocabulary is encoded in the type system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotionErrorCode {
    /// API rate limit exceeded
    RateLimited,
    /// The requested object does not exist or is inaccessible
    ObjectNotFound,
    /// API key is invalid or expired
    Unauthorized,
    /// API key lacks permission for this resource
    RestrictedResource,
    /// Request body contains invalid JSON
    InvalidJson,
    /// Request parameters failed Notion's validation
    ValidationFailed,
    /// Conflict with current state of the resource
    Conflict,
    /// Notion internal server error
    InternalError,
    /// Notion is temporarily unavailable
    ServiceUnavailable,
    /// Upstream gateway timed out
    GatewayTimeout,
    /// HTTP status code fallback when the error body is unparseable
    HttpStatus(u16),
    /// An error code this client doesn't recognize yet
    Unknown(String),
}

impl NotionErrorCode {
    /// Parse a Notion API error code string into the typed vocabulary.
    pub fn from_api_response(code: &str) -> Self {
        match code {
            "rate_limited" => Self::RateLimited,
            "object_not_found" => Self::ObjectNotFound,
            "unauthorized" => Self::Unauthorized,
            "restricted_resource" => Self::RestrictedResource,
            "invalid_json" => Self::InvalidJson,
            "validation_error" => Self::ValidationFailed,
            "conflict_error" => Self::Conflict,
            "internal_server_error" => Self::InternalError,
            "service_unavailable" => Self::ServiceUnavailable,
            "gateway_timeout" => Self::GatewayTimeout,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Create from an HTTP status code when the error body is unparseable.
    pub fn from_http_status(status: u16) -> Self {
        Self::HttpStatus(status)
    }
}

impl fmt::Display for NotionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ObjectNotFound => write!(f, "object_not_found"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::RestrictedResource => write!(f, "restricted_resource"),
            Self::InvalidJson => write!(f, "invalid_json"),
            Self::ValidationFailed => write!(f, "validation_error"),
            Self::Conflict => write!(f, "conflict_error"),
            Self::InternalError => write!(f, "internal_server_error"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::GatewayTimeout => write!(f, "gateway_timeout"),
            Self::HttpStatus(code) => write!(f, "http_{}", code),
            Self::Unknown(code) => write!(f, "{}", code),
        }
    }
}

/// Why a single API call failed, independent of how it is reported.
///
/// The kind alone decides whether the resilient client tries again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Authentication,
    Validation,
    PermissionDenied,
    NotFound,
    /// Any other 4xx
    Client,
    RateLimited,
    ServerError,
    NetworkFailure,
}

impl FailureKind {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Authentication,
            400 => Self::Validation,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::Client,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::NetworkFailure
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Authentication => "authentication failure",
            Self::Validation => "validation failure",
            Self::PermissionDenied => "permission denied",
            Self::NotFound => "not found",
            Self::Client => "client error",
            Self::RateLimited => "rate limited",
            Self::ServerError => "server error",
            Self::NetworkFailure => "network failure",
        };
        f.write_str(label)
    }
}

/// Context of a failed Notion API response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    /// Method and path, e.g. `GET users`
    pub endpoint: String,
    pub status: u16,
    pub code: NotionErrorCode,
    pub message: String,
    pub request_id: Option<String>,
    /// Calls made for this request, counting the one that failed
    pub attempts: u32,
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} returned {} ({}): {}",
            self.endpoint, self.status, self.code, self.message
        )?;
        if let Some(request_id) = &self.request_id {
            write!(f, " [request_id: {}]", request_id)?;
        }
        if self.attempts > 1 {
            write!(f, " on attempt {}", self.attempts)?;
        }
        Ok(())
    }
}

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(ApiFailure),

    #[error("Request rejected as invalid: {0}")]
    Validation(ApiFailure),

    #[error("Permission denied: {0}")]
    PermissionDenied(ApiFailure),

    #[error("Object not found: {0}")]
    NotFound(ApiFailure),

    #[error("Client error: {0}")]
    Client(ApiFailure),

    #[error("Rate limited: {0}")]
    RateLimited(ApiFailure),

    #[error("Notion server error: {0}")]
    ServerError(ApiFailure),

    #[error("Network failure calling {endpoint}: {message}")]
    NetworkFailure { endpoint: String, message: String },

    #[error("Giving up on {endpoint} after {attempts} attempts: {last}")]
    RetriesExhausted {
        endpoint: String,
        attempts: u32,
        #[source]
        last: Box<AppError>,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ValidationError),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Stream '{stream}' failed: {source}")]
    StreamFailed {
        stream: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Output sink rejected event: {0}")]
    Sink(String),

    #[error("Filesystem IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Builds the error variant matching a classified API failure.
    pub fn from_api_failure(kind: FailureKind, failure: ApiFailure) -> Self {
        match kind {
            FailureKind::Authentication => Self::Authentication(failure),
            FailureKind::Validation => Self::Validation(failure),
            FailureKind::PermissionDenied => Self::PermissionDenied(failure),
            FailureKind::NotFound => Self::NotFound(failure),
            FailureKind::Client => Self::Client(failure),
            FailureKind::RateLimited => Self::RateLimited(failure),
            FailureKind::ServerError => Self::ServerError(failure),
            FailureKind::NetworkFailure => Self::NetworkFailure {
                endpoint: failure.endpoint,
                message: failure.message,
            },
        }
    }

    /// The failure kind, for errors that came from an API call.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Authentication(_) => Some(FailureKind::Authentication),
            Self::Validation(_) => Some(FailureKind::Validation),
            Self::PermissionDenied(_) => Some(FailureKind::PermissionDenied),
            Self::NotFound(_) => Some(FailureKind::NotFound),
            Self::Client(_) => Some(FailureKind::Client),
            Self::RateLimited(_) => Some(FailureKind::RateLimited),
            Self::ServerError(_) => Some(FailureKind::ServerError),
            Self::NetworkFailure { .. } => Some(FailureKind::NetworkFailure),
            Self::RetriesExhausted { last, .. } => last.kind(),
            Self::StreamFailed { source, .. } => source.kind(),
            _ => None,
        }
    }

    /// Whether the resilient client should try the call again.
    ///
    /// An exhausted retry budget is permanent even though its last
    /// underlying failure was transient.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RetriesExhausted { .. } | Self::StreamFailed { .. } => false,
            other => other.kind().is_some_and(|kind| kind.is_recoverable()),
        }
    }

    /// The API failure context, when there is one.
    pub fn api_failure(&self) -> Option<&ApiFailure> {
        match self {
            Self::Authentication(f)
            | Self::Validation(f)
            | Self::PermissionDenied(f)
            | Self::NotFound(f)
            | Self::Client(f)
            | Self::RateLimited(f)
            | Self::ServerError(f) => Some(f),
            Self::RetriesExhausted { last, .. } => last.api_failure(),
            Self::StreamFailed { source, .. } => source.api_failure(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedResponse(err.to_string())
    }
}
