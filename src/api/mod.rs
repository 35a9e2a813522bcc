// src/api/mod.rs
//! Notion API interaction: the ability to call the workspace reliably.
//!
//! Layers, leaves first: a `Transport` moves bytes, the `RequestGovernor`
//! paces calls, the `ResilientClient` classifies and retries, the
//! `Paginator` walks cursors, and the `BlockTreeFetcher` descends into
//! nested block children.

pub mod block_tree;
pub mod client;
pub mod governor;
pub mod pagination;
pub mod resilient;
pub mod retry;
pub mod types;

use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// A request relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Path without a leading slash, e.g. `blocks/{id}/children`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Value of a query parameter, if present.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Method and path, used to label logs and errors.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// What came back over the wire, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// Parsed `Retry-After` header
    pub retry_after: Option<Duration>,
    /// `x-request-id` header
    pub request_id: Option<String>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request that never produced an HTTP response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// The ability to send one HTTP request.
///
/// Retrying, pacing, and status interpretation live above this seam, so a
/// scripted implementation can stand in for the network.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &ApiRequest,
        authorization: &str,
    ) -> Result<RawResponse, TransportError>;
}

/// Supplies the `Authorization` header value for each call.
pub trait Authorizer: Send + Sync {
    fn authorization(&self) -> String;
}

pub use block_tree::{BlockNode, BlockTraversal, BlockTreeFetcher};
pub use client::NotionHttpClient;
pub use governor::{GovernorStats, RequestGovernor};
pub use pagination::{Page, Pager, Paginator};
pub use resilient::{ClientStats, ResilientClient};
pub use retry::{RetryAttempt, RetryPolicy};
