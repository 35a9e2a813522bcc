// src/api/types.rs
//! Wire shapes of Notion API responses.

use serde::Deserialize;
use serde_json::Value;

/// Generic paginated list response.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginatedResponse {
    #[serde(default)]
    pub object: Option<String>,
    pub results: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

/// Error response body from Notion API.
///
/// Every field is optional; proxies in front of the API return bodies
/// that are not Notion error objects at all.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotionErrorBody {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl NotionErrorBody {
    /// Parses an error body, falling back to an empty one.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }
}
