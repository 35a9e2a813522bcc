// tests/common/mod.rs
//! An in-memory Notion workspace behind the `Transport` seam.

#![allow(dead_code)]

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use notion2records::{
    ApiRequest, Credentials, ExtractionConfig, HttpMethod, RawResponse, Transport, TransportError,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};

pub fn id(n: u64) -> String {
    format!("00000000-0000-4000-8000-{:012x}", n)
}

pub fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
}

pub fn stamp(minute: i64) -> String {
    at(minute).to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn user(n: u64) -> Value {
    json!({
        "object": "user",
        "id": id(n),
        "type": "person",
        "name": format!("User {}", n),
        "avatar_url": null,
        "person": {"email": format!("user{}@example.com", n)},
    })
}

pub fn page(n: u64, edited_minute: i64) -> Value {
    json!({
        "object": "page",
        "id": id(n),
        "created_time": stamp(0),
        "last_edited_time": stamp(edited_minute),
        "archived": false,
        "parent": {"type": "workspace", "workspace": true},
        "url": format!("https://www.notion.so/{}", n),
        "properties": {
            "Name": {"id": "title", "type": "title", "title": [{"plain_text": format!("Page {}", n)}]},
        },
    })
}

pub fn database(n: u64, edited_minute: i64) -> Value {
    json!({
        "object": "database",
        "id": id(n),
        "created_time": stamp(0),
        "last_edited_time": stamp(edited_minute),
        "title": [{"plain_text": format!("Database {}", n)}],
        "description": [],
        "properties": {},
        "archived": false,
        "is_inline": false,
    })
}

pub fn block(n: u64, has_children: bool) -> Value {
    json!({
        "object": "block",
        "id": id(n),
        "type": "paragraph",
        "created_time": stamp(0),
        "last_edited_time": stamp(1),
        "has_children": has_children,
        "archived": false,
        "paragraph": {"rich_text": [{"plain_text": format!("Block {}", n)}]},
    })
}

pub fn comment(n: u64, page: u64, created_minute: i64) -> Value {
    json!({
        "object": "comment",
        "id": id(n),
        "parent": {"type": "page_id", "page_id": id(page)},
        "discussion_id": id(n + 1_000),
        "created_time": stamp(created_minute),
        "last_edited_time": stamp(created_minute),
        "created_by": {"object": "user", "id": id(1)},
        "rich_text": [{"plain_text": format!("Comment {}", n)}],
    })
}

/// A configuration with every stream disabled except `streams`.
pub fn config_for(streams: &[&str]) -> ExtractionConfig {
    let mut config = ExtractionConfig::new(Credentials::Token {
        token: "secret_test".to_string(),
    });
    config.sync_users = streams.contains(&"users");
    config.sync_databases = streams.contains(&"databases");
    config.sync_pages = streams.contains(&"pages");
    config.sync_blocks = streams.contains(&"blocks");
    config.sync_comments = streams.contains(&"comments");
    config.requests_per_second = 1_000.0;
    config.burst_capacity = 1_000;
    config.base_retry_delay = 0.1;
    config.max_retry_delay = 1.0;
    config
}

/// Serves listings with offset cursors and replays scripted failures.
#[derive(Default)]
pub struct FakeWorkspace {
    pub users: Vec<Value>,
    pub databases: Vec<Value>,
    pub pages: Vec<Value>,
    /// Block id to its children
    pub children: HashMap<String, Vec<Value>>,
    /// Page id to its comments
    pub comments: HashMap<String, Vec<Value>>,
    /// Listings report one more, empty page after their last item.
    pub trailing_empty_page: bool,
    /// Statuses returned, in order, by calls whose endpoint starts with the key
    scripted: Mutex<HashMap<String, VecDeque<u16>>>,
    /// Statuses returned by the nth call overall, counted from 1
    failing_calls: Mutex<HashMap<usize, u16>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, route: &str, statuses: &[u16]) {
        self.scripted
            .lock()
            .entry(route.to_string())
            .or_default()
            .extend(statuses.iter().copied());
    }

    pub fn fail_call(&self, call: usize, status: u16) {
        self.failing_calls.lock().insert(call, status);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn calls_to(&self, route: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|request| route_of(request).starts_with(route))
            .count()
    }

    fn listing(&self, request: &ApiRequest, items: &[Value]) -> RawResponse {
        let (page_size, cursor) = match request.method {
            HttpMethod::Get => (
                request.query_param("page_size").and_then(|s| s.parse().ok()),
                request.query_param("start_cursor").map(str::to_string),
            ),
            HttpMethod::Post => {
                let body = request.body.clone().unwrap_or(Value::Null);
                (
                    body["page_size"].as_u64().map(|n| n as usize),
                    body["start_cursor"].as_str().map(str::to_string),
                )
            }
        };
        let page_size: usize = page_size.unwrap_or(100);
        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0).min(items.len());
        let end = (start + page_size).min(items.len());
        let has_more = end < items.len() || (self.trailing_empty_page && start < items.len());

        ok(json!({
            "object": "list",
            "results": items[start..end].to_vec(),
            "next_cursor": has_more.then(|| end.to_string()),
            "has_more": has_more,
        }))
    }

    fn route(&self, request: &ApiRequest) -> RawResponse {
        let path = request.path.as_str();
        match (request.method, path) {
            (HttpMethod::Get, "users/me") => ok(json!({
                "object": "user",
                "id": id(999),
                "type": "bot",
                "name": "Extractor",
                "bot": {},
            })),
            (HttpMethod::Get, "users") => self.listing(request, &self.users),
            (HttpMethod::Post, "search") => {
                let object = request
                    .body
                    .as_ref()
                    .and_then(|body| body["filter"]["value"].as_str())
                    .unwrap_or_default();
                match object {
                    "database" => self.listing(request, &self.databases),
                    _ => self.listing(request, &self.pages),
                }
            }
            (HttpMethod::Get, "comments") => {
                let block_id = request.query_param("block_id").unwrap_or_default();
                let comments = self.comments.get(block_id).cloned().unwrap_or_default();
                self.listing(request, &comments)
            }
            (HttpMethod::Get, path) if path.starts_with("blocks/") && path.ends_with("/children") => {
                let block_id = &path["blocks/".len()..path.len() - "/children".len()];
                let children = self.children.get(block_id).cloned().unwrap_or_default();
                self.listing(request, &children)
            }
            _ => failure(404),
        }
    }
}

#[async_trait::async_trait]
impl Transport for FakeWorkspace {
    async fn send(
        &self,
        request: &ApiRequest,
        _authorization: &str,
    ) -> Result<RawResponse, TransportError> {
        let call = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };

        if let Some(status) = self.failing_calls.lock().remove(&call) {
            return Ok(failure(status));
        }

        let route = route_of(request);
        let scripted = self
            .scripted
            .lock()
            .iter_mut()
            .find(|(prefix, _)| route.starts_with(prefix.as_str()))
            .and_then(|(_, statuses)| statuses.pop_front());
        if let Some(status) = scripted {
            return Ok(failure(status));
        }

        Ok(self.route(request))
    }
}

/// `"GET users"`, `"POST search"`, ...
fn route_of(request: &ApiRequest) -> String {
    request.endpoint()
}

fn ok(body: Value) -> RawResponse {
    RawResponse {
        status: 200,
        body: body.to_string(),
        retry_after: None,
        request_id: None,
    }
}

pub fn failure(status: u16) -> RawResponse {
    let code = match status {
        400 => "validation_error",
        401 => "unauthorized",
        403 => "restricted_resource",
        404 => "object_not_found",
        429 => "rate_limited",
        _ => "internal_server_error",
    };
    RawResponse {
        status,
        body: json!({"object": "error", "status": status, "code": code, "message": "scripted"})
            .to_string(),
        retry_after: None,
        request_id: Some(format!("req-{}", status)),
    }
}
