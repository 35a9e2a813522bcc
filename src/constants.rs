// src/constants.rs
//! Domain constants that define the operational boundaries of the system.
//!
//! Each constant is named for the domain concept it constrains. Reading
//! them should tell you how the extractor behaves against the Notion API:
//! how fast it calls, how long it waits, how deep it descends.

// ---------------------------------------------------------------------------
// Notion API boundaries
// ---------------------------------------------------------------------------

/// Base URL every request path is joined onto.
pub const NOTION_API_BASE_URL: &str = "https://api.notion.com/v1/";

/// The `Notion-Version` header sent when the configuration names none.
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// How many objects the Notion API returns per page of results.
///
/// The Notion API maximum is 100.
pub const NOTION_API_PAGE_SIZE: u32 = 100;

// ---------------------------------------------------------------------------
// Request budget
// ---------------------------------------------------------------------------

/// Sustained request rate Notion grants an integration.
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 3.0;

/// Accepted range for a configured sustained rate.
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.01;
pub const MAX_REQUESTS_PER_SECOND: f64 = 1_000.0;

/// Requests that may be issued back to back before the sustained rate applies.
pub const DEFAULT_BURST_CAPACITY: u32 = 5;

// ---------------------------------------------------------------------------
// Retry behaviour
// ---------------------------------------------------------------------------

pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// First backoff delay, in seconds. Doubles with every retry.
pub const DEFAULT_BASE_RETRY_DELAY_SECS: f64 = 1.0;

/// Ceiling on any single backoff or `Retry-After` wait, in seconds.
pub const DEFAULT_MAX_RETRY_DELAY_SECS: f64 = 60.0;

/// Upper bound of the random jitter, as a fraction of the exponential delay.
///
/// Must stay below 1.0 so that delays never decrease between attempts.
pub const RETRY_JITTER_RATIO: f64 = 0.1;

/// Per-request timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Block traversal
// ---------------------------------------------------------------------------

/// How many levels of nested blocks are fetched below a page by default.
pub const DEFAULT_MAX_BLOCK_DEPTH: u32 = 5;

/// The deepest block traversal a configuration may request.
pub const MAX_BLOCK_DEPTH_LIMIT: u32 = 10;

// ---------------------------------------------------------------------------
// Error display
// ---------------------------------------------------------------------------

/// Maximum characters shown when previewing unparseable response bodies.
pub const ERROR_BODY_PREVIEW_LENGTH: usize = 200;
