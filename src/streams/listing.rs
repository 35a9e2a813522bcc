// src/streams/listing.rs
//! Streams that are a single paginated listing: users, databases, pages.

use super::normalize::{normalize_database, normalize_page, normalize_user, timestamp_field};
use super::{passes_floor, settled_watermark, ExtractionContext, Extracted, Floor, Record, StreamKind};
use crate::api::{ApiRequest, Page, Pager};
use crate::error::AppError;
use serde_json::{json, Value};
use std::collections::VecDeque;

/// A search for every object of one type, oldest edit first.
///
/// Ascending order is what lets a checkpoint taken mid-listing be safe.
pub(crate) fn search_request(object: &str) -> ApiRequest {
    ApiRequest::post(
        "search",
        json!({
            "filter": {"property": "object", "value": object},
            "sort": {"direction": "ascending", "timestamp": "last_edited_time"},
        }),
    )
}

fn listing_request(kind: StreamKind) -> ApiRequest {
    match kind {
        StreamKind::Users => ApiRequest::get("users"),
        StreamKind::Databases => search_request("database"),
        _ => search_request("page"),
    }
}

fn normalize(kind: StreamKind, raw: &Value) -> Value {
    match kind {
        StreamKind::Users => normalize_user(raw),
        StreamKind::Databases => normalize_database(raw),
        _ => normalize_page(raw),
    }
}

pub struct ListingExtractor {
    kind: StreamKind,
    pager: Pager,
    floor: Option<Floor>,
    pending: VecDeque<Extracted>,
    records: u64,
}

impl ListingExtractor {
    pub fn new(kind: StreamKind, context: &ExtractionContext, floor: Option<Floor>) -> Self {
        Self {
            kind,
            pager: context.paginator.paginate(listing_request(kind)),
            floor,
            pending: VecDeque::new(),
            records: 0,
        }
    }

    pub async fn next(&mut self) -> Result<Option<Extracted>, AppError> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Ok(Some(item));
            }
            match self.pager.next_page().await? {
                Some(page) => self.buffer_page(page)?,
                None => {
                    log::info!("Read {} {}", self.records, self.kind);
                    return Ok(None);
                }
            }
        }
    }

    /// Queues the page's admitted records followed by one boundary.
    ///
    /// Pages that admit nothing queue nothing.
    fn buffer_page(&mut self, page: Page) -> Result<(), AppError> {
        let cursor_field = self.kind.descriptor().cursor_field;
        let listing_done = page.is_last();
        let mut stamps = Vec::new();
        let before = self.pending.len();

        for raw in page.items {
            let modified_at = cursor_field.and_then(|field| timestamp_field(&raw, field.as_str()));
            if !passes_floor(self.floor.as_ref(), modified_at) {
                continue;
            }
            stamps.extend(modified_at);
            let record = Record::new(self.kind, normalize(self.kind, &raw), modified_at)?;
            self.pending.push_back(Extracted::Record(record));
        }

        let admitted = self.pending.len() - before;
        if admitted > 0 {
            self.records += admitted as u64;
            self.pending.push_back(Extracted::Boundary {
                watermark: settled_watermark(&stamps, listing_done),
            });
        }
        Ok(())
    }
}
