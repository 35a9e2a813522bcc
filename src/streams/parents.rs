// src/streams/parents.rs
//! Walks the page listing on behalf of streams that fan out per page.

use super::listing::search_request;
use super::normalize::timestamp_field;
use super::{passes_floor, ExtractionContext, Floor};
use crate::api::Pager;
use crate::error::AppError;
use crate::types::NotionId;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;

/// A page whose children or comments are about to be extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentPage {
    pub id: NotionId,
    pub last_edited_time: Option<DateTime<Utc>>,
    /// No page still to come can share or precede this one's edit time.
    pub settled: bool,
}

pub struct ParentPageWalker {
    pager: Pager,
    floor: Option<Floor>,
    queue: VecDeque<(NotionId, Option<DateTime<Utc>>)>,
    listing_done: bool,
}

impl ParentPageWalker {
    /// Pages edited after `floor`, oldest edit first.
    pub fn new(context: &ExtractionContext, floor: Option<Floor>) -> Self {
        Self {
            pager: context.paginator.paginate(search_request("page")),
            floor,
            queue: VecDeque::new(),
            listing_done: false,
        }
    }

    pub async fn next_parent(&mut self) -> Result<Option<ParentPage>, AppError> {
        while self.queue.is_empty() {
            if self.pager.is_finished() {
                return Ok(None);
            }
            let Some(page) = self.pager.next_page().await? else {
                return Ok(None);
            };
            self.listing_done = page.is_last();
            for raw in &page.items {
                let edited = timestamp_field(raw, "last_edited_time");
                if passes_floor(self.floor.as_ref(), edited) {
                    self.queue.push_back((parent_id(raw)?, edited));
                }
            }
        }

        let Some((id, last_edited_time)) = self.queue.pop_front() else {
            return Ok(None);
        };
        let settled = match self.queue.front() {
            Some((_, next_edit)) => match (last_edited_time, next_edit) {
                (Some(current), Some(next)) => *next > current,
                _ => false,
            },
            None => self.listing_done,
        };

        Ok(Some(ParentPage {
            id,
            last_edited_time,
            settled,
        }))
    }
}

fn parent_id(raw: &Value) -> Result<NotionId, AppError> {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::MalformedResponse("page without an id".to_string()))?;
    NotionId::parse(id).map_err(|e| AppError::MalformedResponse(e.to_string()))
}
