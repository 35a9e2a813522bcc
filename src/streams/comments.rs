// src/streams/comments.rs
//! The comments stream: unresolved comments on every page.
//!
//! Comments are keyed on `created_time`, which follows no order across
//! pages, so the cursor only settles once every page has been visited.
//! Boundaries along the way mark progress without moving it.

use super::normalize::{normalize_comment, timestamp_field};
use super::{passes_floor, ExtractionContext, Extracted, Floor, ParentPageWalker, Record, StreamKind};
use crate::api::{ApiRequest, Page, Pager, Paginator};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

struct ActiveThread {
    page_id: String,
    pager: Pager,
}

pub struct CommentExtractor {
    parents: ParentPageWalker,
    paginator: Paginator,
    floor: Option<Floor>,
    active: Option<ActiveThread>,
    pending: VecDeque<Extracted>,
    newest: Option<DateTime<Utc>>,
    finished: bool,
    records: u64,
}

impl CommentExtractor {
    pub fn new(context: &ExtractionContext, floor: Option<Floor>) -> Self {
        Self {
            // Old pages gain new comments without being edited.
            parents: ParentPageWalker::new(context, None),
            paginator: context.paginator.clone(),
            floor,
            active: None,
            pending: VecDeque::new(),
            newest: None,
            finished: false,
            records: 0,
        }
    }

    pub async fn next(&mut self) -> Result<Option<Extracted>, AppError> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Ok(Some(item));
            }
            if self.finished {
                return Ok(None);
            }

            if let Some(mut thread) = self.active.take() {
                match thread.pager.next_page().await {
                    Ok(Some(page)) => {
                        self.buffer_page(&thread.page_id, page)?;
                        self.active = Some(thread);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        self.active = Some(thread);
                        return Err(err);
                    }
                }
                continue;
            }

            match self.parents.next_parent().await? {
                Some(parent) => {
                    let page_id = parent.id.to_hyphenated();
                    let request = ApiRequest::get("comments").with_query("block_id", page_id.clone());
                    self.active = Some(ActiveThread {
                        pager: self.paginator.paginate(request),
                        page_id,
                    });
                }
                None => {
                    self.finished = true;
                    log::info!("Read {} comments", self.records);
                    if self.newest.is_some() {
                        self.pending.push_back(Extracted::Boundary {
                            watermark: self.newest,
                        });
                    }
                }
            }
        }
    }

    fn buffer_page(&mut self, page_id: &str, page: Page) -> Result<(), AppError> {
        let before = self.pending.len();
        for raw in page.items {
            let created = timestamp_field(&raw, "created_time");
            if !passes_floor(self.floor.as_ref(), created) {
                continue;
            }
            self.newest = self.newest.max(created);
            let record = Record::new(StreamKind::Comments, normalize_comment(&raw, page_id), created)?;
            self.pending.push_back(Extracted::Record(record));
        }

        let admitted = self.pending.len() - before;
        if admitted > 0 {
            self.records += admitted as u64;
            self.pending.push_back(Extracted::Boundary { watermark: None });
        }
        Ok(())
    }
}
