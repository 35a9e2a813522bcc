// src/streams/blocks.rs
//! The blocks stream: every page's block tree, one page at a time.
//!
//! Blocks carry no reliable change marker of their own, so incremental
//! progress is measured by the parent page's `last_edited_time`. A page's
//! boundary is only emitted once its whole subtree has been yielded.

use super::normalize::{normalize_block, timestamp_field};
use super::{ExtractionContext, Extracted, Floor, ParentPage, ParentPageWalker, Record, StreamKind};
use crate::api::{BlockTraversal, BlockTreeFetcher};
use crate::error::AppError;
use chrono::{DateTime, Utc};

struct ActiveSubtree {
    parent: ParentPage,
    page_id: String,
    traversal: BlockTraversal,
}

pub struct BlockExtractor {
    parents: ParentPageWalker,
    fetcher: BlockTreeFetcher,
    max_depth: u32,
    active: Option<ActiveSubtree>,
    last_completed: Option<DateTime<Utc>>,
    watermark: Option<DateTime<Utc>>,
    records: u64,
}

impl BlockExtractor {
    pub fn new(context: &ExtractionContext, floor: Option<Floor>) -> Self {
        Self {
            parents: ParentPageWalker::new(context, floor),
            fetcher: context.block_fetcher(),
            max_depth: context.config.max_block_depth,
            active: None,
            last_completed: None,
            watermark: None,
            records: 0,
        }
    }

    pub async fn next(&mut self) -> Result<Option<Extracted>, AppError> {
        loop {
            if let Some(active) = self.active.as_mut() {
                match active.traversal.next_node().await? {
                    // The page itself is already a record of the pages stream.
                    Some(node) if node.depth == 0 => continue,
                    Some(node) => {
                        let data = normalize_block(&node, &active.page_id);
                        let modified_at = timestamp_field(&node.raw, "last_edited_time");
                        self.records += 1;
                        return Ok(Some(Extracted::Record(Record::new(
                            StreamKind::Blocks,
                            data,
                            modified_at,
                        )?)));
                    }
                    None => {
                        if let Some(done) = self.active.take() {
                            log::debug!(
                                "Finished blocks of page {} ({} blocks listed)",
                                done.page_id,
                                done.traversal.expanded()
                            );
                            let watermark = self.complete(&done.parent);
                            return Ok(Some(Extracted::Boundary { watermark }));
                        }
                    }
                }
            }

            match self.parents.next_parent().await? {
                Some(parent) => {
                    let page_id = parent.id.to_hyphenated();
                    let traversal =
                        self.fetcher
                            .traverse(parent.id.clone(), "page", self.max_depth);
                    self.active = Some(ActiveSubtree {
                        parent,
                        page_id,
                        traversal,
                    });
                }
                None => {
                    log::info!("Read {} blocks", self.records);
                    return Ok(None);
                }
            }
        }
    }

    /// Watermark after a page's subtree is complete.
    ///
    /// A settled page moves it to the page's own edit time. Otherwise only
    /// the previous page's time is safe, and only if it is strictly earlier.
    fn complete(&mut self, parent: &ParentPage) -> Option<DateTime<Utc>> {
        let candidate = match parent.last_edited_time {
            Some(edited) if parent.settled => Some(edited),
            Some(edited) => self.last_completed.filter(|previous| *previous < edited),
            None => None,
        };
        if parent.last_edited_time.is_some() {
            self.last_completed = parent.last_edited_time;
        }
        self.watermark = self.watermark.max(candidate);
        self.watermark
    }
}
