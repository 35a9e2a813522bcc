// src/streams/mod.rs
//! The five record streams and the extractors that produce them.
//!
//! Each extractor pulls pages lazily and yields records interleaved with
//! checkpoint boundaries. A boundary carries the watermark the stream's
//! cursor may advance to once everything before it has been delivered.

mod blocks;
mod comments;
mod listing;
pub mod normalize;
mod parents;

pub use blocks::BlockExtractor;
pub use comments::CommentExtractor;
pub use listing::ListingExtractor;
pub use parents::{ParentPage, ParentPageWalker};

use crate::api::{BlockTreeFetcher, Paginator};
use crate::config::ExtractionConfig;
use crate::error::AppError;
use crate::state::{Cursor, CursorField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// The closed set of streams, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Users,
    Databases,
    Pages,
    Blocks,
    Comments,
}

/// Static facts about a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub name: &'static str,
    pub primary_key: &'static str,
    pub supports_incremental: bool,
    pub cursor_field: Option<CursorField>,
}

const USERS: StreamDescriptor = StreamDescriptor {
    name: "users",
    primary_key: "id",
    supports_incremental: false,
    cursor_field: None,
};

const DATABASES: StreamDescriptor = StreamDescriptor {
    name: "databases",
    primary_key: "id",
    supports_incremental: true,
    cursor_field: Some(CursorField::LastEditedTime),
};

const PAGES: StreamDescriptor = StreamDescriptor {
    name: "pages",
    primary_key: "id",
    supports_incremental: true,
    cursor_field: Some(CursorField::LastEditedTime),
};

const BLOCKS: StreamDescriptor = StreamDescriptor {
    name: "blocks",
    primary_key: "id",
    supports_incremental: true,
    cursor_field: Some(CursorField::LastEditedTime),
};

const COMMENTS: StreamDescriptor = StreamDescriptor {
    name: "comments",
    primary_key: "id",
    supports_incremental: true,
    cursor_field: Some(CursorField::CreatedTime),
};

impl StreamKind {
    pub const ALL: [StreamKind; 5] = [
        StreamKind::Users,
        StreamKind::Databases,
        StreamKind::Pages,
        StreamKind::Blocks,
        StreamKind::Comments,
    ];

    pub fn descriptor(&self) -> &'static StreamDescriptor {
        match self {
            StreamKind::Users => &USERS,
            StreamKind::Databases => &DATABASES,
            StreamKind::Pages => &PAGES,
            StreamKind::Blocks => &BLOCKS,
            StreamKind::Comments => &COMMENTS,
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// JSON schema of the records this stream emits.
    pub fn json_schema(&self) -> Value {
        let nullable = |t: &str| json!({"type": [t, "null"]});
        let mut properties = serde_json::Map::new();
        properties.insert("id".into(), json!({"type": "string"}));
        properties.insert("object".into(), json!({"type": "string"}));

        let fields: &[(&str, &str)] = match self {
            StreamKind::Users => &[
                ("type", "string"),
                ("name", "string"),
                ("avatar_url", "string"),
                ("email", "string"),
                ("person", "object"),
                ("bot", "object"),
            ],
            StreamKind::Databases => &[
                ("title", "string"),
                ("description", "string"),
                ("created_time", "string"),
                ("last_edited_time", "string"),
                ("created_by", "object"),
                ("last_edited_by", "object"),
                ("icon", "object"),
                ("cover", "object"),
                ("properties", "object"),
                ("parent", "object"),
                ("url", "string"),
                ("archived", "boolean"),
                ("is_inline", "boolean"),
            ],
            StreamKind::Pages => &[
                ("created_time", "string"),
                ("last_edited_time", "string"),
                ("created_by", "object"),
                ("last_edited_by", "object"),
                ("parent", "object"),
                ("archived", "boolean"),
                ("properties", "object"),
                ("properties_flat", "object"),
                ("icon", "object"),
                ("cover", "object"),
                ("url", "string"),
                ("title", "string"),
            ],
            StreamKind::Blocks => &[
                ("type", "string"),
                ("created_time", "string"),
                ("last_edited_time", "string"),
                ("created_by", "object"),
                ("last_edited_by", "object"),
                ("has_children", "boolean"),
                ("archived", "boolean"),
                ("parent", "object"),
                ("parent_id", "string"),
                ("page_id", "string"),
                ("depth", "integer"),
                ("content", "object"),
            ],
            StreamKind::Comments => &[
                ("parent", "object"),
                ("discussion_id", "string"),
                ("created_time", "string"),
                ("last_edited_time", "string"),
                ("created_by", "object"),
                ("rich_text", "array"),
                ("text", "string"),
                ("page_id", "string"),
            ],
        };
        for &(name, ty) in fields {
            properties.insert(name.to_string(), nullable(ty));
        }

        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": properties,
            "required": [self.descriptor().primary_key],
        })
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One normalized record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub stream: StreamKind,
    pub primary_key: String,
    pub data: Value,
    /// The value of the stream's cursor field, when it has one
    pub modified_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Wraps normalized data, which must carry a string primary key.
    pub fn new(
        stream: StreamKind,
        data: Value,
        modified_at: Option<DateTime<Utc>>,
    ) -> Result<Self, AppError> {
        let key_field = stream.descriptor().primary_key;
        let primary_key = data
            .get(key_field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::MalformedResponse(format!("{} record without '{}'", stream, key_field))
            })?;
        Ok(Self {
            stream,
            primary_key,
            data,
            modified_at,
        })
    }
}

/// What an extractor yields.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Record(Record),
    /// Everything before this point has been yielded. The cursor may move
    /// up to `watermark`; `None` means progress without a new safe value.
    Boundary { watermark: Option<DateTime<Utc>> },
}

/// Lower bound on record timestamps a stream extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Floor {
    pub value: DateTime<Utc>,
    /// Start dates include their instant; cursors exclude theirs.
    pub inclusive: bool,
}

impl Floor {
    /// The stricter of a stored cursor and the configured start date.
    pub fn resolve(cursor: Option<&Cursor>, start_date: Option<DateTime<Utc>>) -> Option<Floor> {
        let from_cursor = cursor.map(|c| Floor {
            value: c.value,
            inclusive: false,
        });
        let from_start = start_date.map(|value| Floor {
            value,
            inclusive: true,
        });
        match (from_cursor, from_start) {
            (Some(c), Some(s)) if s.value > c.value => Some(s),
            (Some(c), _) => Some(c),
            (None, s) => s,
        }
    }

    pub fn admits(&self, timestamp: DateTime<Utc>) -> bool {
        if self.inclusive {
            timestamp >= self.value
        } else {
            timestamp > self.value
        }
    }
}

/// Whether a record with this timestamp passes an optional floor.
///
/// Records without a timestamp are always admitted.
pub(crate) fn passes_floor(floor: Option<&Floor>, timestamp: Option<DateTime<Utc>>) -> bool {
    match (floor, timestamp) {
        (Some(floor), Some(ts)) => floor.admits(ts),
        _ => true,
    }
}

/// The highest timestamp a checkpoint may claim after a listing page.
///
/// When later pages may still hold records sharing the page's greatest
/// timestamp, the watermark stays strictly below it.
pub(crate) fn settled_watermark(
    stamps: &[DateTime<Utc>],
    listing_done: bool,
) -> Option<DateTime<Utc>> {
    let max = stamps.iter().max().copied()?;
    if listing_done {
        Some(max)
    } else {
        stamps.iter().filter(|ts| **ts < max).max().copied()
    }
}

/// Shared plumbing every extractor draws on.
#[derive(Clone)]
pub struct ExtractionContext {
    pub paginator: Paginator,
    pub config: Arc<ExtractionConfig>,
}

impl ExtractionContext {
    pub fn new(paginator: Paginator, config: Arc<ExtractionConfig>) -> Self {
        Self { paginator, config }
    }

    pub fn block_fetcher(&self) -> BlockTreeFetcher {
        BlockTreeFetcher::new(self.paginator.clone())
    }
}

/// One extractor per stream kind.
pub enum StreamExtractor {
    Users(ListingExtractor),
    Databases(ListingExtractor),
    Pages(ListingExtractor),
    Blocks(BlockExtractor),
    Comments(CommentExtractor),
}

impl StreamExtractor {
    pub fn new(kind: StreamKind, context: &ExtractionContext, floor: Option<Floor>) -> Self {
        match kind {
            StreamKind::Users => Self::Users(ListingExtractor::new(kind, context, None)),
            StreamKind::Databases => Self::Databases(ListingExtractor::new(kind, context, floor)),
            StreamKind::Pages => Self::Pages(ListingExtractor::new(kind, context, floor)),
            StreamKind::Blocks => Self::Blocks(BlockExtractor::new(context, floor)),
            StreamKind::Comments => Self::Comments(CommentExtractor::new(context, floor)),
        }
    }

    pub fn kind(&self) -> StreamKind {
        match self {
            Self::Users(_) => StreamKind::Users,
            Self::Databases(_) => StreamKind::Databases,
            Self::Pages(_) => StreamKind::Pages,
            Self::Blocks(_) => StreamKind::Blocks,
            Self::Comments(_) => StreamKind::Comments,
        }
    }

    /// Next record or boundary; `None` once the stream is exhausted.
    pub async fn next(&mut self) -> Result<Option<Extracted>, AppError> {
        match self {
            Self::Users(x) | Self::Databases(x) | Self::Pages(x) => x.next().await,
            Self::Blocks(x) => x.next().await,
            Self::Comments(x) => x.next().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(StreamKind::Users.descriptor().cursor_field, None);
        assert!(!StreamKind::Users.descriptor().supports_incremental);
        assert_eq!(
            StreamKind::Comments.descriptor().cursor_field,
            Some(CursorField::CreatedTime)
        );
        assert_eq!(StreamKind::from_name("blocks"), Some(StreamKind::Blocks));
        assert_eq!(StreamKind::from_name("teams"), None);
    }

    #[test]
    fn test_floor_prefers_the_later_bound() {
        let cursor = Cursor {
            cursor_field: CursorField::LastEditedTime,
            value: at(10),
        };

        let floor = Floor::resolve(Some(&cursor), Some(at(5))).unwrap();
        assert!(!floor.inclusive);
        assert!(!floor.admits(at(10)));
        assert!(floor.admits(at(11)));

        let floor = Floor::resolve(Some(&cursor), Some(at(20))).unwrap();
        assert!(floor.inclusive);
        assert!(floor.admits(at(20)));

        assert_eq!(Floor::resolve(None, None), None);
    }

    #[test]
    fn test_watermark_holds_back_ties_until_listing_done() {
        let stamps = [at(1), at(2), at(3), at(3)];
        assert_eq!(settled_watermark(&stamps, true), Some(at(3)));
        assert_eq!(settled_watermark(&stamps, false), Some(at(2)));
        assert_eq!(settled_watermark(&[at(3), at(3)], false), None);
        assert_eq!(settled_watermark(&[], true), None);
    }

    #[test]
    fn test_schema_requires_primary_key() {
        let schema = StreamKind::Pages.json_schema();
        assert_eq!(schema["required"], json!(["id"]));
        assert_eq!(
            schema["properties"]["properties_flat"]["type"],
            json!(["object", "null"])
        );
    }
}
