// src/streams/normalize.rs
//! Shapes raw API objects into the records each stream emits.
//!
//! Records keep Notion's own field names and add a few flattened
//! conveniences: plain-text titles, a property map of simple values, and
//! the page and depth a block was found at.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Map, Value};

use crate::api::BlockNode;

fn field(raw: &Value, key: &str) -> Value {
    raw.get(key).cloned().unwrap_or(Value::Null)
}

/// Concatenates the `plain_text` of a rich text array.
pub fn extract_plain_text(rich_text: &Value) -> String {
    rich_text
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("plain_text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Like `extract_plain_text`, but `None` for a missing or empty array.
fn plain_text_or_null(rich_text: Option<&Value>) -> Value {
    match rich_text {
        Some(value) if value.as_array().is_some_and(|items| !items.is_empty()) => {
            json!(extract_plain_text(value))
        }
        _ => Value::Null,
    }
}

/// Parses an RFC 3339 timestamp, or a bare `YYYY-MM-DD` date as midnight UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Reads a timestamp field of a raw object.
pub fn timestamp_field(raw: &Value, key: &str) -> Option<DateTime<Utc>> {
    raw.get(key).and_then(Value::as_str).and_then(parse_timestamp)
}

fn ids_of(items: Option<&Value>) -> Value {
    Value::Array(
        items
            .and_then(Value::as_array)
            .map(|items| items.iter().map(|item| field(item, "id")).collect())
            .unwrap_or_default(),
    )
}

/// Reduces one property object to a simple value.
pub fn extract_property_value(property: &Value) -> Value {
    let Some(kind) = property.get("type").and_then(Value::as_str) else {
        return Value::Null;
    };
    let data = property.get(kind);

    match kind {
        "title" | "rich_text" => json!(extract_plain_text(data.unwrap_or(&Value::Null))),
        "select" | "status" => data
            .and_then(|option| option.get("name"))
            .cloned()
            .unwrap_or(Value::Null),
        "multi_select" => Value::Array(
            data.and_then(Value::as_array)
                .map(|options| options.iter().map(|o| field(o, "name")).collect())
                .unwrap_or_default(),
        ),
        "date" => match data {
            Some(date) if !date.is_null() => json!({
                "start": field(date, "start"),
                "end": field(date, "end"),
                "time_zone": field(date, "time_zone"),
            }),
            _ => Value::Null,
        },
        "people" | "relation" => ids_of(data),
        "files" => Value::Array(
            data.and_then(Value::as_array)
                .map(|files| {
                    files
                        .iter()
                        .filter_map(|file| {
                            let hosting = file.get("type").and_then(Value::as_str)?;
                            match hosting {
                                "external" | "file" => file.get(hosting).map(|h| field(h, "url")),
                                _ => None,
                            }
                        })
                        .collect()
                })
                .unwrap_or_default(),
        ),
        "formula" | "rollup" => data
            .and_then(|result| {
                let result_type = result.get("type").and_then(Value::as_str)?;
                result.get(result_type).cloned()
            })
            .unwrap_or(Value::Null),
        "created_by" | "last_edited_by" => data.map(|user| field(user, "id")).unwrap_or(Value::Null),
        "unique_id" => {
            let number = data.map(|u| field(u, "number")).unwrap_or(Value::Null);
            let number = match number {
                Value::Null => String::new(),
                other => other.to_string(),
            };
            match data.and_then(|u| u.get("prefix")).and_then(Value::as_str) {
                Some(prefix) if !prefix.is_empty() => json!(format!("{}-{}", prefix, number)),
                _ => json!(number),
            }
        }
        // number, checkbox, url, email, phone_number, created_time,
        // last_edited_time, verification and anything newer pass through.
        _ => data.cloned().unwrap_or(Value::Null),
    }
}

/// Property name to simple value, preserving the API's property order.
pub fn flatten_properties(properties: &Value) -> Value {
    let flat: Map<String, Value> = properties
        .as_object()
        .map(|props| {
            props
                .iter()
                .map(|(name, property)| (name.clone(), extract_property_value(property)))
                .collect()
        })
        .unwrap_or_default();
    Value::Object(flat)
}

pub fn normalize_user(raw: &Value) -> Value {
    let email = if raw.get("type").and_then(Value::as_str) == Some("person") {
        raw.get("person")
            .map(|person| field(person, "email"))
            .unwrap_or(Value::Null)
    } else {
        Value::Null
    };

    json!({
        "id": field(raw, "id"),
        "object": field(raw, "object"),
        "type": field(raw, "type"),
        "name": field(raw, "name"),
        "avatar_url": field(raw, "avatar_url"),
        "email": email,
        "person": field(raw, "person"),
        "bot": field(raw, "bot"),
    })
}

pub fn normalize_database(raw: &Value) -> Value {
    json!({
        "id": field(raw, "id"),
        "object": field(raw, "object"),
        "title": extract_plain_text(raw.get("title").unwrap_or(&Value::Null)),
        "description": plain_text_or_null(raw.get("description")),
        "created_time": field(raw, "created_time"),
        "last_edited_time": field(raw, "last_edited_time"),
        "created_by": field(raw, "created_by"),
        "last_edited_by": field(raw, "last_edited_by"),
        "icon": field(raw, "icon"),
        "cover": field(raw, "cover"),
        "properties": field(raw, "properties"),
        "parent": field(raw, "parent"),
        "url": field(raw, "url"),
        "archived": field(raw, "archived"),
        "is_inline": field(raw, "is_inline"),
    })
}

pub fn normalize_page(raw: &Value) -> Value {
    let properties = raw.get("properties").cloned().unwrap_or_else(|| json!({}));
    let title = properties
        .as_object()
        .and_then(|props| {
            props
                .values()
                .find(|p| p.get("type").and_then(Value::as_str) == Some("title"))
        })
        .map(|p| json!(extract_plain_text(p.get("title").unwrap_or(&Value::Null))))
        .unwrap_or(Value::Null);

    json!({
        "id": field(raw, "id"),
        "object": field(raw, "object"),
        "created_time": field(raw, "created_time"),
        "last_edited_time": field(raw, "last_edited_time"),
        "created_by": field(raw, "created_by"),
        "last_edited_by": field(raw, "last_edited_by"),
        "parent": field(raw, "parent"),
        "archived": field(raw, "archived"),
        "properties_flat": flatten_properties(&properties),
        "properties": properties,
        "icon": field(raw, "icon"),
        "cover": field(raw, "cover"),
        "url": field(raw, "url"),
        "title": title,
    })
}

/// A block record, tagged with the page it was found under.
pub fn normalize_block(node: &BlockNode, page_id: &str) -> Value {
    let raw = &node.raw;
    json!({
        "id": field(raw, "id"),
        "object": field(raw, "object"),
        "type": node.block_type,
        "created_time": field(raw, "created_time"),
        "last_edited_time": field(raw, "last_edited_time"),
        "created_by": field(raw, "created_by"),
        "last_edited_by": field(raw, "last_edited_by"),
        "has_children": node.has_children,
        "archived": field(raw, "archived"),
        "parent": field(raw, "parent"),
        "parent_id": node.parent_id.as_ref().map(|id| id.to_hyphenated()),
        "page_id": page_id,
        "depth": node.depth,
        "content": field(raw, &node.block_type),
    })
}

pub fn normalize_comment(raw: &Value, page_id: &str) -> Value {
    json!({
        "id": field(raw, "id"),
        "object": field(raw, "object"),
        "parent": field(raw, "parent"),
        "discussion_id": field(raw, "discussion_id"),
        "created_time": field(raw, "created_time"),
        "last_edited_time": field(raw, "last_edited_time"),
        "created_by": field(raw, "created_by"),
        "rich_text": raw.get("rich_text").cloned().unwrap_or_else(|| json!([])),
        "text": plain_text_or_null(raw.get("rich_text")),
        "page_id": page_id,
    })
}
