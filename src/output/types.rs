// src/output/types.rs
//! The line protocol the CLI speaks on stdout.
//!
//! Every message is one JSON object tagged by `type`.

use crate::orchestrator::{CatalogEntry, ConnectionStatus, ExtractionEvent};
use crate::state::SyncState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtocolMessage {
    Record { record: RecordMessage },
    State { state: StateMessage },
    Catalog { catalog: CatalogMessage },
    ConnectionStatus { #[serde(rename = "connectionStatus")] connection_status: StatusMessage },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordMessage {
    pub stream: &'static str,
    pub data: Value,
    /// Milliseconds since the Unix epoch
    pub emitted_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMessage {
    pub data: SyncState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogMessage {
    pub streams: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: String,
}

impl ProtocolMessage {
    /// Wraps a run event, stamping records with `now`.
    pub fn from_event(event: ExtractionEvent, now: DateTime<Utc>) -> Self {
        match event {
            ExtractionEvent::Record(record) => ProtocolMessage::Record {
                record: RecordMessage {
                    stream: record.stream.name(),
                    data: record.data,
                    emitted_at: now.timestamp_millis(),
                },
            },
            ExtractionEvent::State(state) => ProtocolMessage::State {
                state: StateMessage { data: state },
            },
        }
    }

    pub fn catalog(streams: Vec<CatalogEntry>) -> Self {
        ProtocolMessage::Catalog {
            catalog: CatalogMessage { streams },
        }
    }

    pub fn connection_status(status: ConnectionStatus) -> Self {
        ProtocolMessage::ConnectionStatus {
            connection_status: StatusMessage {
                status: if status.succeeded { "SUCCEEDED" } else { "FAILED" },
                message: status.message,
            },
        }
    }
}
