// src/lib.rs
//! notion2records library: extracts a Notion workspace as normalized records.
//!
//! # Public API
//!
//! The library exposes types organized by concern:
//! - **Error handling**: `AppError`, `FailureKind`, `ValidationError`
//! - **Configuration**: `ExtractionConfig`, `Credentials`
//! - **API access**: `Transport`, `RequestGovernor`, `ResilientClient`, `Paginator`, `BlockTreeFetcher`
//! - **Streams**: `StreamKind`, `Record`, `StreamExtractor`
//! - **State**: `SyncState`, `SyncStateStore`, `Cursor`
//! - **Orchestration**: `ExtractionOrchestrator`, `ExtractionRun`, `ExtractionEvent`
//! - **Output**: `ProtocolMessage`, `JsonLinesSink`

pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod state;
pub mod streams;
pub mod types;

// --- Error Handling ---
pub use crate::error::{ApiFailure, AppError, FailureKind, NotionErrorCode};
pub use crate::types::{NotionId, ValidationError};

// --- Configuration ---
pub use crate::config::{Credentials, ExtractionConfig};

// --- API Access ---
pub use crate::api::{
    ApiRequest, Authorizer, BlockNode, BlockTreeFetcher, HttpMethod, NotionHttpClient, Paginator,
    RawResponse, RequestGovernor, ResilientClient, RetryPolicy, Transport, TransportError,
};

// --- Streams ---
pub use crate::streams::{Extracted, Floor, Record, StreamExtractor, StreamKind};

// --- State ---
pub use crate::state::{Cursor, CursorField, SyncState, SyncStateStore};

// --- Orchestration ---
pub use crate::orchestrator::{
    CatalogEntry, ConnectionStatus, EventSink, ExtractionEvent, ExtractionOrchestrator,
    ExtractionRun, RunReport, RunStatus, SyncMode,
};

// --- Output ---
pub use crate::output::{JsonLinesSink, ProtocolMessage};
