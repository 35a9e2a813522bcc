// src/orchestrator.rs
//! Sequences the enabled streams into one extraction run.
//!
//! A run is pull-driven: nothing is requested until the caller asks for
//! the next event, and dropping the run stops all further calls. Records
//! arrive in stream order; after each checkpoint boundary the caller
//! receives the full state snapshot to persist.

use crate::api::{
    ApiRequest, Paginator, RequestGovernor, ResilientClient, Transport,
};
use crate::config::ExtractionConfig;
use crate::error::{AppError, FailureKind};
use crate::state::{SyncState, SyncStateStore};
use crate::streams::{ExtractionContext, Extracted, Floor, Record, StreamExtractor, StreamKind};
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    FullRefresh,
    Incremental,
}

/// What a run hands to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionEvent {
    Record(Record),
    State(SyncState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed { stream: StreamKind, reason: String },
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => f.write_str("running"),
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::Failed { stream, reason } => write!(f, "failed in {}: {}", stream, reason),
        }
    }
}

/// Receives events as a run produces them.
pub trait EventSink {
    fn emit(&mut self, event: ExtractionEvent) -> Result<(), AppError>;
}

impl EventSink for Vec<ExtractionEvent> {
    fn emit(&mut self, event: ExtractionEvent) -> Result<(), AppError> {
        self.push(event);
        Ok(())
    }
}

/// Summary of a run driven to its end.
#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub records: u64,
    pub checkpoints: u64,
    pub final_state: SyncState,
    /// The error that ended a failed run
    pub failure: Option<AppError>,
}

/// One entry of the stream catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub json_schema: Value,
    pub supported_sync_modes: Vec<SyncMode>,
    pub source_defined_cursor: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub default_cursor_field: Vec<String>,
    pub source_defined_primary_key: Vec<Vec<String>>,
}

impl CatalogEntry {
    fn for_stream(kind: StreamKind) -> Self {
        let descriptor = kind.descriptor();
        let mut supported_sync_modes = vec![SyncMode::FullRefresh];
        if descriptor.supports_incremental {
            supported_sync_modes.push(SyncMode::Incremental);
        }
        Self {
            name: descriptor.name,
            json_schema: kind.json_schema(),
            supported_sync_modes,
            source_defined_cursor: descriptor.supports_incremental,
            default_cursor_field: descriptor
                .cursor_field
                .map(|field| vec![field.as_str().to_string()])
                .unwrap_or_default(),
            source_defined_primary_key: vec![vec![descriptor.primary_key.to_string()]],
        }
    }
}

/// Outcome of a connectivity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub succeeded: bool,
    pub message: String,
}

pub struct ExtractionOrchestrator {
    config: Arc<ExtractionConfig>,
    client: Arc<ResilientClient>,
    context: ExtractionContext,
}

impl ExtractionOrchestrator {
    /// An orchestrator with its own governor paced by the configuration.
    pub fn new(config: ExtractionConfig, transport: Arc<dyn Transport>) -> Self {
        let governor = Arc::new(RequestGovernor::from_config(&config));
        Self::with_governor(config, transport, governor)
    }

    /// An orchestrator sharing an existing governor.
    pub fn with_governor(
        config: ExtractionConfig,
        transport: Arc<dyn Transport>,
        governor: Arc<RequestGovernor>,
    ) -> Self {
        let config = Arc::new(config);
        let client = Arc::new(ResilientClient::from_config(&config, transport, governor));
        let paginator = Paginator::new(Arc::clone(&client), config.page_size);
        let context = ExtractionContext::new(paginator, Arc::clone(&config));
        Self {
            config,
            client,
            context,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<ResilientClient> {
        &self.client
    }

    /// Verifies the credentials reach the workspace as a user.
    pub async fn check(&self) -> ConnectionStatus {
        log::info!("Checking connection to Notion API");
        match self.client.execute(&ApiRequest::get("users/me")).await {
            Ok(me) if me.get("object").and_then(Value::as_str) == Some("user") => {
                let name = me.get("name").and_then(Value::as_str).unwrap_or("Bot");
                ConnectionStatus {
                    succeeded: true,
                    message: format!("Connected to Notion workspace as {}", name),
                }
            }
            Ok(_) => ConnectionStatus {
                succeeded: false,
                message: "users/me did not return a user object".to_string(),
            },
            Err(err) if err.kind() == Some(FailureKind::PermissionDenied) => ConnectionStatus {
                succeeded: false,
                message: "Integration does not have sufficient permissions. \
                          Check the integration capabilities in Notion settings."
                    .to_string(),
            },
            Err(err) => {
                log::error!("Connection check failed: {}", err);
                ConnectionStatus {
                    succeeded: false,
                    message: err.to_string(),
                }
            }
        }
    }

    /// The enabled streams and what each supports.
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        self.config
            .enabled_streams()
            .into_iter()
            .map(CatalogEntry::for_stream)
            .collect()
    }

    /// Prepares a run. No request is made until the first event is pulled.
    ///
    /// Full refresh ignores `input_state` but still records cursors, so
    /// its final state can seed the next incremental run.
    pub fn read(&self, mode: SyncMode, input_state: SyncState) -> ExtractionRun {
        let store = match mode {
            SyncMode::FullRefresh => SyncStateStore::new(),
            SyncMode::Incremental => SyncStateStore::from_state(input_state),
        };
        let streams = self.config.enabled_streams();
        log::info!(
            "Starting {:?} run over {} stream(s)",
            mode,
            streams.len()
        );
        ExtractionRun {
            context: self.context.clone(),
            mode,
            store,
            remaining: streams.into(),
            current: None,
            status: RunStatus::Running,
            records: 0,
            checkpoints: 0,
        }
    }
}

/// A single pass over the enabled streams.
pub struct ExtractionRun {
    context: ExtractionContext,
    mode: SyncMode,
    store: SyncStateStore,
    remaining: VecDeque<StreamKind>,
    current: Option<StreamExtractor>,
    status: RunStatus,
    records: u64,
    checkpoints: u64,
}

impl ExtractionRun {
    /// Pulls the next event.
    ///
    /// Returns `Ok(None)` once the run has completed. A stream failure is
    /// returned once as `AppError::StreamFailed`; after that the run is
    /// `Failed` and yields nothing more.
    pub async fn next_event(&mut self) -> Result<Option<ExtractionEvent>, AppError> {
        loop {
            if self.status != RunStatus::Running {
                return Ok(None);
            }

            let Some(extractor) = self.current.as_mut() else {
                match self.remaining.pop_front() {
                    Some(kind) => self.open(kind),
                    None => {
                        log::info!(
                            "Run completed: {} records, {} checkpoints",
                            self.records,
                            self.checkpoints
                        );
                        self.status = RunStatus::Completed;
                    }
                }
                continue;
            };

            let kind = extractor.kind();
            match extractor.next().await {
                Ok(Some(Extracted::Record(record))) => {
                    self.records += 1;
                    return Ok(Some(ExtractionEvent::Record(record)));
                }
                Ok(Some(Extracted::Boundary { watermark })) => {
                    if let Some(watermark) = watermark {
                        self.store.advance(kind, watermark);
                    }
                    self.checkpoints += 1;
                    return Ok(Some(ExtractionEvent::State(self.store.snapshot())));
                }
                Ok(None) => {
                    log::info!("Finished stream {}", kind);
                    self.current = None;
                }
                Err(err) => {
                    log::error!("Stream {} failed: {}", kind, err);
                    self.current = None;
                    self.status = RunStatus::Failed {
                        stream: kind,
                        reason: err.to_string(),
                    };
                    return Err(AppError::StreamFailed {
                        stream: kind.name().to_string(),
                        source: Box::new(err),
                    });
                }
            }
        }
    }

    fn open(&mut self, kind: StreamKind) {
        let floor = if kind.descriptor().supports_incremental {
            let cursor = match self.mode {
                SyncMode::Incremental => self.store.get(kind),
                SyncMode::FullRefresh => None,
            };
            Floor::resolve(cursor.as_ref(), self.context.config.start_date)
        } else {
            None
        };
        log::info!("Reading stream {} (floor: {:?})", kind, floor);
        self.current = Some(StreamExtractor::new(kind, &self.context, floor));
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    /// Current cursors, as of the last checkpoint.
    pub fn state(&self) -> SyncState {
        self.store.snapshot()
    }

    /// Drives the run to its end, handing every event to `sink`.
    ///
    /// Stream failures end the run and are reported in the returned
    /// report; only a failing sink aborts with an error.
    pub async fn run<S>(mut self, sink: &mut S) -> Result<RunReport, AppError>
    where
        S: EventSink + ?Sized,
    {
        let mut failure = None;
        loop {
            match self.next_event().await {
                Ok(Some(event)) => sink.emit(event)?,
                Ok(None) => break,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        Ok(RunReport {
            status: self.status.clone(),
            records: self.records,
            checkpoints: self.checkpoints,
            final_state: self.store.snapshot(),
            failure,
        })
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<ExtractionEvent, AppError>> {
        futures::stream::unfold(self, |mut run| async move {
            match run.next_event().await {
                Ok(Some(event)) => Some((Ok(event), run)),
                Ok(None) => None,
                Err(err) => Some((Err(err), run)),
            }
        })
    }
}
