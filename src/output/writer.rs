// src/output/writer.rs
//! Performs the run's output I/O: protocol lines and the state file.

use super::types::ProtocolMessage;
use crate::error::AppError;
use crate::orchestrator::{EventSink, ExtractionEvent};
use crate::state::SyncState;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Writes each message as one JSON line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    lines: u64,
    bytes_written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            lines: 0,
            bytes_written: 0,
        }
    }

    pub fn write_message(&mut self, message: &ProtocolMessage) -> Result<(), AppError> {
        let mut line = serde_json::to_vec(message)
            .map_err(|e| AppError::Sink(format!("cannot serialize message: {}", e)))?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.lines += 1;
        self.bytes_written += line.len();
        Ok(())
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: ExtractionEvent) -> Result<(), AppError> {
        let is_state = matches!(event, ExtractionEvent::State(_));
        self.write_message(&ProtocolMessage::from_event(event, Utc::now()))?;
        // A checkpoint only counts once it has left the process.
        if is_state {
            self.writer.flush()?;
        }
        Ok(())
    }
}

/// Reads a state file; a missing file means no prior state.
pub fn load_state(path: &Path) -> Result<SyncState, AppError> {
    if !path.exists() {
        log::info!("No state file at {}, starting fresh", path.display());
        return Ok(SyncState::new());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(SyncState::new());
    }
    let state = serde_json::from_str(&contents).map_err(|e| {
        AppError::Configuration(crate::types::ValidationError::Unparseable(format!(
            "state file {}: {}",
            path.display(),
            e
        )))
    })?;
    Ok(state)
}

/// Writes the state file, creating parent directories as needed.
pub fn write_state(path: &Path, state: &SyncState) -> Result<usize, AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_json::to_string_pretty(state)
        .map_err(|e| AppError::Sink(format!("cannot serialize state: {}", e)))?;
    fs::write(path, &contents)?;
    log::info!("Wrote state file: {}", path.display());
    Ok(contents.len())
}
