// src/output/mod.rs
//! Output handling: message construction is pure, `writer` does the I/O.

mod types;
mod writer;

pub use types::{CatalogMessage, ProtocolMessage, RecordMessage, StateMessage, StatusMessage};
pub use writer::{load_state, write_state, JsonLinesSink};
