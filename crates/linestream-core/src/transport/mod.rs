//! Streaming transport: connection opening and line reading

mod line_reader;
mod opener;

pub use line_reader::{LineReader, LineSource, ReadOutcome};
pub use opener::{ConnectionHandle, ConnectionOpener, HttpConnectionOpener};
