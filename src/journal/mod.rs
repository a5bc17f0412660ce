//! Journal ingestion.
//!
//! Turns the game's journal directory into an ordered, typed event stream:
//! - `TailingByteSource`: polls one growing file for appended bytes
//! - `LineDecoder`: splits bytes into newline-delimited JSON records
//! - `JournalDirectory`: lists, orders and bulk-reads rotated journal files
//! - `EventLog`: backlog replay, live tailing, rotation and dispatch

mod decoder;
mod directory;
mod dispatch;
mod event;
mod log;
pub mod schema;
mod status;
mod tail;

pub use decoder::{decode_line, sanitize_line, LineDecoder, MalformedLine, RawRecord};
pub use directory::{DirectoryChange, JournalDirectory, JournalFile, JournalSnapshot};
pub use dispatch::{handler_fn, EventDispatcher, EventHandler, HandlerError};
pub use event::{unknown_kinds, Event, EventKind};
pub use log::{BacklogOptions, EventLog, LogNotice, LogState};
pub use status::StatusFile;
pub use tail::{TailChunk, TailHandle, TailingByteSource, DEFAULT_CHUNK_SIZE, DEFAULT_POLL_INTERVAL};

use std::path::PathBuf;

/// Result type for journal operations.
pub type Result<T> = std::result::Result<T, JournalError>;

/// Errors that can occur while reading or tailing the journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed journal line in '{path}' at line {line}: {source}")]
    Decode {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("No backlog")]
    NoBacklog,

    #[error("Event log already started")]
    AlreadyStarted,

    #[error("Event log not started")]
    NotStarted,

    #[error("Already closed")]
    AlreadyClosed,

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl JournalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        JournalError::Io {
            path: path.into(),
            source,
        }
    }
}

/// How malformed journal lines are treated.
///
/// Live tailing never aborts on a malformed line; `Abort` only affects
/// backlog construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedLinePolicy {
    /// Log a warning and continue with the next line.
    #[default]
    Skip,
    /// Fail backlog construction.
    Abort,
}
