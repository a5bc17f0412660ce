//! Single-object status files.
//!
//! Unlike journal files these are rewritten wholesale by the game, so each
//! change is re-read in full and surfaced as a synthetic event.

use std::fmt;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::decoder::{sanitize_line, RawRecord};
use super::{JournalError, Result};

/// The fixed set of status files the game maintains next to the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum StatusFile {
    Status,
    Market,
    Shipyard,
    Outfitting,
    ModulesInfo,
}

impl StatusFile {
    pub const ALL: [StatusFile; 5] = [
        StatusFile::Status,
        StatusFile::Market,
        StatusFile::Shipyard,
        StatusFile::Outfitting,
        StatusFile::ModulesInfo,
    ];

    /// Logical name, also used as the synthetic event kind.
    pub fn name(self) -> &'static str {
        match self {
            StatusFile::Status => "Status",
            StatusFile::Market => "Market",
            StatusFile::Shipyard => "Shipyard",
            StatusFile::Outfitting => "Outfitting",
            StatusFile::ModulesInfo => "ModulesInfo",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.name())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn from_file_name(file_name: &str) -> Option<Self> {
        file_name.strip_suffix(".json").and_then(Self::from_name)
    }

    /// Read the file's current object.
    ///
    /// Returns `None` when the file is missing or empty (the game truncates
    /// before rewriting). The record's kind is always the logical name; the
    /// timestamp falls back to now if the object carries none.
    pub fn read(self, directory: &Path) -> Result<Option<RawRecord>> {
        let path = directory.join(self.file_name());
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JournalError::io(path, e)),
        };

        let text = sanitize_line(&content);
        if text.trim().is_empty() {
            return Ok(None);
        }

        let mut fields: Map<String, Value> =
            serde_json::from_str(&text).map_err(|source| JournalError::Decode {
                path: path.clone(),
                line: 1,
                source,
            })?;

        let timestamp = match fields.remove("timestamp") {
            Some(Value::String(ts)) => ts,
            _ => Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        fields.remove("event");

        Ok(Some(RawRecord {
            timestamp,
            event: self.name().to_string(),
            fields,
        }))
    }
}

impl fmt::Display for StatusFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
