//! edcompanion-schema-check: validate a journal directory against the typed schema
//!
//! Reads every journal file, decodes each record into its typed form where
//! one exists and prints a per-kind summary of failures, plus the event kinds
//! that are not recognised at all.
//!
//! Usage: `edcompanion-schema-check [DIRECTORY]`
//! Without a directory argument the configured journal directory is used.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{error, info, warn};

use edcompanion::config::Config;
use edcompanion::journal::schema::validate;
use edcompanion::journal::{unknown_kinds, Event, JournalDirectory, MalformedLinePolicy};
use edcompanion::utils::bootstrap::init_tracing;

#[derive(Default)]
struct KindReport {
    checked: usize,
    failed: usize,
    errors: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let directory = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => Config::load(None)?.journal.directory,
    };
    let journal = JournalDirectory::new(&directory);
    info!(directory = %directory.display(), "Checking journal");

    let mut malformed = 0usize;
    let records = journal.read_reporting(MalformedLinePolicy::Skip, |file, line, err| {
        malformed += 1;
        warn!(file = file.file_name(), line, "{}", err);
    })?;

    let mut events = Vec::with_capacity(records.len());
    for record in records {
        match Event::from_raw(record) {
            Ok(event) => events.push(event),
            Err(e) => {
                malformed += 1;
                warn!("{}", e);
            }
        }
    }

    let mut reports: BTreeMap<String, KindReport> = BTreeMap::new();
    for event in &events {
        let Some(result) = validate(event) else {
            continue;
        };
        let report = reports.entry(event.tag().to_string()).or_default();
        report.checked += 1;
        if let Err(e) = result {
            report.failed += 1;
            let message = e.to_string();
            if !report.errors.contains(&message) {
                report.errors.push(message);
            }
        }
    }

    println!("{} events, {} malformed lines", events.len(), malformed);
    for (kind, report) in &reports {
        println!("{:<20} {:>8} checked {:>6} failed", kind, report.checked, report.failed);
        for message in &report.errors {
            println!("    {}", message);
        }
    }

    let unknown = unknown_kinds(&events);
    if !unknown.is_empty() {
        println!("unknown kinds: {}", unknown.join(", "));
    }

    let failed: usize = reports.values().map(|r| r.failed).sum();
    if failed > 0 {
        error!(failed, "Schema check failed");
        std::process::exit(1);
    }
    Ok(())
}
