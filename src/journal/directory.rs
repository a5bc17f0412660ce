//! Journal directory listing and bulk reads.
//!
//! Journal files are named `Journal.<sequence>.<part>.log`. Other files
//! (status objects, housekeeping) live in the same directory and are ignored
//! here unless they are one of the known status files.

use std::path::{Path, PathBuf};

use notify::event::{EventKind as NotifyKind, ModifyKind};
use tracing::{debug, warn};

use super::decoder::{decode_line, MalformedLine, RawRecord};
use super::status::StatusFile;
use super::{JournalError, MalformedLinePolicy, Result};

/// Backlog records plus the live-tail resume point.
#[derive(Debug, Default)]
pub struct JournalSnapshot {
    pub records: Vec<RawRecord>,
    /// Newest journal file and the offset just past its last complete line.
    pub resume: Option<(JournalFile, u64)>,
}

/// One rotated journal segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalFile {
    path: PathBuf,
    sequence: u64,
}

impl JournalFile {
    /// Recognize a journal file by its file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let sequence = parse_sequence(path.file_name()?.to_str()?)?;
        Some(Self { path, sequence })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Numeric sequence segment used for ordering.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse `Journal.<digits>.<digits>.log`, returning the first number.
fn parse_sequence(file_name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix("Journal.")?.strip_suffix(".log")?;
    let (sequence, part) = rest.split_once('.')?;
    if !all_digits(sequence) || !all_digits(part) {
        return None;
    }
    sequence.parse().ok()
}

/// A relevant change reported by the directory watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryChange {
    /// A new journal segment was created.
    JournalCreated(JournalFile),
    /// A status file was written.
    StatusChanged(StatusFile),
}

/// Journal directory, injected explicitly rather than derived globally.
#[derive(Debug, Clone)]
pub struct JournalDirectory {
    path: PathBuf,
}

impl JournalDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List journal files, ascending by sequence.
    ///
    /// Equal sequences keep directory listing order.
    pub fn list_files(&self) -> Result<Vec<JournalFile>> {
        let entries = std::fs::read_dir(&self.path).map_err(|e| JournalError::io(&self.path, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| JournalError::io(&self.path, e))?;
            if let Some(file) = JournalFile::from_path(entry.path()) {
                files.push(file);
            }
        }
        files.sort_by_key(|f| f.sequence);

        debug!(
            directory = %self.path.display(),
            count = files.len(),
            "Listed journal files"
        );
        Ok(files)
    }

    /// The newest journal file, if any.
    pub fn latest(&self) -> Result<Option<JournalFile>> {
        Ok(self.list_files()?.pop())
    }

    /// Load every record of every journal file, file order then line order.
    pub fn read(&self, policy: MalformedLinePolicy) -> Result<Vec<RawRecord>> {
        self.read_reporting(policy, |_, _, _| {})
    }

    /// Like `read`, calling `report` for each skipped malformed line.
    pub fn read_reporting<F>(&self, policy: MalformedLinePolicy, mut report: F) -> Result<Vec<RawRecord>>
    where
        F: FnMut(&JournalFile, usize, &MalformedLine),
    {
        let mut out = Vec::new();
        for file in self.list_files()? {
            self.read_file_into(&file, policy, false, &mut report, &mut out)?;
        }
        Ok(out)
    }

    /// Read the backlog and note where live tailing of the newest file must
    /// resume.
    ///
    /// The newest file may still be mid-write, so its unterminated trailing
    /// bytes are left undecoded and the resume offset points at them.
    pub fn read_snapshot<F>(&self, policy: MalformedLinePolicy, mut report: F) -> Result<JournalSnapshot>
    where
        F: FnMut(&JournalFile, usize, &MalformedLine),
    {
        let mut files = self.list_files()?;
        let newest = files.pop();

        let mut records = Vec::new();
        for file in &files {
            self.read_file_into(file, policy, false, &mut report, &mut records)?;
        }
        let resume = match newest {
            Some(file) => {
                let offset = self.read_file_into(&file, policy, true, &mut report, &mut records)?;
                Some((file, offset))
            }
            None => None,
        };
        Ok(JournalSnapshot { records, resume })
    }

    /// Load every record of a single journal file.
    pub fn read_file(&self, file: &JournalFile, policy: MalformedLinePolicy) -> Result<Vec<RawRecord>> {
        let mut out = Vec::new();
        self.read_file_into(
            file,
            policy,
            false,
            &mut |_: &JournalFile, _: usize, _: &MalformedLine| {},
            &mut out,
        )?;
        Ok(out)
    }

    /// Decode one file into `out` and return the number of bytes consumed.
    ///
    /// With `complete_only`, bytes after the last newline are not decoded.
    fn read_file_into<F>(
        &self,
        file: &JournalFile,
        policy: MalformedLinePolicy,
        complete_only: bool,
        report: &mut F,
        out: &mut Vec<RawRecord>,
    ) -> Result<u64>
    where
        F: FnMut(&JournalFile, usize, &MalformedLine),
    {
        let bytes = std::fs::read(file.path()).map_err(|e| JournalError::io(file.path(), e))?;
        let end = if complete_only {
            bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1)
        } else {
            bytes.len()
        };
        if end < bytes.len() {
            debug!(
                path = %file.path().display(),
                pending = bytes.len() - end,
                "Leaving unterminated line to the live tail"
            );
        }
        let content = String::from_utf8_lossy(&bytes[..end]);

        for (index, line) in content.split('\n').enumerate() {
            match decode_line(line) {
                None => {}
                Some(Ok(record)) => out.push(record),
                Some(Err(malformed)) => match policy {
                    MalformedLinePolicy::Abort => {
                        return Err(JournalError::Decode {
                            path: file.path().to_path_buf(),
                            line: index + 1,
                            source: malformed.source,
                        });
                    }
                    MalformedLinePolicy::Skip => {
                        warn!(
                            path = %file.path().display(),
                            line = index + 1,
                            error = %malformed.source,
                            "Skipping malformed journal line"
                        );
                        report(file, index + 1, &malformed);
                    }
                },
            }
        }
        Ok(end as u64)
    }

    /// Filter a raw watcher notification down to the changes that matter.
    ///
    /// Only creations count for journal files; renames and deletes are
    /// ignored. Status files count on creation or modification.
    pub fn classify(&self, event: &notify::Event) -> Vec<DirectoryChange> {
        let created = matches!(event.kind, NotifyKind::Create(_));
        let written = created
            || matches!(
                event.kind,
                NotifyKind::Modify(ModifyKind::Data(_))
                    | NotifyKind::Modify(ModifyKind::Any)
                    | NotifyKind::Modify(ModifyKind::Name(_))
            );

        let mut changes = Vec::new();
        for path in &event.paths {
            if created {
                if let Some(file) = JournalFile::from_path(path) {
                    changes.push(DirectoryChange::JournalCreated(file));
                    continue;
                }
            }
            if written {
                let status = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(StatusFile::from_file_name);
                if let Some(status) = status {
                    if !changes.contains(&DirectoryChange::StatusChanged(status)) {
                        changes.push(DirectoryChange::StatusChanged(status));
                    }
                }
            }
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence("Journal.170930154738.01.log"), Some(170930154738));
        assert_eq!(parse_sequence("Journal.1.01.log"), Some(1));
        assert_eq!(parse_sequence("Journal.1.log"), None);
        assert_eq!(parse_sequence("Journal.a.01.log"), None);
        assert_eq!(parse_sequence("Journal.1.01.log.bak"), None);
        assert_eq!(parse_sequence("Status.json"), None);
        assert_eq!(parse_sequence("NetLog.1.01.log"), None);
    }

    #[test]
    fn test_list_files_sorted_by_sequence() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Journal.10.01.log", "");
        write(dir.path(), "Journal.9.01.log", "");
        write(dir.path(), "Journal.100.01.log", "");
        write(dir.path(), "Status.json", "{}");
        write(dir.path(), "notes.txt", "");

        let journal = JournalDirectory::new(dir.path());
        let names: Vec<String> = journal
            .list_files()
            .unwrap()
            .iter()
            .map(|f| f.file_name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["Journal.9.01.log", "Journal.10.01.log", "Journal.100.01.log"]
        );
        assert_eq!(journal.latest().unwrap().unwrap().sequence(), 100);
    }

    #[test]
    fn test_read_in_file_then_line_order() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "Journal.2.01.log",
            "{\"timestamp\":\"2017-10-05T00:00:00Z\",\"event\":\"ReceiveText\"}\n",
        );
        write(
            dir.path(),
            "Journal.1.01.log",
            "{\"timestamp\":\"2017-10-04T00:00:00Z\",\"event\":\"FSDJump\"}\n\n{\"timestamp\":\"2017-10-04T00:00:01Z\",\"event\":\"Location\"}",
        );

        let records = JournalDirectory::new(dir.path())
            .read(MalformedLinePolicy::Skip)
            .unwrap();
        let kinds: Vec<&str> = records.iter().map(|r| r.event.as_str()).collect();
        assert_eq!(kinds, vec!["FSDJump", "Location", "ReceiveText"]);
    }

    #[test]
    fn test_malformed_line_policy() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "Journal.1.01.log",
            "{\"timestamp\":\"t\",\"event\":\"Music\"}\n{broken\n{\"timestamp\":\"t\",\"event\":\"Shutdown\"}\n",
        );
        let journal = JournalDirectory::new(dir.path());

        let mut reported = Vec::new();
        let records = journal
            .read_reporting(MalformedLinePolicy::Skip, |file, line, _| {
                reported.push((file.sequence(), line))
            })
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(reported, vec![(1, 2)]);

        match journal.read(MalformedLinePolicy::Abort) {
            Err(JournalError::Decode { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected decode error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_snapshot_leaves_unterminated_tail_of_newest_file() {
        let dir = TempDir::new().unwrap();
        let first = "{\"timestamp\":\"2017-10-04T00:00:00Z\",\"event\":\"FSDJump\"}\n";
        let partial = "{\"timestamp\":\"2017-10-05T00:00";
        write(dir.path(), "Journal.1.01.log", "{\"timestamp\":\"2017-10-03T00:00:00Z\",\"event\":\"Music\"}");
        write(dir.path(), "Journal.2.01.log", &format!("{}{}", first, partial));

        let mut reported = 0;
        let snapshot = JournalDirectory::new(dir.path())
            .read_snapshot(MalformedLinePolicy::Abort, |_, _, _| reported += 1)
            .unwrap();

        // Older files are complete, so their last line counts even without a newline.
        let kinds: Vec<&str> = snapshot.records.iter().map(|r| r.event.as_str()).collect();
        assert_eq!(kinds, vec!["Music", "FSDJump"]);
        assert_eq!(reported, 0);

        let (file, offset) = snapshot.resume.unwrap();
        assert_eq!(file.sequence(), 2);
        assert_eq!(offset, first.len() as u64);
    }

    #[test]
    fn test_snapshot_of_empty_directory_has_no_resume_point() {
        let dir = TempDir::new().unwrap();
        let snapshot = JournalDirectory::new(dir.path())
            .read_snapshot(MalformedLinePolicy::Skip, |_, _, _| {})
            .unwrap();
        assert!(snapshot.records.is_empty());
        assert!(snapshot.resume.is_none());
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let journal = JournalDirectory::new("/nonexistent/journal/dir");
        assert!(matches!(journal.list_files(), Err(JournalError::Io { .. })));
    }

    #[test]
    fn test_classify_filters_notifications() {
        let journal = JournalDirectory::new("/journal");

        let created = notify::Event::new(NotifyKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/journal/Journal.3.01.log"));
        assert_eq!(
            journal.classify(&created),
            vec![DirectoryChange::JournalCreated(
                JournalFile::from_path("/journal/Journal.3.01.log").unwrap()
            )]
        );

        let appended = notify::Event::new(NotifyKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(PathBuf::from("/journal/Journal.3.01.log"));
        assert!(journal.classify(&appended).is_empty());

        let removed = notify::Event::new(NotifyKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/journal/Journal.3.01.log"));
        assert!(journal.classify(&removed).is_empty());

        let renamed = notify::Event::new(NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/journal/Journal.2.01.log"))
            .add_path(PathBuf::from("/journal/Journal.3.01.log"));
        assert!(journal.classify(&renamed).is_empty());

        let unrelated = notify::Event::new(NotifyKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/journal/NetLog.3.01.log"));
        assert!(journal.classify(&unrelated).is_empty());

        let status = notify::Event::new(NotifyKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/journal/Status.json"));
        assert_eq!(
            journal.classify(&status),
            vec![DirectoryChange::StatusChanged(StatusFile::Status)]
        );
    }
}
