//! Journal event log: backlog replay, live tailing and dispatch.
//!
//! All mutation after `start` happens on one pump task. Tail chunks, watcher
//! notifications and status refreshes are funneled into a single channel, so
//! events reach handlers (and the retained backlog) in the order they were
//! produced.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::decoder::{LineDecoder, MalformedLine, RawRecord};
use super::directory::{DirectoryChange, JournalDirectory, JournalFile};
use super::dispatch::{EventDispatcher, EventHandler};
use super::event::{Event, EventKind};
use super::schema::event_position;
use super::status::StatusFile;
use super::tail::{TailChunk, TailHandle, TailingByteSource, DEFAULT_CHUNK_SIZE, DEFAULT_POLL_INTERVAL};
use super::{JournalError, MalformedLinePolicy, Result};
use crate::config::JournalConfig;
use crate::galaxy::Coordinates;

const NOTICE_CAPACITY: usize = 64;

/// What `start` does with historical journal files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BacklogOptions {
    /// Read and dispatch every historical record.
    pub process: bool,
    /// Retain processed and live events for queries.
    pub store: bool,
}

impl Default for BacklogOptions {
    fn default() -> Self {
        Self {
            process: true,
            store: true,
        }
    }
}

/// Out-of-band notifications about the log itself.
#[derive(Debug, Clone, PartialEq)]
pub enum LogNotice {
    /// The live tail was attached to a journal file.
    FileSwitched { path: PathBuf },
    /// A transient fault; the log keeps running.
    Warning { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Idle,
    BacklogLoading,
    Tailing,
    Ended,
}

type Backlog = Arc<RwLock<Option<Vec<Arc<Event>>>>>;

/// Where a newly attached tail begins reading.
#[derive(Debug, Clone, Copy)]
enum TailStart {
    Offset(u64),
    End,
}

enum Input {
    Chunk { generation: u64, chunk: TailChunk },
    Watch(notify::Result<notify::Event>),
    Refresh(StatusFile),
}

struct Running {
    watcher: RecommendedWatcher,
    pump: JoinHandle<()>,
}

/// Ordered, typed event stream over a journal directory.
pub struct EventLog {
    directory: JournalDirectory,
    poll_interval: Duration,
    chunk_size: usize,
    status_files: Vec<StatusFile>,
    policy: MalformedLinePolicy,
    dispatcher: Arc<EventDispatcher>,
    backlog: Backlog,
    notices: broadcast::Sender<LogNotice>,
    state: RwLock<LogState>,
    running: Mutex<Option<Running>>,
}

impl EventLog {
    pub fn new(directory: JournalDirectory) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            directory,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            status_files: StatusFile::ALL.to_vec(),
            policy: MalformedLinePolicy::default(),
            dispatcher: Arc::new(EventDispatcher::new()),
            backlog: Arc::new(RwLock::new(None)),
            notices,
            state: RwLock::new(LogState::Idle),
            running: Mutex::new(None),
        }
    }

    pub fn from_config(config: &JournalConfig) -> Self {
        Self::new(JournalDirectory::new(&config.directory))
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
            .with_chunk_size(config.chunk_size)
            .with_status_files(config.status_files.clone())
            .with_malformed_lines(config.malformed_lines)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Status files to watch. Defaults to all of them.
    pub fn with_status_files(mut self, status_files: Vec<StatusFile>) -> Self {
        self.status_files = status_files;
        self
    }

    pub fn with_malformed_lines(mut self, policy: MalformedLinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn directory(&self) -> &JournalDirectory {
        &self.directory
    }

    pub async fn state(&self) -> LogState {
        *self.state.read().await
    }

    /// Subscribe to one event kind.
    pub async fn on(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.dispatcher.on(kind, handler).await;
    }

    /// Subscribe to every event.
    pub async fn on_any(&self, handler: Arc<dyn EventHandler>) {
        self.dispatcher.on_any(handler).await;
    }

    /// Receive file switches and transient warnings.
    ///
    /// The channel holds the last 64 notices: a receiver that falls further
    /// behind gets `RecvError::Lagged` and misses the oldest ones. Events
    /// themselves go through the handlers and are never dropped.
    pub fn notices(&self) -> broadcast::Receiver<LogNotice> {
        self.notices.subscribe()
    }

    /// Replay the backlog, then begin tailing the newest journal file.
    ///
    /// Returns the processed backlog (empty unless `options.process`).
    /// Handlers registered before this call see every backlog event.
    pub async fn start(&self, options: BacklogOptions) -> Result<Vec<Arc<Event>>> {
        let mut running = self.running.lock().await;
        {
            let mut state = self.state.write().await;
            if *state != LogState::Idle {
                return Err(JournalError::AlreadyStarted);
            }
            *state = LogState::BacklogLoading;
        }

        let result = self.launch(options).await;
        let mut state = self.state.write().await;
        match result {
            Ok((backlog, launched)) => {
                *running = Some(launched);
                *state = LogState::Tailing;
                Ok(backlog)
            }
            Err(e) => {
                *self.backlog.write().await = None;
                *state = LogState::Idle;
                Err(e)
            }
        }
    }

    async fn launch(&self, options: BacklogOptions) -> Result<(Vec<Arc<Event>>, Running)> {
        let (events, resume) = if options.process {
            self.load_backlog()?
        } else {
            (Vec::new(), None)
        };

        info!(
            directory = %self.directory.path().display(),
            events = events.len(),
            store = options.store,
            "Journal backlog loaded"
        );

        if options.store {
            *self.backlog.write().await = Some(events.clone());
        }
        for event in &events {
            self.dispatcher.dispatch(event).await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut pump = Pump {
            directory: self.directory.clone(),
            poll_interval: self.poll_interval,
            chunk_size: self.chunk_size,
            status_files: self.status_files.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            backlog: Arc::clone(&self.backlog),
            store: options.store,
            notices: self.notices.clone(),
            input: tx.clone(),
            decoder: LineDecoder::new(),
            tail: None,
            generation: 0,
        };

        // Resume the newest file exactly where the backlog stopped so lines
        // written meanwhile, or a line that was half written, still arrive.
        let initial = match resume {
            Some((file, offset)) => Some((file, TailStart::Offset(offset))),
            None if options.process => None,
            None => self.directory.latest()?.map(|file| (file, TailStart::End)),
        };
        match initial {
            Some((file, start)) => pump.attach(&file, start).await,
            None => info!(
                directory = %self.directory.path().display(),
                "No journal files yet, waiting for one to be created"
            ),
        }

        let watch_tx = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = watch_tx.send(Input::Watch(res));
        })?;
        watcher.watch(self.directory.path(), RecursiveMode::NonRecursive)?;

        // A file created before the watcher was installed has no notification.
        if let Some(newest) = self.directory.latest()? {
            if !pump.is_tailing(newest.path()) {
                pump.attach(&newest, TailStart::Offset(0)).await;
            }
        }

        for status in &self.status_files {
            let _ = tx.send(Input::Refresh(*status));
        }

        let pump = tokio::spawn(pump.run(rx));
        Ok((
            events,
            Running { watcher, pump },
        ))
    }

    fn load_backlog(&self) -> Result<(Vec<Arc<Event>>, Option<(JournalFile, u64)>)> {
        let notices = self.notices.clone();
        let snapshot = self.directory.read_snapshot(self.policy, |file, line, malformed| {
            let _ = notices.send(LogNotice::Warning {
                message: format!("{} line {}: {}", file.file_name(), line, malformed),
            });
        })?;

        let mut events = Vec::with_capacity(snapshot.records.len());
        for record in snapshot.records {
            match Event::from_raw(record) {
                Ok(event) => events.push(Arc::new(event)),
                Err(e) if self.policy == MalformedLinePolicy::Abort => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Skipping invalid backlog record");
                    let _ = self.notices.send(LogNotice::Warning {
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok((events, snapshot.resume))
    }

    /// Stop tailing, tear down the watcher and drop every subscription.
    ///
    /// This is a full shutdown: calling it again fails. Must not be called
    /// from inside an event handler.
    pub async fn end(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        {
            let mut state = self.state.write().await;
            match *state {
                LogState::Tailing => *state = LogState::Ended,
                LogState::Ended => return Err(JournalError::AlreadyClosed),
                LogState::Idle | LogState::BacklogLoading => return Err(JournalError::NotStarted),
            }
        }

        if let Some(Running { watcher, pump }) = running.take() {
            drop(watcher);
            pump.abort();
            let _ = pump.await;
        }
        self.dispatcher.clear().await;

        info!(directory = %self.directory.path().display(), "Journal log ended");
        Ok(())
    }

    /// Last retained event of `kind`.
    pub async fn get_last_event(&self, kind: &EventKind) -> Result<Option<Arc<Event>>> {
        let backlog = self.backlog.read().await;
        let events = backlog.as_ref().ok_or(JournalError::NoBacklog)?;
        Ok(events.iter().rev().find(|e| e.kind() == kind).cloned())
    }

    /// Every retained event of `kind`, oldest first.
    pub async fn get_all(&self, kind: &EventKind) -> Result<Vec<Arc<Event>>> {
        let backlog = self.backlog.read().await;
        let events = backlog.as_ref().ok_or(JournalError::NoBacklog)?;
        Ok(events.iter().filter(|e| e.kind() == kind).cloned().collect())
    }

    /// Snapshot of the whole retained backlog.
    pub async fn backlog(&self) -> Result<Vec<Arc<Event>>> {
        self.backlog
            .read()
            .await
            .clone()
            .ok_or(JournalError::NoBacklog)
    }

    /// The player's position from the latest `Location` or `FSDJump`.
    pub async fn last_known_position(&self) -> Result<Option<Coordinates>> {
        let backlog = self.backlog.read().await;
        let events = backlog.as_ref().ok_or(JournalError::NoBacklog)?;
        Ok(events.iter().rev().find_map(|e| event_position(e)))
    }
}

/// Owns the live decoding state. Runs on a single task.
struct Pump {
    directory: JournalDirectory,
    poll_interval: Duration,
    chunk_size: usize,
    status_files: Vec<StatusFile>,
    dispatcher: Arc<EventDispatcher>,
    backlog: Backlog,
    store: bool,
    notices: broadcast::Sender<LogNotice>,
    input: mpsc::UnboundedSender<Input>,
    decoder: LineDecoder,
    tail: Option<TailHandle>,
    generation: u64,
}

impl Pump {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = rx.recv().await {
            match input {
                Input::Chunk { generation, chunk } => {
                    if generation == self.generation {
                        self.on_chunk(chunk).await;
                    }
                }
                Input::Watch(Ok(event)) => {
                    for change in self.directory.classify(&event) {
                        self.on_change(change).await;
                    }
                }
                Input::Watch(Err(e)) => self.warn(format!("Directory watch error: {}", e)),
                Input::Refresh(status) => self.refresh(status).await,
            }
        }
    }

    /// Attach a fresh tail, replacing the current one.
    async fn attach(&mut self, file: &JournalFile, start: TailStart) {
        if let Some(mut tail) = self.tail.take() {
            let _ = tail.close();
        }
        if let Some(last) = self.decoder.finish() {
            self.on_decoded(last).await;
        }
        self.decoder.reset();
        self.generation += 1;

        let mut source =
            TailingByteSource::new(file.path(), self.poll_interval).with_chunk_size(self.chunk_size);
        match start {
            TailStart::Offset(offset) => source.seek_to(offset),
            TailStart::End => {
                if let Err(e) = source.seek_to_end().await {
                    self.warn(e.to_string());
                }
            }
        }

        let generation = self.generation;
        let input = self.input.clone();
        self.tail = Some(source.spawn(move |chunk| input.send(Input::Chunk { generation, chunk }).is_ok()));

        info!(path = %file.path().display(), start = ?start, "Tailing journal file");
        let _ = self.notices.send(LogNotice::FileSwitched {
            path: file.path().to_path_buf(),
        });
    }

    fn is_tailing(&self, path: &Path) -> bool {
        self.tail.as_ref().is_some_and(|t| t.path() == path)
    }

    async fn on_change(&mut self, change: DirectoryChange) {
        match change {
            DirectoryChange::JournalCreated(file) => {
                if !self.is_tailing(file.path()) {
                    self.attach(&file, TailStart::Offset(0)).await;
                }
            }
            DirectoryChange::StatusChanged(status) => {
                if self.status_files.contains(&status) {
                    self.refresh(status).await;
                }
            }
        }
    }

    async fn on_chunk(&mut self, chunk: TailChunk) {
        match chunk {
            TailChunk::Data(bytes) => {
                for decoded in self.decoder.push(&bytes) {
                    self.on_decoded(decoded).await;
                }
            }
            TailChunk::Fault(e) => self.warn(format!("Journal read failed: {}", e)),
        }
    }

    async fn on_decoded(&mut self, decoded: std::result::Result<RawRecord, MalformedLine>) {
        match decoded {
            Ok(record) => self.emit_raw(record).await,
            // A live line never stops the log, whatever the backlog policy.
            Err(malformed) => self.warn(malformed.to_string()),
        }
    }

    async fn refresh(&mut self, status: StatusFile) {
        match status.read(self.directory.path()) {
            Ok(Some(record)) => {
                debug!(status = %status, "Status file changed");
                self.emit_raw(record).await;
            }
            Ok(None) => {}
            Err(e) => self.warn(e.to_string()),
        }
    }

    async fn emit_raw(&mut self, record: RawRecord) {
        match Event::from_raw(record) {
            Ok(event) => self.emit(Arc::new(event)).await,
            Err(e) => self.warn(e.to_string()),
        }
    }

    async fn emit(&self, event: Arc<Event>) {
        if self.store {
            if let Some(events) = self.backlog.write().await.as_mut() {
                events.push(Arc::clone(&event));
            }
        }
        self.dispatcher.dispatch(&event).await;
    }

    fn warn(&self, message: String) {
        warn!(directory = %self.directory.path().display(), "{}", message);
        let _ = self.notices.send(LogNotice::Warning { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::handler_fn;
    use tempfile::TempDir;

    const JUMP: &str = r#"{"timestamp":"2017-10-04T19:01:01Z","event":"FSDJump","StarSystem":"Achenar","StarPos":[67.5,-119.46875,24.84375],"JumpDist":8.2,"FuelUsed":0.7,"FuelLevel":14.2}"#;
    const LOCATION: &str = r#"{"timestamp":"2017-10-04T19:05:00Z","event":"Location","Docked":false,"StarSystem":"Sol","StarPos":[0.0,0.0,0.0]}"#;

    fn log_in(dir: &TempDir) -> EventLog {
        EventLog::new(JournalDirectory::new(dir.path()))
            .with_poll_interval(Duration::from_millis(10))
            .with_status_files(Vec::new())
    }

    #[tokio::test]
    async fn test_queries_without_backlog_fail() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        assert!(matches!(
            log.get_last_event(&EventKind::FsdJump).await,
            Err(JournalError::NoBacklog)
        ));
        assert!(matches!(
            log.get_all(&EventKind::FsdJump).await,
            Err(JournalError::NoBacklog)
        ));
    }

    #[tokio::test]
    async fn test_slow_notice_receiver_lags_but_keeps_receiving() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        let mut rx = log.notices();

        for i in 0..=NOTICE_CAPACITY {
            let _ = log.notices.send(LogNotice::Warning {
                message: i.to_string(),
            });
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        match rx.recv().await.unwrap() {
            LogNotice::Warning { message } => assert_eq!(message, "1"),
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_false_keeps_no_backlog() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Journal.1.01.log"), format!("{}\n", JUMP)).unwrap();

        let log = log_in(&dir);
        let returned = log
            .start(BacklogOptions {
                process: true,
                store: false,
            })
            .await
            .unwrap();
        assert_eq!(returned.len(), 1);
        assert!(matches!(log.backlog().await, Err(JournalError::NoBacklog)));
        log.end().await.unwrap();
    }

    #[tokio::test]
    async fn test_process_false_returns_empty_backlog() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Journal.1.01.log"), format!("{}\n", JUMP)).unwrap();

        let log = log_in(&dir);
        let returned = log
            .start(BacklogOptions {
                process: false,
                store: true,
            })
            .await
            .unwrap();
        assert!(returned.is_empty());
        assert!(log.get_last_event(&EventKind::FsdJump).await.unwrap().is_none());
        log.end().await.unwrap();
    }

    #[tokio::test]
    async fn test_backlog_events_are_dispatched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Journal.1.01.log"),
            format!("{}\n{}\n", JUMP, LOCATION),
        )
        .unwrap();

        let log = log_in(&dir);
        let (tx, mut rx) = mpsc::unbounded_channel();
        log.on(
            EventKind::Location,
            handler_fn(move |event| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(event.tag().to_string());
                    Ok(())
                }
            }),
        )
        .await;

        log.start(BacklogOptions::default()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("Location"));
        log.end().await.unwrap();
    }

    #[tokio::test]
    async fn test_last_known_position_prefers_latest() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Journal.1.01.log"),
            format!("{}\n{}\n", LOCATION, JUMP),
        )
        .unwrap();

        let log = log_in(&dir);
        log.start(BacklogOptions::default()).await.unwrap();
        assert_eq!(
            log.last_known_position().await.unwrap(),
            Some(Coordinates::new(67.5, -119.46875, 24.84375))
        );
        log.end().await.unwrap();
    }

    #[tokio::test]
    async fn test_abort_policy_fails_start() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Journal.1.01.log"),
            format!("{}\n{{broken\n", JUMP),
        )
        .unwrap();

        let log = log_in(&dir).with_malformed_lines(MalformedLinePolicy::Abort);
        assert!(matches!(
            log.start(BacklogOptions::default()).await,
            Err(JournalError::Decode { line: 2, .. })
        ));
        assert_eq!(log.state().await, LogState::Idle);
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Journal.1.01.log"), "").unwrap();

        let log = log_in(&dir);
        assert!(matches!(log.end().await, Err(JournalError::NotStarted)));

        log.start(BacklogOptions::default()).await.unwrap();
        assert_eq!(log.state().await, LogState::Tailing);
        assert!(matches!(
            log.start(BacklogOptions::default()).await,
            Err(JournalError::AlreadyStarted)
        ));

        log.end().await.unwrap();
        assert_eq!(log.state().await, LogState::Ended);
        assert!(matches!(log.end().await, Err(JournalError::AlreadyClosed)));
    }

    #[tokio::test]
    async fn test_missing_directory_fails_start() {
        let log = EventLog::new(JournalDirectory::new("/nonexistent/journal"));
        assert!(matches!(
            log.start(BacklogOptions::default()).await,
            Err(JournalError::Io { .. })
        ));
    }
}
