//! Polling tail reader for a single growing file.
//!
//! Change notifications are unreliable for appends made by another process
//! on the filesystems the game writes to, so the file is polled at a short
//! fixed interval instead.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{JournalError, Result};

/// Default number of bytes read per poll.
pub const DEFAULT_CHUNK_SIZE: usize = 0xFFFF;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Output of one poll tick.
#[derive(Debug)]
pub enum TailChunk {
    /// Newly appended bytes, never previously delivered.
    Data(Vec<u8>),
    /// A read failed; polling continues on the next tick.
    Fault(std::io::Error),
}

/// Reads bytes appended to a file, starting from an arbitrary offset.
pub struct TailingByteSource {
    path: PathBuf,
    poll_interval: Duration,
    chunk_size: usize,
    offset: u64,
    file: Option<File>,
}

impl TailingByteSource {
    /// Create a source starting at offset 0.
    ///
    /// The file is opened lazily on the first read.
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            chunk_size: DEFAULT_CHUNK_SIZE,
            offset: 0,
            file: None,
        }
    }

    /// Set the maximum number of bytes read per poll.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current read cursor.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Skip all existing content: move the cursor to the current file size.
    pub async fn seek_to_end(&mut self) -> Result<u64> {
        let len = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| JournalError::io(&self.path, e))?
            .len();
        self.offset = len;
        Ok(len)
    }

    /// Resume from a known offset, e.g. the end of the last line already consumed.
    pub fn seek_to(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Read up to one chunk of bytes past the cursor and advance it.
    ///
    /// Returns an empty buffer when nothing new was appended.
    pub async fn read_available(&mut self) -> std::io::Result<Vec<u8>> {
        let result = self.read_chunk().await;
        if result.is_err() {
            // Reopen on the next tick; the file may have been locked or replaced.
            self.file = None;
        }
        result
    }

    async fn read_chunk(&mut self) -> std::io::Result<Vec<u8>> {
        let file = match self.file.take() {
            Some(file) => file,
            None => File::open(&self.path).await?,
        };
        let file = self.file.insert(file);

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = vec![0u8; self.chunk_size];
        let read = file.read(&mut buf).await?;
        buf.truncate(read);
        self.offset += read as u64;
        Ok(buf)
    }

    /// Start polling in a background task.
    ///
    /// `deliver` receives every non-empty chunk and every fault; returning
    /// `false` stops the poller.
    pub fn spawn<F>(mut self, mut deliver: F) -> TailHandle
    where
        F: FnMut(TailChunk) -> bool + Send + 'static,
    {
        let path = self.path.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let chunk = match self.read_available().await {
                    Ok(bytes) if bytes.is_empty() => continue,
                    Ok(bytes) => {
                        debug!(
                            path = %self.path.display(),
                            bytes = bytes.len(),
                            offset = self.offset,
                            "Read appended bytes"
                        );
                        TailChunk::Data(bytes)
                    }
                    Err(e) => {
                        warn!(path = %self.path.display(), error = %e, "Tail read failed");
                        TailChunk::Fault(e)
                    }
                };

                if !deliver(chunk) {
                    debug!(path = %self.path.display(), "Tail consumer gone, stopping");
                    break;
                }
            }
        });

        TailHandle {
            path,
            task: Some(task),
        }
    }
}

/// Handle to a running poller.
///
/// Dropping the handle also stops the poller.
pub struct TailHandle {
    path: PathBuf,
    task: Option<JoinHandle<()>>,
}

impl TailHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Stop polling and release the file handle.
    ///
    /// Closing twice is an error.
    pub fn close(&mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => {
                task.abort();
                debug!(path = %self.path.display(), "Tail closed");
                Ok(())
            }
            None => Err(JournalError::AlreadyClosed),
        }
    }
}

impl Drop for TailHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
