//! Background pager over the live commander map.
//!
//! Fetches are strictly sequential: the next one is scheduled only after the
//! current one finished and its delay was computed. A generation counter is
//! captured before each fetch and checked before any state is touched, so a
//! fetch completing after `stop()` is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::{CommanderMapEntry, CommanderMapPage, PeerDirectory};
use super::coordinates::Coordinates;
use super::registry::{Observation, PeerRegistry};
use super::{CrawlerError, EdsmError};
use crate::config::GalaxyConfig;

const EVENT_CAPACITY: usize = 1024;

/// Pacing of page fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlerOptions {
    /// Base delay between fetches.
    pub delay: Duration,
    /// Extra pause after each completed cycle.
    pub cycle_delay: Duration,
    /// Extra delay once the first cycle completed. Falls back to `delay`.
    pub additional_delay: Option<Duration>,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(250),
            cycle_delay: Duration::from_secs(30),
            additional_delay: Some(Duration::from_millis(1500)),
        }
    }
}

impl CrawlerOptions {
    pub fn from_config(config: &GalaxyConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            cycle_delay: Duration::from_millis(config.cycle_delay_ms),
            additional_delay: config.additional_delay_ms.map(Duration::from_millis),
        }
    }

    /// Delay before the fetch following a poll that left the crawler in `state`.
    pub fn next_delay(&self, state: &CrawlState) -> Duration {
        let mut delay = self.delay;
        if state.cycle_count > 0 {
            delay += self.additional_delay.unwrap_or(self.delay);
        }
        if state.page_index == 0 {
            delay += self.cycle_delay;
        }
        delay
    }
}

/// Paging position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlState {
    /// Index of the next page to fetch, minus one. Wraps to 0 after the
    /// server-reported max page.
    pub page_index: u64,
    /// Completed passes over all pages.
    pub cycle_count: u64,
}

#[derive(Debug, Clone)]
pub enum CrawlerEvent {
    Registered(CommanderMapEntry),
    Moved {
        last_position: Coordinates,
        entry: CommanderMapEntry,
    },
    Page {
        page_no: u64,
        page: Arc<CommanderMapPage>,
    },
    /// A cycle completed; carries the new cycle count.
    Cycle(u64),
    Error(Arc<EdsmError>),
}

struct Inner {
    registry: RwLock<PeerRegistry>,
    state: RwLock<CrawlState>,
    generation: AtomicU64,
    events: broadcast::Sender<CrawlerEvent>,
}

impl Inner {
    fn emit(&self, event: CrawlerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// One fetch-diff-advance step.
    ///
    /// Returns the delay before the next step, or `None` if the crawler was
    /// stopped while the fetch was in flight.
    async fn poll(
        &self,
        directory: &dyn PeerDirectory,
        options: &CrawlerOptions,
        generation: u64,
    ) -> Option<Duration> {
        let page_index = self.state.read().await.page_index;
        let result = directory.fetch_page(page_index + 1).await;

        // `stop` bumps the generation under this lock, so once the check
        // passes the whole step lands before the stop takes effect.
        let mut state = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(page = page_index + 1, "Discarding page fetched after stop");
            return None;
        }

        match result {
            Ok(page) => {
                let page = Arc::new(page);
                debug!(
                    page = page_index + 1,
                    max_page = page.max_page,
                    items = page.items.len(),
                    "Fetched commander map page"
                );
                self.emit(CrawlerEvent::Page {
                    page_no: page_index,
                    page: Arc::clone(&page),
                });

                let commanders = {
                    let mut registry = self.registry.write().await;
                    for entry in page.items.iter().cloned() {
                        match registry.observe(entry.clone()) {
                            Observation::Registered => self.emit(CrawlerEvent::Registered(entry)),
                            Observation::Moved { last_position } => {
                                self.emit(CrawlerEvent::Moved {
                                    last_position,
                                    entry,
                                })
                            }
                            Observation::Unchanged => {}
                        }
                    }
                    registry.len()
                };

                // A shrinking listing can leave the index past the new max page.
                if state.page_index >= page.max_page {
                    state.page_index = 0;
                    state.cycle_count += 1;
                    info!(
                        cycle = state.cycle_count,
                        commanders,
                        "Commander map cycle complete"
                    );
                    self.emit(CrawlerEvent::Cycle(state.cycle_count));
                } else {
                    state.page_index += 1;
                }
            }
            Err(e) => {
                warn!(page = page_index + 1, error = %e, "Commander map fetch failed");
                self.emit(CrawlerEvent::Error(Arc::new(e)));
            }
        }

        Some(options.next_delay(&state))
    }
}

/// Polls the live commander map and tracks every commander's position.
pub struct GalaxyCrawler {
    directory: Arc<dyn PeerDirectory>,
    options: CrawlerOptions,
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GalaxyCrawler {
    pub fn new(directory: Arc<dyn PeerDirectory>, options: CrawlerOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            directory,
            options,
            inner: Arc::new(Inner {
                registry: RwLock::new(PeerRegistry::new()),
                state: RwLock::new(CrawlState::default()),
                generation: AtomicU64::new(0),
                events,
            }),
            task: Mutex::new(None),
        }
    }

    /// Receive registration, movement, page, cycle and error notifications.
    ///
    /// The channel is bounded: a subscriber that falls more than 1024
    /// notifications behind gets `RecvError::Lagged` and misses the oldest
    /// ones. Use `registry()` to resynchronize.
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlerEvent> {
        self.inner.events.subscribe()
    }

    /// Start paging. The first fetch happens immediately.
    pub async fn start(&self) -> Result<(), CrawlerError> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(CrawlerError::AlreadyRunning);
        }

        let generation = self.inner.generation.load(Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let directory = Arc::clone(&self.directory);
        let options = self.options;

        info!(?options, "Starting galaxy crawler");
        *task = Some(tokio::spawn(async move {
            while let Some(delay) = inner.poll(directory.as_ref(), &options, generation).await {
                debug!(delay_ms = delay.as_millis() as u64, "Next commander map fetch scheduled");
                tokio::time::sleep(delay).await;
            }
        }));
        Ok(())
    }

    /// Stop paging. An in-flight fetch is cancelled and its result ignored.
    pub async fn stop(&self) -> Result<(), CrawlerError> {
        let mut task = self.task.lock().await;
        let handle = task.take().ok_or(CrawlerError::NotRunning)?;
        {
            let _state = self.inner.state.write().await;
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
        }
        handle.abort();
        info!("Galaxy crawler stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Whether at least one full pass over the listing completed.
    pub async fn has_cycled(&self) -> bool {
        self.inner.state.read().await.cycle_count > 0
    }

    pub async fn crawl_state(&self) -> CrawlState {
        *self.inner.state.read().await
    }

    /// Snapshot of the registry.
    pub async fn registry(&self) -> PeerRegistry {
        self.inner.registry.read().await.clone()
    }

    /// Run a single fetch step outside the background loop.
    ///
    /// Returns the delay the loop would wait before the next step. Fails
    /// while the loop is running, which keeps a single request in flight.
    pub async fn poll_once(&self) -> Result<Duration, CrawlerError> {
        let task = self.task.lock().await;
        if task.is_some() {
            return Err(CrawlerError::AlreadyRunning);
        }
        let generation = self.inner.generation.load(Ordering::SeqCst);
        Ok(self
            .inner
            .poll(self.directory.as_ref(), &self.options, generation)
            .await
            .unwrap_or(self.options.delay))
    }

    pub async fn find_closest(&self, point: &Coordinates) -> Option<(CommanderMapEntry, f64)> {
        self.inner
            .registry
            .read()
            .await
            .find_closest(point)
            .map(|(entry, distance)| (entry.clone(), distance))
    }

    /// Entries within `radius` of `point`, unsorted.
    pub async fn find_in_sphere(&self, point: &Coordinates, radius: f64) -> Vec<(CommanderMapEntry, f64)> {
        self.inner
            .registry
            .read()
            .await
            .find_in_sphere(point, radius)
            .into_iter()
            .map(|(entry, distance)| (entry.clone(), distance))
            .collect()
    }

    /// `find_closest`, resolving the entry's system name if it has none.
    ///
    /// The lookup is best-effort: on failure the positional result is
    /// returned unchanged.
    pub async fn find_closest_auto_complete(&self, point: &Coordinates) -> Option<(CommanderMapEntry, f64)> {
        let (mut entry, distance) = self.find_closest(point).await?;
        if entry.system_name.is_some() {
            return Some((entry, distance));
        }

        match self.directory.nearest_system_name(entry.coordinates).await {
            Ok(Some(name)) => {
                self.inner
                    .registry
                    .write()
                    .await
                    .set_system_name(&entry.user, entry.coordinates, name.clone());
                entry.system_name = Some(name);
            }
            Ok(None) => debug!(user = %entry.user, "No system found near commander"),
            Err(e) => warn!(user = %entry.user, error = %e, "System lookup failed"),
        }
        Some((entry, distance))
    }
}

impl Drop for GalaxyCrawler {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}
