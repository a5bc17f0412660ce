//! Galaxy crawler integration tests.
//!
//! Runs the background crawler against an in-memory commander map and
//! checks the notifications and queries a consumer relies on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use edcompanion::galaxy::{
    CommanderMapEntry, CommanderMapPage, Coordinates, CrawlerEvent, CrawlerOptions, EdsmError,
    GalaxyCrawler, PeerDirectory, Result, SOL,
};

// ============================================================================
// Test Fixtures
// ============================================================================

/// Mutable in-memory map, split into fixed-size pages.
struct LiveMap {
    commanders: Mutex<Vec<CommanderMapEntry>>,
    page_size: usize,
    systems: HashMap<String, String>,
}

impl LiveMap {
    fn new(commanders: Vec<CommanderMapEntry>, page_size: usize) -> Self {
        Self {
            commanders: Mutex::new(commanders),
            page_size,
            systems: HashMap::new(),
        }
    }

    async fn move_commander(&self, user: &str, to: Coordinates) {
        let mut commanders = self.commanders.lock().await;
        if let Some(entry) = commanders.iter_mut().find(|e| e.user == user) {
            entry.coordinates = to;
        }
    }
}

#[async_trait]
impl PeerDirectory for LiveMap {
    async fn fetch_page(&self, page: u64) -> Result<CommanderMapPage> {
        let commanders = self.commanders.lock().await;
        let pages = commanders.len().div_ceil(self.page_size).max(1) as u64;
        if page > pages {
            return Err(EdsmError::Status {
                status: 404,
                body: String::new(),
            });
        }
        let items = commanders
            .chunks(self.page_size)
            .nth((page - 1) as usize)
            .map(|c| c.to_vec())
            .unwrap_or_default();
        Ok(CommanderMapPage {
            max_items: commanders.len() as u64,
            // Zero-based, like the live service.
            max_page: pages - 1,
            items,
        })
    }

    async fn nearest_system_name(&self, position: Coordinates) -> Result<Option<String>> {
        let key = format!("{:.1},{:.1},{:.1}", position.x, position.y, position.z);
        Ok(self.systems.get(&key).cloned())
    }
}

fn cmdr(user: &str, x: f64, y: f64, z: f64) -> CommanderMapEntry {
    CommanderMapEntry {
        user: user.to_string(),
        coordinates: Coordinates::new(x, y, z),
        cmdr_name: Some(format!("Cmdr {}", user)),
        system_name: None,
        cmdr_url: None,
    }
}

fn fast_options() -> CrawlerOptions {
    CrawlerOptions {
        delay: Duration::from_millis(1),
        cycle_delay: Duration::from_millis(1),
        additional_delay: None,
    }
}

async fn next_cycle(events: &mut broadcast::Receiver<CrawlerEvent>) -> u64 {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(CrawlerEvent::Cycle(n)) => return n,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("crawler dropped"),
            }
        }
    })
    .await
    .expect("timed out waiting for cycle")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_full_pass_registers_every_commander() {
    let map = Arc::new(LiveMap::new(
        vec![
            cmdr("1", 0.0, 0.0, 0.0),
            cmdr("2", 100.0, 0.0, 0.0),
            cmdr("3", 25.0, -20.0, 25900.0),
        ],
        2,
    ));
    let crawler = GalaxyCrawler::new(map.clone(), fast_options());
    let mut events = crawler.subscribe();

    crawler.start().await.unwrap();
    assert_eq!(next_cycle(&mut events).await, 1);
    crawler.stop().await.unwrap();

    assert!(crawler.has_cycled().await);
    assert_eq!(crawler.registry().await.len(), 3);

    let (closest, distance) = crawler
        .find_closest(&Coordinates::new(90.0, 0.0, 0.0))
        .await
        .unwrap();
    assert_eq!(closest.user, "2");
    assert!((distance - 10.0).abs() < 1e-9);

    let near_sol = crawler.find_in_sphere(&SOL, 150.0).await;
    assert_eq!(near_sol.len(), 2);
}

#[tokio::test]
async fn test_movement_between_passes_is_reported() {
    let map = Arc::new(LiveMap::new(vec![cmdr("7", 10.0, 0.0, 0.0)], 10));
    let crawler = GalaxyCrawler::new(map.clone(), fast_options());
    let mut events = crawler.subscribe();

    crawler.start().await.unwrap();
    next_cycle(&mut events).await;
    map.move_commander("7", Coordinates::new(20.0, 0.0, 0.0)).await;

    let moved = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(CrawlerEvent::Moved { last_position, entry }) = events.recv().await {
                return (last_position, entry);
            }
        }
    })
    .await
    .expect("timed out waiting for movement");
    crawler.stop().await.unwrap();

    assert_eq!(moved.0, Coordinates::new(10.0, 0.0, 0.0));
    assert_eq!(moved.1.coordinates, Coordinates::new(20.0, 0.0, 0.0));
    assert_eq!(
        crawler.registry().await.get("7").unwrap().coordinates,
        Coordinates::new(20.0, 0.0, 0.0)
    );
}

#[tokio::test]
async fn test_auto_complete_fills_system_name() {
    let mut map = LiveMap::new(vec![cmdr("9", 67.5, -119.5, 24.8)], 10);
    map.systems
        .insert("67.5,-119.5,24.8".to_string(), "Achenar".to_string());
    let crawler = GalaxyCrawler::new(Arc::new(map), fast_options());

    crawler.poll_once().await.unwrap();
    let (entry, _) = crawler
        .find_closest_auto_complete(&Coordinates::new(67.0, -119.0, 24.0))
        .await
        .unwrap();
    assert_eq!(entry.system_name.as_deref(), Some("Achenar"));
    assert_eq!(
        crawler.registry().await.get("9").unwrap().system_name.as_deref(),
        Some("Achenar")
    );
}

#[tokio::test]
async fn test_restart_after_stop() {
    let map = Arc::new(LiveMap::new(vec![cmdr("1", 0.0, 0.0, 0.0)], 10));
    let crawler = GalaxyCrawler::new(map, fast_options());
    let mut events = crawler.subscribe();

    crawler.start().await.unwrap();
    next_cycle(&mut events).await;
    crawler.stop().await.unwrap();
    assert!(!crawler.is_running().await);

    crawler.start().await.unwrap();
    assert!(crawler.is_running().await);
    assert!(next_cycle(&mut events).await >= 2);
    crawler.stop().await.unwrap();
}
