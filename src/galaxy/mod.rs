//! Peer tracking against the EDSM live commander map.
//!
//! - `EdsmClient`: HTTP client for the paged listing and cube-systems lookup
//! - `PeerRegistry`: last known position of every observed commander
//! - `GalaxyCrawler`: background pager that diffs pages into the registry

mod client;
mod coordinates;
mod crawler;
mod registry;

pub use client::{
    CommanderMapEntry, CommanderMapPage, EdsmClient, PeerDirectory, SystemSummary, SystemsQuery,
};
pub use coordinates::{Coordinates, GALACTIC_CORE, SOL};
pub use crawler::{CrawlState, CrawlerEvent, CrawlerOptions, GalaxyCrawler};
pub use registry::{Observation, PeerRegistry};

/// Result type for EDSM requests.
pub type Result<T> = std::result::Result<T, EdsmError>;

/// Errors returned by the remote listing.
#[derive(Debug, thiserror::Error)]
pub enum EdsmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("EDSM returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode EDSM response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Crawler lifecycle misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrawlerError {
    #[error("Crawler already running")]
    AlreadyRunning,

    #[error("Crawler not running")]
    NotRunning,
}
