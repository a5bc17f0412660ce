//! edcompanion - Elite Dangerous journal companion
//!
//! Tails the game's journal directory into an ordered, typed event stream
//! and tracks nearby commanders through the EDSM live map.

pub mod config;
pub mod galaxy;
pub mod journal;
pub mod utils;
