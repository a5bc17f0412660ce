//! Shared helpers for the companion binaries.

pub mod bootstrap;
