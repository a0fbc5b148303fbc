//! # Candidate Ingest
//!
//! This crate implements the candidate ingestion pipeline for the Campsite
//! Atlas platform: pulling place records from the external directory,
//! deduplicating them against the authoritative campsite inventory, scoring
//! their quality, and driving the administrative review workflow that turns
//! approved candidates into real campsites.

/// Candidate model, lifecycle status and error types
mod types;
pub use types::*;

/// Duplicate matching against the existing campsite inventory
mod matcher;
pub use matcher::*;

/// Deterministic confidence scoring for candidates
mod scorer;
pub use scorer::*;

/// Persistence for candidates and their lifecycle state
mod store;
pub use store::*;

/// Campsite inventory and creation collaborators
mod campsites;
pub use campsites::*;

/// Review state machine (approve / reject / import)
mod review;
pub use review::*;

/// Bulk approve/reject with per-item isolation
mod bulk;
pub use bulk::*;

/// Client for the external place-directory API
mod place_client;
pub use place_client::*;

/// Run-level mutual exclusion for sync runs
mod sync_lock;
pub use sync_lock::*;

/// Sync orchestrator pulling new candidates from the directory
mod sync;
pub use sync::*;
