//! # Web Handlers for the Campsite Atlas Admin API
//!
//! This crate provides the actix-web handlers for the candidate review
//! surface consumed by the admin UI.

/// Request and response types for the candidate review API
mod candidate_types;
pub use candidate_types::*;

/// Handlers for candidate listing, review and sync endpoints
mod candidate_handlers;
pub use candidate_handlers::*;
