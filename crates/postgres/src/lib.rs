//! # Postgres
//!
//! This crate provides connection-pool helpers for the Campsite Atlas
//! backend's PostgreSQL database.

/// Database client for the Campsite Atlas backend.
pub mod database;
