//! # discat Common Library
//!
//! Shared code for the discat services including:
//! - Catalog database schema and row models
//! - Status event types (StatusEvent / Milestone) and the EventBus
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
