//! # anitodo common library
//!
//! Shared code for the anitodo update tracker:
//! - Error type used by the store and configuration layers
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Tracing initialisation
//! - Weekday and timestamp helpers
//! - Event bus for state-change notifications
//! - SQLite database initialisation and migrations

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
pub use events::{AniEvent, EventBus};
