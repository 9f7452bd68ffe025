//! # ABR Common Library
//!
//! Shared code for the audiobook request services:
//! - Error and result types
//! - TOML configuration loading and resolution order
//! - Event types (ResolverEvent) and the EventBus used for SSE / notification hand-off

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
