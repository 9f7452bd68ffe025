//! HTTP API handlers for abr-meta
//!
//! Thin layer: handlers validate, enqueue or read, and return. Resolution
//! itself always happens on the queue worker (or, for `/lookup`, through the
//! shared coordinator).

pub mod health;
pub mod lookup;
pub mod requests;
pub mod sse;
pub mod webhook;

pub use health::health_routes;
pub use lookup::lookup_routes;
pub use requests::request_routes;
pub use sse::event_stream;
pub use webhook::webhook_routes;
