//! Resolution workflow
//!
//! - `coordinator`: scrape → primary → fallback for one request
//! - `queue`: bounded FIFO feeding a single worker, so resolutions never overlap

pub mod coordinator;
pub mod queue;

pub use coordinator::{CoordinatorTimeouts, MetadataCoordinator};
pub use queue::{
    QueueError, QueueStats, QueueWorker, ResolutionOutcome, ResolutionQueue, ResolutionTicket,
};
