//! Resolution queue
//!
//! Webhook handlers enqueue raw payloads; a single worker task dequeues them
//! in FIFO order and resolves one at a time. The channel is bounded and
//! `enqueue` never waits: a full queue is reported to the caller at once.
//!
//! Each resolution runs in its own spawned task which the worker awaits, so
//! a panic inside an adapter fails that one item and the loop keeps going.

use super::coordinator::MetadataCoordinator;
use crate::types::{CanonicalMetadata, IncomingRequest, ResolverError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome delivered to a ticket
pub type ResolutionOutcome = Result<CanonicalMetadata, ResolverError>;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("resolution queue is full ({capacity} pending)")]
    Full { capacity: usize },

    #[error("resolution queue is closed")]
    Closed,
}

/// One queued resolution
struct QueueItem {
    id: Uuid,
    request: IncomingRequest,
    enqueued_at: DateTime<Utc>,
    reply: oneshot::Sender<ResolutionOutcome>,
}

/// Handle returned by `enqueue`
#[derive(Debug)]
pub struct ResolutionTicket {
    pub id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    reply: oneshot::Receiver<ResolutionOutcome>,
}

impl ResolutionTicket {
    /// Wait for the worker to finish this item
    pub async fn outcome(self) -> ResolutionOutcome {
        self.reply.await.unwrap_or(Err(ResolverError::Cancelled))
    }
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Queue instrumentation snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: usize,
    /// Highest `in_flight` ever observed; stays at 1 while the single-writer
    /// guarantee holds
    pub max_in_flight: usize,
    /// Items waiting in the channel
    pub depth: usize,
    pub capacity: usize,
}

/// Producer side, cheap to clone
#[derive(Clone)]
pub struct ResolutionQueue {
    tx: mpsc::Sender<QueueItem>,
    counters: Arc<Counters>,
}

impl ResolutionQueue {
    /// Create the queue and its worker. The worker does nothing until
    /// `run` is awaited (usually via `tokio::spawn`).
    pub fn new(coordinator: Arc<MetadataCoordinator>, capacity: usize) -> (Self, QueueWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());

        let queue = Self {
            tx,
            counters: Arc::clone(&counters),
        };
        let worker = QueueWorker {
            rx,
            coordinator,
            counters,
        };
        (queue, worker)
    }

    /// Hand a payload to the worker without waiting
    pub fn enqueue(&self, request: IncomingRequest) -> Result<ResolutionTicket, QueueError> {
        let (reply, reply_rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let enqueued_at = Utc::now();

        let item = QueueItem {
            id,
            request,
            enqueued_at,
            reply,
        };

        match self.tx.try_send(item) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
                debug!(request_id = %id, depth = self.depth(), "Request enqueued");
                Ok(ResolutionTicket {
                    id,
                    enqueued_at,
                    reply: reply_rx,
                })
            }
            Err(TrySendError::Full(_)) => {
                let capacity = self.capacity();
                warn!(capacity, "Resolution queue full, rejecting request");
                Err(QueueError::Full { capacity })
            }
            Err(TrySendError::Closed(_)) => {
                error!("Resolution worker is gone, rejecting request");
                Err(QueueError::Closed)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Items waiting to be picked up
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            max_in_flight: self.counters.max_in_flight.load(Ordering::SeqCst),
            depth: self.depth(),
            capacity: self.capacity(),
        }
    }
}

/// Single consumer of the queue
pub struct QueueWorker {
    rx: mpsc::Receiver<QueueItem>,
    coordinator: Arc<MetadataCoordinator>,
    counters: Arc<Counters>,
}

impl QueueWorker {
    /// Process items until every `ResolutionQueue` handle is dropped
    pub async fn run(mut self) {
        info!("Resolution worker started");
        while let Some(item) = self.rx.recv().await {
            self.process(item).await;
        }
        info!("Resolution worker stopped: queue closed");
    }

    async fn process(&self, item: QueueItem) {
        let QueueItem {
            id,
            request,
            enqueued_at,
            reply,
        } = item;

        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let waited_ms = (Utc::now() - enqueued_at).num_milliseconds();
        debug!(request_id = %id, waited_ms, "Resolution started");

        let coordinator = Arc::clone(&self.coordinator);
        let handle = tokio::spawn(async move { coordinator.resolve(&request).await });

        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let message = panic_message(join_error);
                error!(request_id = %id, panic = %message, "Resolution task panicked");
                Err(ResolverError::WorkerPanic(message))
            }
        };

        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        match &outcome {
            Ok(_) => {
                self.counters.completed.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                error!(request_id = %id, error = %e, "Resolution failed");
            }
        }

        if reply.send(outcome).is_err() {
            debug!(request_id = %id, "Ticket dropped before outcome was delivered");
        }
    }
}

fn panic_message(join_error: tokio::task::JoinError) -> String {
    if join_error.is_cancelled() {
        return "task cancelled".to_string();
    }
    let payload = join_error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
