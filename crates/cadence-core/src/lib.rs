//! # Cadence Core
//!
//! An in-process event-dispatch and batching core that sits between
//! asynchronous event producers (pointer input, layout completion, scroll,
//! focus changes) and a single logical consumer.
//!
//! This crate provides:
//! - **Queue**: Ordered, loss-free event buffering with immediate or
//!   beat-synchronized batched dispatch
//! - **Pipes**: Single-call delivery capabilities toward the consumer
//! - **Beat**: An armable, one-shot-per-arm readiness signal decoupling the
//!   queue from the platform's pulse source
//!
//! ## Design Principles
//!
//! 1. **Arrival order is delivery order** - batches concatenated across
//!    flushes equal the global enqueue order
//! 2. **No loss, no duplication** - every event is delivered exactly once,
//!    or counted as dropped when its batch fails fast
//! 3. **Producers never wait on the consumer** - batched enqueue is a
//!    bounded, lock-only operation; delivery runs on the beat context
//! 4. **Locks never span delivery** - pipe calls may re-enter the queue
//!
//! ## Example
//!
//! ```rust,ignore
//! use cadence_core::{Event, EventQueue, ManualEventBeat, TargetId};
//!
//! let beat = ManualEventBeat::new();
//! let queue = EventQueue::batched(event_pipe, state_pipe, Box::new(beat.clone()));
//!
//! queue.enqueue(Event::new("pointer-down", TargetId(7), payload));
//! queue.enqueue(Event::new("pointer-up", TargetId(7), payload));
//!
//! // The platform's refresh callback drives the beat:
//! beat.pulse(); // one flush, both events, in order
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod beat;
pub mod event;
pub mod pipe;
pub mod queue;

// Re-export key types
pub use beat::{AsyncEventBeat, EventBeat, ManualEventBeat, PulseCallback};
pub use event::{Event, EventKind, StateUpdate, TargetId};
pub use pipe::{event_pipe_fn, state_pipe_fn, EventPipe, PipeError, StatePipe};
pub use queue::{EventQueue, QueueConfig, QueueError, QueueMetrics};

/// Result type for cadence-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cadence-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Queue dispatch errors
    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    /// Pipe delivery errors
    #[error("Pipe error: {0}")]
    Pipe(#[from] pipe::PipeError),
}
