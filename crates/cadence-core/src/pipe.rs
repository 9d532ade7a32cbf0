//! Delivery pipes — [`EventPipe`] and [`StatePipe`] capabilities.
//!
//! A pipe is the only way data leaves the core. The consumer-side
//! collaborator supplies one of each at queue construction; the queue
//! invokes them during flush, outside any buffer lock, so a pipe is free to
//! re-enter the queue (e.g. a consumer synchronously producing a new event).
//!
//! # API Styles
//!
//! - **Trait-based**: Implement [`EventPipe`] / [`StatePipe`] for stateful
//!   consumers.
//! - **Closure-based**: Use [`event_pipe_fn`] / [`state_pipe_fn`] for simple
//!   cases.
//!
//! # Failure
//!
//! Delivery is fallible. A pipe returning an error aborts the batch being
//! flushed (fail-fast, no rollback of already-delivered events); see the
//! queue's flush documentation for exact semantics.

use crate::event::{Event, StateUpdate};

// ---------------------------------------------------------------------------
// PipeError
// ---------------------------------------------------------------------------

/// Error returned by a pipe when delivery fails.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// The consumer rejected this delivery.
    #[error("delivery rejected: {0}")]
    Rejected(String),
    /// The consumer is gone; no further deliveries can succeed.
    #[error("consumer closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// EventPipe
// ---------------------------------------------------------------------------

/// Capability for delivering events to the consumer.
///
/// Invoked once per event, in arrival order, on the context driving the
/// flush (the beat context for batched queues). The event is consumed by
/// the call; the queue retains nothing after a successful delivery.
pub trait EventPipe: Send + Sync {
    /// Delivers one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer cannot accept the event. The
    /// remaining events of the same batch will not be delivered.
    fn deliver(&self, event: Event) -> Result<(), PipeError>;
}

// ---------------------------------------------------------------------------
// StatePipe
// ---------------------------------------------------------------------------

/// Capability for delivering state updates to the consumer.
///
/// Invoked once per pending target, after all events of the batch.
pub trait StatePipe: Send + Sync {
    /// Delivers one state update.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer cannot accept the update. The
    /// remaining updates of the same cycle will not be delivered.
    fn deliver(&self, update: StateUpdate) -> Result<(), PipeError>;
}

// ---------------------------------------------------------------------------
// Closure adapters (private)
// ---------------------------------------------------------------------------

/// Adapter that wraps a closure into an [`EventPipe`].
struct FnEventPipe<F>(F);

impl<F> EventPipe for FnEventPipe<F>
where
    F: Fn(Event) -> Result<(), PipeError> + Send + Sync,
{
    fn deliver(&self, event: Event) -> Result<(), PipeError> {
        (self.0)(event)
    }
}

/// Adapter that wraps a closure into a [`StatePipe`].
struct FnStatePipe<F>(F);

impl<F> StatePipe for FnStatePipe<F>
where
    F: Fn(StateUpdate) -> Result<(), PipeError> + Send + Sync,
{
    fn deliver(&self, update: StateUpdate) -> Result<(), PipeError> {
        (self.0)(update)
    }
}

// ---------------------------------------------------------------------------
// Factory Functions
// ---------------------------------------------------------------------------

/// Wraps a closure into a boxed [`EventPipe`].
///
/// # Example
///
/// ```rust,ignore
/// let pipe = event_pipe_fn(|event| {
///     println!("{} on {}", event.kind, event.target);
///     Ok(())
/// });
/// ```
pub fn event_pipe_fn<F>(f: F) -> Box<dyn EventPipe>
where
    F: Fn(Event) -> Result<(), PipeError> + Send + Sync + 'static,
{
    Box::new(FnEventPipe(f))
}

/// Wraps a closure into a boxed [`StatePipe`].
pub fn state_pipe_fn<F>(f: F) -> Box<dyn StatePipe>
where
    F: Fn(StateUpdate) -> Result<(), PipeError> + Send + Sync + 'static,
{
    Box::new(FnStatePipe(f))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;

    use super::*;
    use crate::event::TargetId;

    #[test]
    fn test_event_pipe_fn_invoked() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let pipe = event_pipe_fn(move |event| {
            seen_clone.lock().unwrap().push(event.kind.to_string());
            Ok(())
        });

        pipe.deliver(Event::new("focus", TargetId(1), Bytes::new()))
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["focus".to_string()]);
    }

    #[test]
    fn test_state_pipe_fn_error_passthrough() {
        let pipe = state_pipe_fn(|_| Err(PipeError::Closed));
        let err = pipe
            .deliver(StateUpdate::new(TargetId(1), Bytes::new()))
            .unwrap_err();
        assert!(matches!(err, PipeError::Closed));
    }

    #[test]
    fn test_pipe_error_display() {
        assert_eq!(
            PipeError::Rejected("busy".into()).to_string(),
            "delivery rejected: busy"
        );
        assert_eq!(PipeError::Closed.to_string(), "consumer closed");
    }
}
