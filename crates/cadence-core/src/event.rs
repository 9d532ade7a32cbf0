//! Event and state-update data types.
//!
//! Both types are plain, immutable data units. The core never inspects
//! payloads; `kind` and `target` exist so the consumer can route, and
//! `sequence` exists so ordering is observable across batches.

use std::sync::Arc;

use bytes::Bytes;

// ---------------------------------------------------------------------------
// TargetId
// ---------------------------------------------------------------------------

/// Opaque handle identifying the entity an event or state update addresses.
///
/// The core never dereferences it; it only keys the pending state-update
/// slots (one per target, latest-wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub u64);

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "target-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Opaque event-kind identifier.
///
/// Cheap to clone (`Arc<str>` internally). The core routes on it only in
/// the sense of handing it through to the consumer untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKind(Arc<str>);

impl EventKind {
    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// An immutable event produced by a native producer.
///
/// Exclusively owned by the queue from enqueue until it is handed to the
/// event pipe, at which point ownership transfers to the pipe call.
#[derive(Debug, Clone)]
pub struct Event {
    /// What happened (e.g. `"pointer-down"`). Never interpreted by the core.
    pub kind: EventKind,
    /// Which entity it happened to.
    pub target: TargetId,
    /// Opaque payload for the consumer.
    pub payload: Bytes,
    /// Arrival position, stamped by the queue at enqueue. Any value set by
    /// the producer is overwritten; `0` means "not yet enqueued".
    pub sequence: u64,
}

impl Event {
    /// Creates an event with an unassigned sequence.
    #[must_use]
    pub fn new(kind: impl Into<EventKind>, target: TargetId, payload: Bytes) -> Self {
        Self {
            kind: kind.into(),
            target,
            payload,
            sequence: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// StateUpdate
// ---------------------------------------------------------------------------

/// A pending state update for one target.
///
/// At most one update per target is pending per flush cycle; a newer update
/// for the same target replaces the older one (latest-wins). Updates are
/// delivered after all events of the batch they accompany.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    /// Which entity the update addresses.
    pub target: TargetId,
    /// Opaque payload for the consumer.
    pub payload: Bytes,
}

impl StateUpdate {
    /// Creates a state update.
    #[must_use]
    pub fn new(target: TargetId, payload: Bytes) -> Self {
        Self { target, payload }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
