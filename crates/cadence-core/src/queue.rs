//! Event queue — ordered, loss-free buffering with immediate or batched flush.
//!
//! The queue accepts events from any number of producer contexts and
//! delivers them to the consumer through its pipes, in arrival order, one
//! batch at a time. *When* a flush runs is the dispatch policy chosen at
//! construction:
//!
//! - [`EventQueue::immediate`] drains synchronously on every enqueue.
//! - [`EventQueue::batched`] arms its [`EventBeat`] on enqueue and flushes
//!   when the beat pulses, coalescing any number of enqueues between two
//!   pulses into one batch.
//!
//! # Locking
//!
//! Three locks, never nested around delivery:
//!
//! - the **buffer lock** guards append and the take-ownership step only;
//! - the **slot lock** guards the pending state-update slots likewise;
//! - the **flush gate** serializes whole flushes so two batches never
//!   interleave (a flush may arrive from an explicit call and from the beat
//!   callback concurrently).
//!
//! Pipe calls run with none of these held, so a consumer may re-enter
//! `enqueue` from inside a delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::beat::EventBeat;
use crate::event::{Event, StateUpdate};
use crate::pipe::{EventPipe, PipeError, StatePipe};

// ---------------------------------------------------------------------------
// QueueError
// ---------------------------------------------------------------------------

/// Error returned by [`EventQueue::flush`] when a pipe rejects delivery.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The event pipe failed; the rest of the taken batch was dropped.
    #[error("event delivery failed: {0}")]
    EventDelivery(#[source] PipeError),
    /// The state pipe failed; the remaining pending updates were dropped.
    #[error("state delivery failed: {0}")]
    StateDelivery(#[source] PipeError),
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

/// Configuration for an [`EventQueue`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Buffer depth at which a starvation warning is logged. The buffer
    /// itself is unbounded; sustained growth means the beat is not pulsing
    /// or the consumer cannot keep up.
    pub depth_warning: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            depth_warning: 8192,
        }
    }
}

// ---------------------------------------------------------------------------
// QueueMetrics
// ---------------------------------------------------------------------------

/// Atomic counters for monitoring a queue.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Total events accepted by `enqueue`.
    pub events_enqueued: AtomicU64,
    /// Total events handed to the event pipe successfully.
    pub events_delivered: AtomicU64,
    /// Total events taken into a batch but never delivered (fail-fast).
    pub events_dropped: AtomicU64,
    /// Total state updates handed to the state pipe successfully.
    pub state_updates_delivered: AtomicU64,
    /// Total state updates taken into a cycle but never delivered.
    pub state_updates_dropped: AtomicU64,
    /// Total non-empty flushes.
    pub flushes: AtomicU64,
    /// Total flushes that found nothing pending (safe no-ops).
    pub empty_flushes: AtomicU64,
}

impl QueueMetrics {
    /// Returns total events enqueued.
    #[must_use]
    pub fn events_enqueued(&self) -> u64 {
        self.events_enqueued.load(Ordering::Relaxed)
    }

    /// Returns total events delivered.
    #[must_use]
    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.load(Ordering::Relaxed)
    }

    /// Returns total events dropped.
    #[must_use]
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    /// Returns total state updates delivered.
    #[must_use]
    pub fn state_updates_delivered(&self) -> u64 {
        self.state_updates_delivered.load(Ordering::Relaxed)
    }

    /// Returns total state updates dropped.
    #[must_use]
    pub fn state_updates_dropped(&self) -> u64 {
        self.state_updates_dropped.load(Ordering::Relaxed)
    }

    /// Returns total non-empty flushes.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Returns total empty flushes.
    #[must_use]
    pub fn empty_flushes(&self) -> u64 {
        self.empty_flushes.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// DispatchPolicy
// ---------------------------------------------------------------------------

/// When the enqueue hook flushes: now, or on the next beat pulse.
enum DispatchPolicy {
    /// Drain synchronously on every enqueue.
    Immediate,
    /// Arm the owned beat; its pulse drives the flush.
    Batched { beat: Box<dyn EventBeat> },
}

// ---------------------------------------------------------------------------
// EventQueue
// ---------------------------------------------------------------------------

/// Ordered event queue with a pluggable dispatch policy.
///
/// The queue owns its pipes and, for the batched policy, its beat. The beat
/// calls back into the queue through a non-owning handle, so dropping the
/// queue leaves any in-flight pulse inert.
pub struct EventQueue {
    core: Arc<QueueCore>,
}

/// Shared state between the queue handle and the beat's pulse callback.
struct QueueCore {
    buffer: Mutex<Vec<Event>>,
    /// Pending state updates, one slot per target, in first-install order.
    /// A `Vec` scan beats a map here: a flush cycle touches few targets.
    state_slots: Mutex<SmallVec<[StateUpdate; 4]>>,
    /// Serializes whole flushes. Never held while the buffer lock is taken
    /// by a producer; never nested inside the buffer lock.
    flush_gate: Mutex<()>,
    event_pipe: Box<dyn EventPipe>,
    state_pipe: Box<dyn StatePipe>,
    policy: DispatchPolicy,
    next_sequence: AtomicU64,
    config: QueueConfig,
    metrics: QueueMetrics,
}

impl EventQueue {
    /// Creates a queue that drains synchronously on every enqueue.
    #[must_use]
    pub fn immediate(event_pipe: Box<dyn EventPipe>, state_pipe: Box<dyn StatePipe>) -> Self {
        Self::immediate_with_config(event_pipe, state_pipe, QueueConfig::default())
    }

    /// Creates an immediate queue with explicit configuration.
    #[must_use]
    pub fn immediate_with_config(
        event_pipe: Box<dyn EventPipe>,
        state_pipe: Box<dyn StatePipe>,
        config: QueueConfig,
    ) -> Self {
        Self::build(event_pipe, state_pipe, DispatchPolicy::Immediate, config)
    }

    /// Creates a queue that defers dispatch to the pulses of `beat`.
    ///
    /// The queue takes ownership of the beat and registers its flush as the
    /// pulse callback. The registration is revoked when the queue drops.
    #[must_use]
    pub fn batched(
        event_pipe: Box<dyn EventPipe>,
        state_pipe: Box<dyn StatePipe>,
        beat: Box<dyn EventBeat>,
    ) -> Self {
        Self::batched_with_config(event_pipe, state_pipe, beat, QueueConfig::default())
    }

    /// Creates a batched queue with explicit configuration.
    #[must_use]
    pub fn batched_with_config(
        event_pipe: Box<dyn EventPipe>,
        state_pipe: Box<dyn StatePipe>,
        beat: Box<dyn EventBeat>,
        config: QueueConfig,
    ) -> Self {
        let queue = Self::build(event_pipe, state_pipe, DispatchPolicy::Batched { beat }, config);
        let weak = Arc::downgrade(&queue.core);
        if let DispatchPolicy::Batched { beat } = &queue.core.policy {
            beat.set_pulse_callback(Arc::new(move || pulse_flush(&weak)));
        }
        queue
    }

    fn build(
        event_pipe: Box<dyn EventPipe>,
        state_pipe: Box<dyn StatePipe>,
        policy: DispatchPolicy,
        config: QueueConfig,
    ) -> Self {
        Self {
            core: Arc::new(QueueCore {
                buffer: Mutex::new(Vec::new()),
                state_slots: Mutex::new(SmallVec::new()),
                flush_gate: Mutex::new(()),
                event_pipe,
                state_pipe,
                policy,
                next_sequence: AtomicU64::new(1),
                config,
                metrics: QueueMetrics::default(),
            }),
        }
    }

    /// Accepts an event, stamping its arrival sequence.
    ///
    /// Never fails and, under the batched policy, never blocks on consumer
    /// work. Under the immediate policy this drains the buffer before
    /// returning; a delivery failure there is logged and counted rather
    /// than surfaced, since enqueue has no failure channel.
    pub fn enqueue(&self, mut event: Event) {
        let depth = {
            let mut buffer = self.core.buffer.lock();
            // Stamped under the buffer lock so sequence order is buffer order.
            event.sequence = self.core.next_sequence.fetch_add(1, Ordering::Relaxed);
            buffer.push(event);
            buffer.len()
        };
        self.core.metrics.events_enqueued.fetch_add(1, Ordering::Relaxed);
        if depth == self.core.config.depth_warning {
            tracing::warn!(
                "event buffer reached {} entries; consumer may be starved",
                depth
            );
        }
        self.core.on_enqueue();
    }

    /// Installs a pending state update for the update's target.
    ///
    /// At most one update per target is pending per flush cycle; a newer
    /// update replaces an older one for the same target (latest-wins).
    /// Updates are delivered after all events of the batch they join.
    pub fn enqueue_state_update(&self, update: StateUpdate) {
        {
            let mut slots = self.core.state_slots.lock();
            if let Some(slot) = slots.iter_mut().find(|s| s.target == update.target) {
                *slot = update;
            } else {
                slots.push(update);
            }
        }
        self.core.on_enqueue();
    }

    /// Synchronously drains the current batch.
    ///
    /// Takes the flush gate (blocking until any in-flight flush finishes),
    /// atomically detaches the buffered events and pending state slots, and
    /// delivers them in order. Events enqueued while delivery runs land in
    /// the next batch. An empty flush is a safe no-op.
    ///
    /// Must not be called from inside a pipe delivery; re-entering
    /// `enqueue` from a pipe is supported, re-entering `flush` is not.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] when a pipe rejects a delivery. The batch
    /// fails fast: already-delivered events stay delivered, the remainder
    /// is dropped and counted, and a later flush proceeds normally.
    pub fn flush(&self) -> Result<(), QueueError> {
        self.core.flush()
    }

    /// Returns the number of events awaiting the next flush.
    #[must_use]
    pub fn buffered_count(&self) -> usize {
        self.core.buffer.lock().len()
    }

    /// Returns `true` if any event or state update awaits the next flush.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.core.has_pending()
    }

    /// Returns the queue metrics.
    #[must_use]
    pub fn metrics(&self) -> &QueueMetrics {
        &self.core.metrics
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        // Revoke the pulse registration before the beat is released so no
        // new pulse fires into the dying queue. An in-flight pulse holds
        // its own strong reference to the core until its flush completes.
        if let DispatchPolicy::Batched { beat } = &self.core.policy {
            beat.clear_pulse_callback();
        }
    }
}

/// Beat pulse callback: flush through the non-owning handle.
fn pulse_flush(core: &Weak<QueueCore>) {
    if let Some(core) = core.upgrade() {
        if let Err(error) = core.flush() {
            // The beat context has no caller to hand the error to.
            tracing::warn!("beat-driven flush failed: {}", error);
        }
    }
}

impl QueueCore {
    /// Enqueue hook: the single point where the dispatch policy acts.
    fn on_enqueue(&self) {
        match &self.policy {
            DispatchPolicy::Immediate => self.drain_eager(),
            DispatchPolicy::Batched { beat } => beat.request(),
        }
    }

    fn has_pending(&self) -> bool {
        !self.buffer.lock().is_empty() || !self.state_slots.lock().is_empty()
    }

    fn flush(&self) -> Result<(), QueueError> {
        let _gate = self.flush_gate.lock();
        self.flush_batch()
    }

    /// Immediate-policy drain: flush until nothing is pending.
    ///
    /// Uses `try_lock` so a re-entrant enqueue (consumer producing an event
    /// from inside a pipe call) returns instead of deadlocking; the gate
    /// holder's loop picks the new event up. The recheck after releasing
    /// the gate closes the window where a producer enqueues, sees the gate
    /// held, and bails just as the holder finishes.
    fn drain_eager(&self) {
        loop {
            {
                let Some(_gate) = self.flush_gate.try_lock() else {
                    return;
                };
                while self.has_pending() {
                    if let Err(error) = self.flush_batch() {
                        tracing::warn!("immediate flush failed: {}", error);
                        return;
                    }
                }
            }
            if !self.has_pending() {
                return;
            }
        }
    }

    /// Takes one batch and delivers it. The flush gate must be held.
    #[allow(clippy::cast_possible_truncation)]
    fn flush_batch(&self) -> Result<(), QueueError> {
        // Take-ownership step: concurrent enqueues land in the fresh
        // buffer and belong to the next batch.
        let batch = std::mem::take(&mut *self.buffer.lock());
        let updates = std::mem::take(&mut *self.state_slots.lock());

        if batch.is_empty() && updates.is_empty() {
            self.metrics.empty_flushes.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        self.metrics.flushes.fetch_add(1, Ordering::Relaxed);

        let total = batch.len() as u64;
        let mut delivered = 0u64;
        for event in batch {
            match self.event_pipe.deliver(event) {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.events_delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(error) => {
                    // Fail fast: the rest of the taken batch and this
                    // cycle's state slots are dropped, not re-queued.
                    let dropped = total - delivered;
                    self.metrics.events_dropped.fetch_add(dropped, Ordering::Relaxed);
                    self.metrics
                        .state_updates_dropped
                        .fetch_add(updates.len() as u64, Ordering::Relaxed);
                    tracing::warn!("event delivery failed, dropping {} of batch: {}", dropped, error);
                    return Err(QueueError::EventDelivery(error));
                }
            }
        }

        let total_updates = updates.len() as u64;
        let mut updates_delivered = 0u64;
        for update in updates {
            match self.state_pipe.deliver(update) {
                Ok(()) => {
                    updates_delivered += 1;
                    self.metrics
                        .state_updates_delivered
                        .fetch_add(1, Ordering::Relaxed);
                }
                Err(error) => {
                    let dropped = total_updates - updates_delivered;
                    self.metrics
                        .state_updates_dropped
                        .fetch_add(dropped, Ordering::Relaxed);
                    tracing::warn!("state delivery failed, dropping {} updates: {}", dropped, error);
                    return Err(QueueError::StateDelivery(error));
                }
            }
        }

        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
