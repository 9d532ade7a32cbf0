//! Event beat — an armable, one-shot-per-arm readiness signal.
//!
//! A beat models "notify me once, on the next opportunity", decoupling the
//! queue from whatever generates readiness pulses (display refresh callback,
//! run-loop idle, timer).
//!
//! # Contract
//!
//! - [`EventBeat::request`] arms the beat. Arming is idempotent per pulse
//!   cycle: any number of `request()` calls before the next pulse result in
//!   exactly one pulse.
//! - The beat unarms *before* invoking the registered callback, so a
//!   `request()` issued from inside the callback arms a fresh pulse.
//! - The pulse may fire on a different execution context than the one that
//!   called `request()`. All queue state crossing that boundary goes through
//!   the flush's single guarded take-ownership step.
//!
//! # Implementations
//!
//! - [`ManualEventBeat`] — externally driven; the platform layer calls
//!   [`pulse`](ManualEventBeat::pulse) on its own schedule.
//! - [`AsyncEventBeat`] — self-driven; a tokio task turns each arm into a
//!   pulse on the runtime's schedule.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// EventBeat
// ---------------------------------------------------------------------------

/// Zero-argument callback invoked once per pulse.
///
/// `Arc` so a pulse can invoke it without holding the registration lock.
pub type PulseCallback = Arc<dyn Fn() + Send + Sync>;

/// An armable, one-shot-per-arm synchronization trigger.
pub trait EventBeat: Send + Sync {
    /// Arms the beat: ensures exactly one future pulse will occur.
    ///
    /// Idempotent while armed; at most one pending pulse exists at a time.
    fn request(&self);

    /// Registers the callback invoked on each pulse, replacing any previous
    /// registration.
    fn set_pulse_callback(&self, callback: PulseCallback);

    /// Revokes the callback registration.
    ///
    /// Subsequent pulses are inert. A pulse already in flight on another
    /// context may still complete with the old callback; owners that need a
    /// hard lifetime bound hold the callback's captures weakly.
    fn clear_pulse_callback(&self);

    /// Returns `true` if a pulse is pending.
    fn is_armed(&self) -> bool;
}

// ---------------------------------------------------------------------------
// ManualEventBeat
// ---------------------------------------------------------------------------

/// Shared state behind [`ManualEventBeat`] clones.
struct ManualBeatInner {
    armed: AtomicBool,
    callback: Mutex<Option<PulseCallback>>,
    pulses: AtomicU64,
}

/// An externally driven beat.
///
/// The platform layer (a display-refresh hook, a run-loop observer, a test)
/// calls [`pulse`](Self::pulse) on its own schedule; the pulse only reaches
/// the callback if the beat is armed.
///
/// Clones share armed state and callback registration: hand one clone to
/// the queue and drive pulses from the other.
#[derive(Clone)]
pub struct ManualEventBeat {
    inner: Arc<ManualBeatInner>,
}

impl ManualEventBeat {
    /// Creates an unarmed beat with no callback registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManualBeatInner {
                armed: AtomicBool::new(false),
                callback: Mutex::new(None),
                pulses: AtomicU64::new(0),
            }),
        }
    }

    /// Fires a pulse if the beat is armed.
    ///
    /// Unarms first, then invokes the callback, so a `request()` from
    /// inside the callback arms a fresh pulse. Returns `true` if a callback
    /// ran. An unarmed pulse is a no-op.
    pub fn pulse(&self) -> bool {
        if !self.inner.armed.swap(false, Ordering::AcqRel) {
            return false;
        }
        let callback = self.inner.callback.lock().clone();
        match callback {
            Some(callback) => {
                self.inner.pulses.fetch_add(1, Ordering::Relaxed);
                callback();
                true
            }
            None => false,
        }
    }

    /// Returns the number of pulses that reached a callback.
    #[must_use]
    pub fn pulse_count(&self) -> u64 {
        self.inner.pulses.load(Ordering::Relaxed)
    }
}

impl Default for ManualEventBeat {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBeat for ManualEventBeat {
    fn request(&self) {
        self.inner.armed.store(true, Ordering::Release);
    }

    fn set_pulse_callback(&self, callback: PulseCallback) {
        *self.inner.callback.lock() = Some(callback);
    }

    fn clear_pulse_callback(&self) {
        *self.inner.callback.lock() = None;
    }

    fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// AsyncEventBeat
// ---------------------------------------------------------------------------

/// Shared state between [`AsyncEventBeat`] and its runner task.
struct AsyncBeatShared {
    armed: AtomicBool,
    wakeup: tokio::sync::Notify,
    callback: Mutex<Option<PulseCallback>>,
}

/// A self-driven beat backed by a tokio task.
///
/// `request()` wakes the runner task, which unarms and invokes the callback
/// on the runtime's schedule. Must be created from within a tokio runtime.
///
/// Dropping the beat shuts the runner down; no pulse fires after drop
/// completes.
pub struct AsyncEventBeat {
    shared: Arc<AsyncBeatShared>,
    shutdown: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl AsyncEventBeat {
    /// Creates the beat and spawns its runner task.
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new(AsyncBeatShared {
            armed: AtomicBool::new(false),
            wakeup: tokio::sync::Notify::new(),
            callback: Mutex::new(None),
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(beat_runner(Arc::clone(&shared), shutdown_rx));
        Self {
            shared,
            shutdown,
            task: Some(task),
        }
    }
}

impl Default for AsyncEventBeat {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBeat for AsyncEventBeat {
    fn request(&self) {
        // Only the unarmed -> armed transition wakes the runner; while
        // armed, further requests are absorbed.
        if !self.shared.armed.swap(true, Ordering::AcqRel) {
            self.shared.wakeup.notify_one();
        }
    }

    fn set_pulse_callback(&self, callback: PulseCallback) {
        *self.shared.callback.lock() = Some(callback);
    }

    fn clear_pulse_callback(&self) {
        *self.shared.callback.lock() = None;
    }

    fn is_armed(&self) -> bool {
        self.shared.armed.load(Ordering::Acquire)
    }
}

impl Drop for AsyncEventBeat {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        // Abort as a safety net; the runner also exits on the watch signal.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Runner task: turns each arm into exactly one pulse.
async fn beat_runner(shared: Arc<AsyncBeatShared>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            () = shared.wakeup.notified() => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }
        // Unarm before invoking so a request() from inside the callback
        // arms a fresh pulse.
        if shared.armed.swap(false, Ordering::AcqRel) {
            let callback = shared.callback.lock().clone();
            if let Some(callback) = callback {
                callback();
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use super::*;

    fn counting_callback() -> (PulseCallback, Arc<AtomicU64>) {
        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);
        let callback: PulseCallback = Arc::new(move || {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });
        (callback, count)
    }

    // -- ManualEventBeat --

    #[test]
    fn test_manual_beat_unarmed_pulse_is_noop() {
        let beat = ManualEventBeat::new();
        let (callback, count) = counting_callback();
        beat.set_pulse_callback(callback);

        assert!(!beat.pulse());
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_manual_beat_idempotent_arming() {
        let beat = ManualEventBeat::new();
        let (callback, count) = counting_callback();
        beat.set_pulse_callback(callback);

        for _ in 0..5 {
            beat.request();
        }
        assert!(beat.is_armed());

        // Five requests, one pulse.
        assert!(beat.pulse());
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert!(!beat.is_armed());

        // Unarmed again until the next request.
        assert!(!beat.pulse());
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_manual_beat_rearm_from_callback() {
        let beat = ManualEventBeat::new();
        let driver = beat.clone();
        let (callback, count) = {
            let count = Arc::new(AtomicU64::new(0));
            let count_clone = Arc::clone(&count);
            let rearm = beat.clone();
            let callback: PulseCallback = Arc::new(move || {
                if count_clone.fetch_add(1, Ordering::Relaxed) == 0 {
                    rearm.request();
                }
            });
            (callback, count)
        };
        beat.set_pulse_callback(callback);

        driver.request();
        assert!(driver.pulse());
        // The callback re-armed during the first pulse.
        assert!(driver.is_armed());
        assert!(driver.pulse());
        assert_eq!(count.load(Ordering::Relaxed), 2);

        driver.clear_pulse_callback();
    }

    #[test]
    fn test_manual_beat_cleared_callback_is_inert() {
        let beat = ManualEventBeat::new();
        let (callback, count) = counting_callback();
        beat.set_pulse_callback(callback);
        beat.clear_pulse_callback();

        beat.request();
        assert!(!beat.pulse());
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_manual_beat_clones_share_state() {
        let beat = ManualEventBeat::new();
        let driver = beat.clone();
        let (callback, count) = counting_callback();
        beat.set_pulse_callback(callback);

        beat.request();
        assert!(driver.is_armed());
        assert!(driver.pulse());
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(beat.pulse_count(), 1);
    }

    // -- AsyncEventBeat --
    //
    // These run on the default current-thread test runtime: the runner task
    // cannot execute between plain (non-await) statements, which makes the
    // request-coalescing assertions deterministic.

    #[tokio::test]
    async fn test_async_beat_pulses_once_per_arm() {
        let beat = AsyncEventBeat::new();
        let (callback, count) = counting_callback();
        beat.set_pulse_callback(callback);

        for _ in 0..5 {
            beat.request();
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert!(!beat.is_armed());
    }

    #[tokio::test]
    async fn test_async_beat_rearms_after_pulse() {
        let beat = AsyncEventBeat::new();
        let (callback, count) = counting_callback();
        beat.set_pulse_callback(callback);

        beat.request();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        beat.request();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_async_beat_request_without_callback() {
        let beat = AsyncEventBeat::new();
        beat.request();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        // Arm consumed, nothing to invoke, no panic.
        assert!(!beat.is_armed());
    }

    #[tokio::test]
    async fn test_async_beat_drop_stops_runner() {
        let beat = AsyncEventBeat::new();
        let (callback, count) = counting_callback();
        beat.set_pulse_callback(callback);

        beat.request();
        drop(beat);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // The armed pulse may or may not have landed before shutdown, but
        // nothing fires afterwards.
        let settled = count.load(Ordering::Relaxed);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::Relaxed), settled);
    }
}
