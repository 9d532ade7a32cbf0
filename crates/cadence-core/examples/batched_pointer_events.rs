//! Batched dispatch of a pointer-event burst.
//!
//! Wires a batched queue to an [`AsyncEventBeat`] and feeds it a burst of
//! pointer events plus a layout state update, then lets the beat deliver
//! everything as one batch.
//!
//! Run with: cargo run --example batched_pointer_events

use bytes::Bytes;
use cadence_core::{
    event_pipe_fn, state_pipe_fn, AsyncEventBeat, Event, EventQueue, StateUpdate, TargetId,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let queue = EventQueue::batched(
        event_pipe_fn(|event| {
            println!("event #{:<3} {} on {}", event.sequence, event.kind, event.target);
            Ok(())
        }),
        state_pipe_fn(|update| {
            println!("state        {} ({} bytes)", update.target, update.payload.len());
            Ok(())
        }),
        Box::new(AsyncEventBeat::new()),
    );

    let surface = TargetId(1);

    // A burst arriving faster than the consumer would want to be called.
    queue.enqueue(Event::new("pointer-down", surface, Bytes::from_static(b"10,20")));
    for x in 11..=15 {
        let payload = Bytes::from(format!("{x},20"));
        queue.enqueue(Event::new("pointer-move", surface, payload));
    }
    queue.enqueue(Event::new("pointer-up", surface, Bytes::from_static(b"15,20")));
    queue.enqueue_state_update(StateUpdate::new(surface, Bytes::from_static(b"frame:0,0,320,240")));

    println!("buffered before pulse: {}", queue.buffered_count());

    // The beat's runner task delivers the whole burst as one batch.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let metrics = queue.metrics();
    println!(
        "delivered {} events in {} flush(es)",
        metrics.events_delivered(),
        metrics.flushes()
    );
}
