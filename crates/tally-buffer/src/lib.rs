//! Write buffer between the ingestion hot path and the event log.
//!
//! `enqueue` is synchronous and never performs I/O; `flush` drains the
//! queue in bounded batches on a timer. A failed append re-queues the
//! not-yet-confirmed remainder of the batch at the front, preserving
//! order, so delivery is at-least-once and nothing is silently dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use tally_core::{Event, EventLog};

/// Outcome of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush was already in progress; nothing was done.
    Busy,
    /// The queue was empty.
    Idle,
    /// A batch was attempted. `requeued > 0` means an append failed and
    /// the unconfirmed remainder went back to the front of the queue.
    Flushed { appended: usize, requeued: usize },
}

/// Ordered queue of events not yet confirmed appended to the log.
///
/// Entries leave the queue only after a successful append. The flush is
/// single-flight: it spans one await point per batched append, during
/// which a timer tick could otherwise start a second drain.
pub struct WriteBuffer {
    queue: Mutex<VecDeque<Event>>,
    flushing: AtomicBool,
    max_batch: usize,
}

impl WriteBuffer {
    pub fn new(max_batch: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            flushing: AtomicBool::new(false),
            max_batch: max_batch.max(1),
        }
    }

    /// Queue one event for appending. O(1), no I/O, never fails.
    pub fn enqueue(&self, event: Event) {
        self.queue.lock().push_back(event);
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Drain up to `max_batch` events from the front of the queue and
    /// append each to `log` in order.
    ///
    /// Transient failures are not surfaced to the original caller: the
    /// failed entry and everything after it in the batch are returned to
    /// the front of the queue for the next tick. Confirmed entries are
    /// gone from the queue; stable event ids keep a replayed append from
    /// inflating rebuilt counts.
    pub async fn flush(&self, log: &dyn EventLog) -> FlushOutcome {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return FlushOutcome::Busy;
        }
        let _guard = FlushGuard(&self.flushing);

        let batch: Vec<Event> = {
            let mut queue = self.queue.lock();
            let take = queue.len().min(self.max_batch);
            queue.drain(..take).collect()
        };

        if batch.is_empty() {
            return FlushOutcome::Idle;
        }

        let mut appended = 0;
        for (idx, event) in batch.iter().enumerate() {
            if let Err(error) = log.append(event).await {
                let requeued = batch.len() - idx;
                warn!(
                    appended,
                    requeued,
                    error = %error,
                    "event log append failed; re-queueing unconfirmed entries"
                );
                let mut queue = self.queue.lock();
                for event in batch[idx..].iter().rev() {
                    queue.push_front(event.clone());
                }
                return FlushOutcome::Flushed { appended, requeued };
            }
            appended += 1;
        }

        debug!(appended, "flushed event batch to log");
        FlushOutcome::Flushed {
            appended,
            requeued: 0,
        }
    }
}

struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
