//! Fan-out of one input sequence to a fixed pool of worker threads.
//!
//! One reader thread drives the source (the only thread that ever pulls
//! it), tags every element with a strictly increasing sequence index and
//! pushes it onto a bounded work queue. Each worker repeatedly dequeues an
//! element, applies the [`Task`] and forwards the outcome on the results
//! channel.
//!
//! A full work queue blocks the reader, which is the back-pressure that
//! bounds memory in unordered mode. The queue itself does not preserve
//! order; only the sequence index does.

use super::task::{Task, Yielded};
use crate::{
    cancel::CancelToken,
    error::Failure,
    seq::{Flow, Sequence},
    stats::{Stats, ThreadGuard},
};
use crossbeam_channel::{self as channel, Receiver, Sender};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// An element on its way to a worker.
pub(crate) struct WorkItem<T> {
    pub(crate) index: u64,
    pub(crate) value: T,
}

/// A worker's report to the consuming thread.
pub(crate) enum Message<U, E> {
    /// One output, forwarded as soon as it was produced (unordered mode).
    Item(U),
    /// Everything the element at `index` produced (ordered modes).
    Done { index: u64, output: Yielded<U> },
    /// The task failed on the element at `index`.
    Failed { index: u64, failure: Failure<E> },
}

/// Admission gate for chunked reordering.
///
/// Holds `size` permits. The reader takes one per admitted element and the
/// consumer returns a whole window's worth once that window has been
/// emitted, so at most `size` elements are ever between the reader and the
/// consumer.
pub(crate) struct ChunkGate {
    permits: Receiver<()>,
    refill: Sender<()>,
    size: usize,
}

impl ChunkGate {
    pub(crate) fn new(size: usize) -> Self {
        let (refill, permits) = channel::bounded(size);
        for _ in 0..size {
            // Cannot fail: the channel has exactly `size` free slots.
            let _ = refill.try_send(());
        }
        Self {
            permits,
            refill,
            size,
        }
    }

    pub(crate) const fn size(&self) -> usize {
        self.size
    }

    /// Takes one permit, blocking until a window is released. Returns
    /// `false` if the call was cancelled meanwhile.
    pub(crate) fn acquire(&self, cancel: &CancelToken) -> bool {
        cancel.recv(&self.permits).is_ok()
    }

    /// Returns `count` permits.
    pub(crate) fn release(&self, count: usize) {
        for _ in 0..count {
            let _ = self.refill.try_send(());
        }
    }
}

/// Drives `source` on the reader thread until it is exhausted, the call is
/// cancelled, or every worker is gone.
///
/// Returns the number of elements admitted.
pub(crate) fn read_source<S>(
    source: S,
    queue: Sender<WorkItem<S::Item>>,
    gate: Option<&ChunkGate>,
    cancel: &CancelToken,
    stats: Option<&Stats>,
) -> u64
where
    S: Sequence,
{
    let _guard = ThreadGuard::enter(stats);
    let mut next_index = 0_u64;

    let _ = source.produce(|value| {
        if cancel.is_cancelled() {
            return Flow::Stop;
        }
        if let Some(gate) = gate {
            if !gate.acquire(cancel) {
                return Flow::Stop;
            }
        }

        let item = WorkItem {
            index: next_index,
            value,
        };
        match cancel.send(&queue, item) {
            Ok(()) => {
                next_index += 1;
                if let Some(stats) = stats {
                    stats.record_dispatched();
                }
                Flow::Continue
            }
            Err(_) => Flow::Stop,
        }
    });

    #[cfg(feature = "tracing")]
    tracing::trace!("Reader stopped after admitting {next_index} elements");

    next_index
}

/// Worker loop: dequeue, apply, report, until the queue is drained or the
/// call is cancelled.
///
/// With `streaming` set (unordered mode) every output is sent the moment the
/// task produces it. Otherwise the element's outputs are gathered and sent
/// in one [`Message::Done`], so the consumer can put them back in order.
///
/// A task already running is always allowed to finish; cancellation only
/// keeps the worker from taking new elements.
pub(crate) fn work<T, K>(
    _worker_id: usize,
    task: &K,
    queue: Receiver<WorkItem<T>>,
    results: Sender<Message<K::Output, K::Error>>,
    streaming: bool,
    cancel: &CancelToken,
    stats: Option<&Stats>,
) where
    K: Task<T>,
{
    let _guard = ThreadGuard::enter(stats);

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} started");

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let Ok(WorkItem { index, value }) = cancel.recv(&queue) else {
            break;
        };

        let message = if streaming {
            let mut disconnected = false;
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                // Sent even after a cancel; the consumer decides what to keep.
                task.apply(value, |out| {
                    if results.send(Message::Item(out)).is_err() {
                        disconnected = true;
                        return Flow::Stop;
                    }
                    Flow::Continue
                })
            }));
            if disconnected {
                break;
            }
            match outcome {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(Message::Failed {
                    index,
                    failure: Failure::Task(e),
                }),
                Err(payload) => Some(Message::Failed {
                    index,
                    failure: Failure::Panic(payload),
                }),
            }
        } else {
            let mut output = Yielded::Empty;
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                task.apply(value, |out| {
                    output.push(out);
                    Flow::Continue
                })
            }));
            Some(match outcome {
                Ok(Ok(_)) => Message::Done { index, output },
                Ok(Err(e)) => Message::Failed {
                    index,
                    failure: Failure::Task(e),
                },
                Err(payload) => Message::Failed {
                    index,
                    failure: Failure::Panic(payload),
                },
            })
        };

        if let Some(stats) = stats {
            stats.record_completed();
        }

        if let Some(message) = message {
            #[cfg(feature = "tracing")]
            {
                if matches!(message, Message::Failed { .. }) {
                    tracing::warn!("Worker {_worker_id} failed on element {index}");
                }
            }

            // Plain send: the consumer keeps draining after a failure, so
            // in-hand results are delivered even once admission has stopped.
            if results.send(message).is_err() {
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} stopped");
}
