//! Drives one parallel call from start to join.
//!
//! Every thread of a call is scoped to [`execute`]: the reader, the workers
//! and the channels between them are created when it starts and are gone
//! when it returns, whether the source ran out, the consumer stopped, the
//! token was cancelled or a task failed.

use super::{
    dispatch::{self, ChunkGate, Message},
    ordering::Reorder,
    task::Task,
};
use crate::{
    cancel::{CancelOnDrop, CancelToken, Interrupted},
    config::{Mode, ParallelConfig, Settings},
    error::Failure,
    seq::{Flow, Sequence},
    stats::Stats,
};
use crossbeam_channel::{self as channel, Receiver};
use std::{panic::resume_unwind, thread};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// How a call ended.
pub(crate) enum Outcome<E> {
    /// Every element was processed and emitted.
    Exhausted,
    /// The consumer asked to stop.
    Stopped,
    /// The token was cancelled or its deadline passed.
    Cancelled,
    /// A task failed; `index` is the lowest failing element observed.
    /// `stopped` is set when the consumer asked to stop while the completed
    /// prefix was being delivered.
    Failed {
        index: u64,
        failure: Failure<E>,
        stopped: bool,
    },
}

/// The caller's consumer, as seen by the consuming loop.
struct Sink<'a, C> {
    consumer: C,
    cancel: &'a CancelToken,
    stats: Option<&'a Stats>,
    draining: bool,
    stopped: bool,
}

impl<C> Sink<'_, C> {
    fn emit<U>(&mut self, value: U) -> Flow
    where
        C: FnMut(U) -> Flow,
    {
        // After a failure the token is cancelled on purpose, yet everything
        // that precedes the failure is still delivered.
        if !self.draining && self.cancel.is_cancelled() {
            return Flow::Stop;
        }
        if let Some(stats) = self.stats {
            stats.record_emitted();
        }
        let flow = (self.consumer)(value);
        if flow.is_stop() {
            self.stopped = true;
        }
        flow
    }
}

/// Runs `task` over `source` on a pool of worker threads, handing outputs to
/// `consumer` on the calling thread.
///
/// Returns once every engine thread has been joined. A panic in the source
/// is re-raised here; task failures are returned as [`Outcome::Failed`].
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
pub(crate) fn execute<S, K, C>(
    source: S,
    task: &K,
    config: &ParallelConfig,
    consumer: C,
) -> Outcome<K::Error>
where
    S: Sequence + Send,
    S::Item: Send,
    K: Task<S::Item>,
    C: FnMut(K::Output) -> Flow,
{
    let Settings {
        concurrency,
        buffer_size,
        mode,
        cancel,
        stats,
        ..
    } = config.resolve();
    let stats = stats.as_deref();

    #[cfg(feature = "tracing")]
    tracing::debug!(concurrency, buffer_size, ?mode, "Starting parallel call");

    let (work_tx, work_rx) = channel::bounded(buffer_size);
    let (result_tx, result_rx) = channel::bounded(buffer_size);
    let gate = match mode {
        Mode::Chunked(size) => Some(ChunkGate::new(size)),
        Mode::Unordered | Mode::Ordered => None,
    };
    let streaming = mode == Mode::Unordered;

    let (outcome, reader) = thread::scope(|s| {
        // Cancels on every exit path, unwinding included, so no engine
        // thread stays parked once the consumer is gone.
        let _guard = CancelOnDrop(&cancel);
        let cancel = &cancel;
        let gate = gate.as_ref();

        for id in 0..concurrency {
            let queue = work_rx.clone();
            let results = result_tx.clone();
            thread::Builder::new()
                .name(format!("sequin-worker-{id}"))
                .spawn_scoped(s, move || {
                    dispatch::work(id, task, queue, results, streaming, cancel, stats);
                })
                .expect("failed to spawn worker thread");
        }
        drop(work_rx);
        drop(result_tx);

        let reader = thread::Builder::new()
            .name(String::from("sequin-reader"))
            .spawn_scoped(s, move || {
                dispatch::read_source(source, work_tx, gate, cancel, stats)
            })
            .expect("failed to spawn reader thread");

        let sink = Sink {
            consumer,
            cancel,
            stats,
            draining: false,
            stopped: false,
        };
        let outcome = consume(result_rx, Reorder::new(mode), gate, sink);
        if !matches!(outcome, Outcome::Exhausted) {
            cancel.cancel();
        }
        (outcome, reader.join())
    });

    match reader {
        Ok(_admitted) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(admitted = _admitted, "Parallel call finished");
        }
        Err(payload) => resume_unwind(payload),
    }
    outcome
}

/// The consuming loop, run on the calling thread.
///
/// Takes `results` by value: dropping it on return unblocks every worker
/// still trying to report.
fn consume<U, E, C>(
    results: Receiver<Message<U, E>>,
    mut reorder: Reorder<U>,
    gate: Option<&ChunkGate>,
    mut sink: Sink<'_, C>,
) -> Outcome<E>
where
    C: FnMut(U) -> Flow,
{
    let mut failed: Option<(u64, Failure<E>)> = None;

    loop {
        let message = if sink.draining {
            // Workers finish the element in hand, so this ends promptly.
            match results.recv() {
                Ok(message) => message,
                Err(_) => break,
            }
        } else {
            match sink.cancel.recv(&results) {
                Ok(message) => message,
                Err(Interrupted::Disconnected) => break,
                Err(Interrupted::Cancelled) => return Outcome::Cancelled,
            }
        };

        let flow = match message {
            Message::Item(value) => sink.emit(value),
            Message::Done { index, output } => {
                let flow = reorder.accept(index, output, gate, &mut |v| sink.emit(v));
                if let Some(stats) = sink.stats {
                    stats.record_pending(reorder.pending());
                }
                flow
            }
            Message::Failed { index, failure } => {
                if failed.as_ref().is_none_or(|(lowest, _)| index < *lowest) {
                    failed = Some((index, failure));
                }
                sink.cancel.cancel();
                sink.draining = true;
                Flow::Continue
            }
        };

        if flow.is_stop() {
            return match failed {
                Some((index, failure)) if sink.stopped => Outcome::Failed {
                    index,
                    failure,
                    stopped: true,
                },
                _ if sink.stopped => Outcome::Stopped,
                _ => Outcome::Cancelled,
            };
        }
    }

    let limit = failed.as_ref().map(|(index, _)| *index);
    let flow = reorder.flush(limit, &mut |v| sink.emit(v));
    match failed {
        Some((index, failure)) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(index, "Parallel call failed");
            Outcome::Failed {
                index,
                failure,
                stopped: sink.stopped,
            }
        }
        None if sink.stopped => Outcome::Stopped,
        None if flow.is_stop() => Outcome::Cancelled,
        None => Outcome::Exhausted,
    }
}
