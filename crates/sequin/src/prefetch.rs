//! Bounded lookahead between a producer and its consumer.

use crate::seq::{Flow, Sequence};
use crossbeam_channel as channel;
use std::{panic::resume_unwind, thread};

/// A sequence that pulls up to `depth` elements ahead of its consumer on a
/// background thread.
///
/// Elements keep their order. When the consumer stops, the lookahead buffer
/// is dropped and the puller stops the source at its next element, so
/// nothing outlives the call. A panic in the source is re-raised on the
/// consuming thread.
///
/// Built with [`SequenceExt::prefetch`](crate::SequenceExt::prefetch).
///
/// # Example
///
/// ```
/// use sequin::prelude::*;
///
/// let out = sequin::iter(0..100).prefetch(8).take(5).to_vec();
/// assert_eq!(out, [0, 1, 2, 3, 4]);
/// ```
#[derive(Clone, Debug)]
#[must_use = "sequences are lazy and do nothing unless driven"]
pub struct Prefetch<S> {
    source: S,
    depth: usize,
}

impl<S> Prefetch<S> {
    pub(crate) fn new(source: S, depth: usize) -> Self {
        Self {
            source,
            depth: depth.max(1),
        }
    }
}

impl<S> Sequence for Prefetch<S>
where
    S: Sequence + Send,
    S::Item: Send,
{
    type Item = S::Item;

    fn produce<F>(self, mut consumer: F) -> Flow
    where
        F: FnMut(Self::Item) -> Flow,
    {
        let Self { source, depth } = self;

        let (flow, puller) = thread::scope(|s| {
            // Owned by this closure, so a panicking consumer still drops the
            // receiver and releases the puller.
            let (tx, rx) = channel::bounded(depth);

            let puller = thread::Builder::new()
                .name(String::from("sequin-prefetch"))
                .spawn_scoped(s, move || {
                    source.produce(|item| {
                        if tx.send(item).is_ok() {
                            Flow::Continue
                        } else {
                            Flow::Stop
                        }
                    })
                })
                .expect("failed to spawn prefetch thread");

            let mut flow = Flow::Continue;
            for item in &rx {
                if consumer(item).is_stop() {
                    flow = Flow::Stop;
                    break;
                }
            }
            drop(rx);

            #[cfg(feature = "tracing")]
            tracing::trace!(stopped = flow.is_stop(), "Prefetch consumer done");

            (flow, puller.join())
        });

        if let Err(payload) = puller {
            resume_unwind(payload);
        }
        flow
    }
}

#[cfg(test)]
mod tests {
    use crate::{iter, prelude::*};
    use core::time::Duration;
    use std::{
        panic::{AssertUnwindSafe, catch_unwind},
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    #[test]
    fn preserves_order() {
        for depth in [0, 1, 4, 64] {
            let out = iter(0..500).prefetch(depth).to_vec();
            assert_eq!(out, (0..500).collect::<Vec<_>>());
        }
    }

    #[test]
    fn stop_releases_the_puller() {
        let pulled = AtomicUsize::new(0);
        let source = iter(0..).map(|x: u64| {
            pulled.fetch_add(1, Ordering::Relaxed);
            x
        });

        let flow = source.prefetch(4).produce(|x| (x < 2).into());
        assert!(flow.is_stop());
        // Three consumed, at most `depth` buffered, one blocked in send.
        assert!(pulled.load(Ordering::Relaxed) <= 3 + 4 + 1);
    }

    #[test]
    fn overlaps_slow_producer_and_consumer() {
        let out = iter(0..20)
            .map(|x| {
                thread::sleep(Duration::from_millis(1));
                x
            })
            .prefetch(8)
            .map(|x| {
                thread::sleep(Duration::from_millis(1));
                x * 3
            })
            .to_vec();
        assert_eq!(out, (0..20).map(|x| x * 3).collect::<Vec<_>>());
    }

    #[test]
    fn source_panics_reach_the_consumer() {
        let source = iter(0..10).map(|x: u32| {
            assert!(x < 3, "source failed");
            x
        });
        let result = catch_unwind(AssertUnwindSafe(|| source.prefetch(2).to_vec()));
        assert!(result.is_err());
    }
}
