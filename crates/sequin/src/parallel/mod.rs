//! The parallel execution engine.
//!
//! [`ParallelExt`] turns any sendable [`Sequence`] into a pipeline where one
//! reader thread feeds a fixed pool of workers through a bounded queue, and
//! the workers' results are reconciled with input order on the calling
//! thread. Every parallel sequence is itself a [`Sequence`], so stages
//! compose and nest freely.
//!
//! ## Ordering modes
//!
//! | `ordered` | `chunk_size` | output order      | reorder memory      |
//! |-----------|--------------|-------------------|---------------------|
//! | `false`   | any          | completion order  | none                |
//! | `true`    | `0`          | input order       | grows with skew     |
//! | `true`    | `n > 0`      | input order       | at most `n` results |
//!
//! ## Failures
//!
//! A panic in user code is caught on the worker, stops admission of new
//! work, and is re-raised on the calling thread once every thread has been
//! joined. The `try_*` operations report failures as [`Error`] values
//! instead. Elements completed before the failing one are still delivered.

mod dispatch;
mod engine;
mod ordering;
mod task;

pub use task::*;

use crate::{
    config::ParallelConfig,
    error::{Error, Failure},
    seq::{Chunks, Flow, Sequence, SequenceExt},
};
use core::convert::Infallible;
use engine::Outcome;
use std::panic::resume_unwind;

/// Number of elements each worker folds per batch in
/// [`ParallelExt::par_reduce`].
pub const REDUCE_BATCH_SIZE: usize = 64;

/// A sequence whose elements are produced by applying a [`Task`] on a pool
/// of worker threads.
///
/// Built by the [`ParallelExt`] operations. Nothing runs until the sequence
/// is driven; each `produce` is one complete parallel call.
#[must_use = "sequences are lazy and do nothing unless driven"]
pub struct Parallel<S, K> {
    source: S,
    task: K,
    config: ParallelConfig,
}

/// A parallel sequence whose task can fail.
///
/// Yields `Ok` outputs and, if a task fails, one final `Err` describing the
/// first failure.
#[must_use = "sequences are lazy and do nothing unless driven"]
pub struct TryParallel<S, K> {
    source: S,
    task: K,
    config: ParallelConfig,
}

/// Returned by [`ParallelExt::par_map`].
pub type ParMap<S, F> = Parallel<S, MapTask<F>>;
/// Returned by [`ParallelExt::try_par_map`].
pub type TryParMap<S, F> = TryParallel<S, TryMapTask<F>>;
/// Returned by [`ParallelExt::par_filter`].
pub type ParFilter<S, P> = Parallel<S, FilterTask<P>>;
/// Returned by [`ParallelExt::par_flat_map`].
pub type ParFlatMap<S, F> = Parallel<S, FlatMapTask<F>>;

impl<S, K> Sequence for Parallel<S, K>
where
    S: Sequence + Send,
    S::Item: Send,
    K: Task<S::Item, Error = Infallible>,
{
    type Item = K::Output;

    fn produce<F>(self, consumer: F) -> Flow
    where
        F: FnMut(Self::Item) -> Flow,
    {
        match engine::execute(self.source, &self.task, &self.config, consumer) {
            Outcome::Exhausted | Outcome::Cancelled => Flow::Continue,
            Outcome::Stopped => Flow::Stop,
            // Raised even when the consumer stopped on the delivered prefix.
            Outcome::Failed {
                failure: Failure::Panic(payload),
                ..
            } => resume_unwind(payload),
            Outcome::Failed {
                failure: Failure::Task(never),
                ..
            } => match never {},
        }
    }
}

impl<S, K> Sequence for TryParallel<S, K>
where
    S: Sequence + Send,
    S::Item: Send,
    K: Task<S::Item>,
{
    type Item = Result<K::Output, Error<K::Error>>;

    fn produce<F>(self, mut consumer: F) -> Flow
    where
        F: FnMut(Self::Item) -> Flow,
    {
        let outcome = engine::execute(self.source, &self.task, &self.config, |value| {
            consumer(Ok(value))
        });
        match outcome {
            Outcome::Exhausted | Outcome::Cancelled => Flow::Continue,
            Outcome::Stopped => Flow::Stop,
            // The consumer is never called again after asking to stop.
            Outcome::Failed { stopped: true, .. } => Flow::Stop,
            Outcome::Failed { index, failure, .. } => consumer(Err(Error::from_failure(index, failure))),
        }
    }
}

/// Parallel operations for every sendable [`Sequence`].
///
/// Each operation takes anything convertible into a [`ParallelConfig`]; a
/// plain `usize` sets the worker count and leaves every other knob at its
/// default.
///
/// User functions run concurrently on every worker and are never
/// serialized, hence the `Sync` bounds.
///
/// # Example
///
/// ```
/// use sequin::{ParallelConfig, prelude::*};
///
/// let squares = sequin::iter(1..=5)
///     .par_map(ParallelConfig::new().with_concurrency(3), |x: u64| x * x)
///     .to_vec();
/// assert_eq!(squares, [1, 4, 9, 16, 25]);
///
/// let evens = sequin::iter(1..=10).par_filter(2, |x| x % 2 == 0).to_vec();
/// assert_eq!(evens, [2, 4, 6, 8, 10]);
///
/// let sum = sequin::iter(1..=100_u64).par_reduce(4, || 0, |a, b| a + b);
/// assert_eq!(sum, 5050);
/// ```
pub trait ParallelExt: Sequence + Sized {
    /// Runs a custom [`Task`] over every element.
    fn par_task<K>(self, config: impl Into<ParallelConfig>, task: K) -> Parallel<Self, K>
    where
        Self: Send,
        Self::Item: Send,
        K: Task<Self::Item, Error = Infallible>,
    {
        Parallel {
            source: self,
            task,
            config: config.into(),
        }
    }

    /// Runs a custom fallible [`Task`] over every element.
    fn try_par_task<K>(self, config: impl Into<ParallelConfig>, task: K) -> TryParallel<Self, K>
    where
        Self: Send,
        Self::Item: Send,
        K: Task<Self::Item>,
    {
        TryParallel {
            source: self,
            task,
            config: config.into(),
        }
    }

    /// Applies `f` to every element in parallel.
    fn par_map<U, F>(self, config: impl Into<ParallelConfig>, f: F) -> ParMap<Self, F>
    where
        Self: Send,
        Self::Item: Send,
        F: Fn(Self::Item) -> U + Sync,
        U: Send,
    {
        self.par_task(config, MapTask(f))
    }

    /// Applies a fallible `f` to every element in parallel.
    ///
    /// The output ends with a single `Err` once `f` fails or panics; the
    /// elements completed before the failing one are yielded first.
    fn try_par_map<U, E, F>(self, config: impl Into<ParallelConfig>, f: F) -> TryParMap<Self, F>
    where
        Self: Send,
        Self::Item: Send,
        F: Fn(Self::Item) -> Result<U, E> + Sync,
        U: Send,
        E: Send,
    {
        self.try_par_task(config, TryMapTask(f))
    }

    /// Keeps the elements for which `predicate` holds, evaluated in
    /// parallel.
    fn par_filter<P>(self, config: impl Into<ParallelConfig>, predicate: P) -> ParFilter<Self, P>
    where
        Self: Send,
        Self::Item: Send,
        P: Fn(&Self::Item) -> bool + Sync,
    {
        self.par_task(config, FilterTask(predicate))
    }

    /// Expands every element into a nested sequence in parallel.
    ///
    /// Unordered, nested outputs interleave freely across workers. Ordered,
    /// each nested sequence is collected in full before its turn comes, so
    /// memory grows with the size of the nested sequences in flight.
    fn par_flat_map<N, F>(self, config: impl Into<ParallelConfig>, f: F) -> ParFlatMap<Self, F>
    where
        Self: Send,
        Self::Item: Send,
        F: Fn(Self::Item) -> N + Sync,
        N: Sequence,
        N::Item: Send,
    {
        self.par_task(config, FlatMapTask(f))
    }

    /// Combines every element with the associative `op`.
    ///
    /// Workers fold batches of [`REDUCE_BATCH_SIZE`] contiguous elements
    /// starting from `identity()`, and the partial results are combined on
    /// the calling thread: in input order when ordered, in completion order
    /// otherwise. `identity()` must be neutral for `op`.
    fn par_reduce<I, Op>(self, config: impl Into<ParallelConfig>, identity: I, op: Op) -> Self::Item
    where
        Self: Send,
        Self::Item: Send,
        I: Fn() -> Self::Item + Sync,
        Op: Fn(Self::Item, Self::Item) -> Self::Item + Sync,
    {
        let partials: Parallel<Chunks<Self>, _> = Parallel {
            source: self.chunks(REDUCE_BATCH_SIZE),
            task: FoldTask::new(&identity, &op),
            config: config.into(),
        };
        partials.fold(identity(), &op)
    }

    /// Runs `action` on every element in parallel, for its side effects.
    fn par_for_each<F>(self, config: impl Into<ParallelConfig>, action: F)
    where
        Self: Send,
        Self::Item: Send,
        F: Fn(Self::Item) + Sync,
    {
        self.par_task(config, ForEachTask(action)).for_each(drop);
    }

    /// Runs a fallible `action` on every element in parallel.
    ///
    /// # Errors
    ///
    /// Returns the failure with the lowest index observed once `action`
    /// fails or panics. Elements not yet admitted are never processed.
    fn try_par_for_each<E, F>(self, config: impl Into<ParallelConfig>, action: F) -> Result<(), Error<E>>
    where
        Self: Send,
        Self::Item: Send,
        F: Fn(Self::Item) -> Result<(), E> + Sync,
        E: Send,
    {
        let mut result = Ok(());
        let _ = self
            .try_par_task(config, TryForEachTask(action))
            .produce(|outcome| match outcome {
                Ok(()) => Flow::Continue,
                Err(e) => {
                    result = Err(e);
                    Flow::Stop
                }
            });
        result
    }

    /// Gathers every element into a vector, moving them through the worker
    /// pool. The order of the result is unspecified.
    fn par_collect(self, config: impl Into<ParallelConfig>) -> Vec<Self::Item>
    where
        Self: Send,
        Self::Item: Send,
    {
        self.par_task(config.into().unordered(), IdentityTask).to_vec()
    }
}

impl<S: Sequence> ParallelExt for S {}
