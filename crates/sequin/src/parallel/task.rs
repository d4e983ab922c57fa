//! Units of work applied by the worker pool.
//!
//! Every parallel operation is a [`Task`]: something that turns one input
//! element into zero or more outputs. Workers share a task by reference, so
//! it must be [`Sync`], and it is invoked concurrently from every worker
//! without any serialization.

use crate::seq::{Flow, Sequence};
use core::convert::Infallible;

/// Work applied to each element by the worker pool.
///
/// `apply` hands each output to `emit` and forwards the flow it returns. In
/// unordered mode `emit` sends the output downstream immediately; in ordered
/// modes it buffers the output until the element's turn comes.
///
/// # Example
///
/// ```
/// use sequin::{Flow, ParallelConfig, Task, prelude::*};
///
/// /// Emits every element `times` times.
/// struct Repeat {
///     times: usize,
/// }
///
/// impl Task<u32> for Repeat {
///     type Output = u32;
///     type Error = core::convert::Infallible;
///
///     fn apply<F>(&self, item: u32, mut emit: F) -> Result<Flow, Self::Error>
///     where
///         F: FnMut(u32) -> Flow,
///     {
///         for _ in 0..self.times {
///             if emit(item).is_stop() {
///                 return Ok(Flow::Stop);
///             }
///         }
///         Ok(Flow::Continue)
///     }
/// }
///
/// let out = sequin::iter(1..=3)
///     .par_task(ParallelConfig::from(2), Repeat { times: 2 })
///     .to_vec();
/// assert_eq!(out, [1, 1, 2, 2, 3, 3]);
/// ```
pub trait Task<T>: Sync {
    /// Values produced per element.
    type Output: Send;
    /// Failure reported by the task.
    type Error: Send;

    /// Processes one element, handing every output to `emit`.
    ///
    /// # Errors
    ///
    /// Returns the task's error, which fails the whole call.
    fn apply<F>(&self, item: T, emit: F) -> Result<Flow, Self::Error>
    where
        F: FnMut(Self::Output) -> Flow;
}

/// `T -> U`.
#[derive(Clone, Debug)]
pub struct MapTask<F>(pub F);

impl<T, U, F> Task<T> for MapTask<F>
where
    F: Fn(T) -> U + Sync,
    U: Send,
{
    type Output = U;
    type Error = Infallible;

    fn apply<E>(&self, item: T, mut emit: E) -> Result<Flow, Infallible>
    where
        E: FnMut(U) -> Flow,
    {
        Ok(emit((self.0)(item)))
    }
}

/// `T -> Result<U, E>`.
#[derive(Clone, Debug)]
pub struct TryMapTask<F>(pub F);

impl<T, U, E, F> Task<T> for TryMapTask<F>
where
    F: Fn(T) -> Result<U, E> + Sync,
    U: Send,
    E: Send,
{
    type Output = U;
    type Error = E;

    fn apply<C>(&self, item: T, mut emit: C) -> Result<Flow, E>
    where
        C: FnMut(U) -> Flow,
    {
        let value = (self.0)(item)?;
        Ok(emit(value))
    }
}

/// Keeps elements matching a predicate.
#[derive(Clone, Debug)]
pub struct FilterTask<P>(pub P);

impl<T, P> Task<T> for FilterTask<P>
where
    P: Fn(&T) -> bool + Sync,
    T: Send,
{
    type Output = T;
    type Error = Infallible;

    fn apply<E>(&self, item: T, mut emit: E) -> Result<Flow, Infallible>
    where
        E: FnMut(T) -> Flow,
    {
        if (self.0)(&item) {
            Ok(emit(item))
        } else {
            Ok(Flow::Continue)
        }
    }
}

/// Expands each element into a nested sequence.
///
/// The nested sequence is drained on the worker. A panic while draining it
/// fails the whole call, like any other task failure.
#[derive(Clone, Debug)]
pub struct FlatMapTask<F>(pub F);

impl<T, S, F> Task<T> for FlatMapTask<F>
where
    F: Fn(T) -> S + Sync,
    S: Sequence,
    S::Item: Send,
{
    type Output = S::Item;
    type Error = Infallible;

    fn apply<E>(&self, item: T, emit: E) -> Result<Flow, Infallible>
    where
        E: FnMut(S::Item) -> Flow,
    {
        Ok((self.0)(item).produce(emit))
    }
}

/// Runs an action for its side effects.
#[derive(Clone, Debug)]
pub struct ForEachTask<F>(pub F);

impl<T, F> Task<T> for ForEachTask<F>
where
    F: Fn(T) + Sync,
{
    type Output = ();
    type Error = Infallible;

    fn apply<E>(&self, item: T, _emit: E) -> Result<Flow, Infallible>
    where
        E: FnMut(()) -> Flow,
    {
        (self.0)(item);
        Ok(Flow::Continue)
    }
}

/// Runs a fallible action for its side effects.
#[derive(Clone, Debug)]
pub struct TryForEachTask<F>(pub F);

impl<T, E, F> Task<T> for TryForEachTask<F>
where
    F: Fn(T) -> Result<(), E> + Sync,
    E: Send,
{
    type Output = ();
    type Error = E;

    fn apply<C>(&self, item: T, _emit: C) -> Result<Flow, E>
    where
        C: FnMut(()) -> Flow,
    {
        (self.0)(item)?;
        Ok(Flow::Continue)
    }
}

/// Folds a batch of elements into one partial result.
#[derive(Clone, Debug)]
pub struct FoldTask<I, Op> {
    identity: I,
    op: Op,
}

impl<I, Op> FoldTask<I, Op> {
    /// Folds each batch with `op`, starting from `identity()`.
    pub const fn new(identity: I, op: Op) -> Self {
        Self { identity, op }
    }
}

impl<T, I, Op> Task<Vec<T>> for FoldTask<I, Op>
where
    I: Fn() -> T + Sync,
    Op: Fn(T, T) -> T + Sync,
    T: Send,
{
    type Output = T;
    type Error = Infallible;

    fn apply<E>(&self, batch: Vec<T>, mut emit: E) -> Result<Flow, Infallible>
    where
        E: FnMut(T) -> Flow,
    {
        let partial = batch.into_iter().fold((self.identity)(), &self.op);
        Ok(emit(partial))
    }
}

/// Passes elements through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityTask;

impl<T: Send> Task<T> for IdentityTask {
    type Output = T;
    type Error = Infallible;

    fn apply<E>(&self, item: T, mut emit: E) -> Result<Flow, Infallible>
    where
        E: FnMut(T) -> Flow,
    {
        Ok(emit(item))
    }
}

/// Everything one element produced, held until its turn in ordered modes.
///
/// Most tasks produce exactly zero or one value per element, which this
/// stores without allocating.
#[derive(Debug)]
pub(crate) enum Yielded<U> {
    Empty,
    One(U),
    Many(Vec<U>),
}

impl<U> Default for Yielded<U> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<U> Yielded<U> {
    pub(crate) fn push(&mut self, value: U) {
        *self = match core::mem::take(self) {
            Self::Empty => Self::One(value),
            Self::One(first) => Self::Many(vec![first, value]),
            Self::Many(mut values) => {
                values.push(value);
                Self::Many(values)
            }
        };
    }

    /// Hands every value to `emit`, in production order.
    pub(crate) fn drain<F>(self, emit: &mut F) -> Flow
    where
        F: FnMut(U) -> Flow,
    {
        match self {
            Self::Empty => Flow::Continue,
            Self::One(value) => emit(value),
            Self::Many(values) => {
                for value in values {
                    if emit(value).is_stop() {
                        return Flow::Stop;
                    }
                }
                Flow::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter;

    fn collect<T, K: Task<T>>(task: &K, item: T) -> Result<Vec<K::Output>, K::Error> {
        let mut out = Vec::new();
        let _ = task.apply(item, |v| {
            out.push(v);
            Flow::Continue
        })?;
        Ok(out)
    }

    #[test]
    fn tasks_emit_expected_outputs() {
        assert_eq!(collect(&MapTask(|x: u32| x * 2), 4).unwrap(), [8]);
        assert_eq!(collect(&FilterTask(|x: &u32| *x > 3), 2).unwrap(), Vec::<u32>::new());
        assert_eq!(collect(&FilterTask(|x: &u32| *x > 3), 5).unwrap(), [5]);
        assert_eq!(
            collect(&FlatMapTask(|x: u32| iter(0..x)), 3).unwrap(),
            [0, 1, 2]
        );
        assert_eq!(
            collect(&FoldTask::new(|| 0, |a: i32, b: i32| a + b), vec![1, 2, 3]).unwrap(),
            [6]
        );
        assert_eq!(collect(&IdentityTask, 'x').unwrap(), ['x']);
    }

    #[test]
    fn try_tasks_propagate_errors() {
        let task = TryMapTask(|x: u32| if x == 5 { Err("five") } else { Ok(x) });
        assert_eq!(collect(&task, 4), Ok(vec![4]));
        assert_eq!(collect(&task, 5), Err("five"));

        let task = TryForEachTask(|x: u32| if x == 1 { Err(x) } else { Ok(()) });
        assert_eq!(collect(&task, 1), Err(1));
    }

    #[test]
    fn flat_map_honors_stop() {
        let mut seen = Vec::new();
        let flow = FlatMapTask(|x: u32| iter(0..x))
            .apply(10, |v| {
                seen.push(v);
                Flow::from(v < 2)
            })
            .unwrap();
        assert!(flow.is_stop());
        assert_eq!(seen, [0, 1, 2]);
    }

    #[test]
    fn yielded_grows_and_drains_in_order() {
        let mut yielded = Yielded::default();
        let mut out = Vec::new();
        assert!(Yielded::<u8>::Empty.drain(&mut |v| {
            out.push(v);
            Flow::Continue
        }).is_continue());

        for v in 0..4 {
            yielded.push(v);
        }
        let flow = yielded.drain(&mut |v| {
            out.push(v);
            Flow::from(v < 2)
        });
        assert!(flow.is_stop());
        assert_eq!(out, [0, 1, 2]);
    }
}
