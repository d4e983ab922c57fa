//! Single-pass, push-driven sequences with cooperative early termination.
//!
//! A [`Sequence`] hands each of its elements to one consumer callback. The
//! callback answers with a [`Flow`]: [`Flow::Continue`] asks for the next
//! element, [`Flow::Stop`] asks the producer to stop immediately. Producers
//! check the answer after every call and release whatever they own before
//! returning.
//!
//! Adapters such as [`SequenceExt::map`] wrap another sequence and forward
//! the flow unchanged, so a stop requested at the end of a long chain reaches
//! the original source on the very next element.

mod adapters;
mod source;

pub use adapters::*;
pub use source::*;

use crate::prefetch::Prefetch;

/// Answer of a consumer callback, and the outcome of [`Sequence::produce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum Flow {
    /// Keep going. Returned by `produce` when the sequence ended on its own.
    Continue,
    /// Stop now. Returned by `produce` when the consumer asked to stop.
    Stop,
}

impl Flow {
    /// Returns `true` for [`Flow::Stop`].
    pub const fn is_stop(self) -> bool {
        matches!(self, Self::Stop)
    }

    /// Returns `true` for [`Flow::Continue`].
    pub const fn is_continue(self) -> bool {
        matches!(self, Self::Continue)
    }
}

impl From<bool> for Flow {
    /// `true` continues, `false` stops.
    fn from(keep_going: bool) -> Self {
        if keep_going { Self::Continue } else { Self::Stop }
    }
}

/// A lazy, single-pass producer of elements.
///
/// `produce` consumes the sequence, so it can be driven at most once and by
/// at most one consumer. Nothing happens until it is called.
///
/// # Contract
///
/// - `consumer` is called once per element, in the order the sequence
///   defines.
/// - The first time `consumer` returns [`Flow::Stop`], the producer stops
///   without pulling further elements and returns [`Flow::Stop`].
/// - When the elements run out (or the sequence ends itself early, e.g. a
///   limit or a cancelled parallel stage), the producer returns
///   [`Flow::Continue`].
///
/// # Example
///
/// ```
/// use sequin::prelude::*;
///
/// let mut seen = Vec::new();
/// let flow = sequin::iter(1..).produce(|x| {
///     seen.push(x);
///     (x < 3).into()
/// });
///
/// assert_eq!(seen, [1, 2, 3]);
/// assert!(flow.is_stop());
/// ```
pub trait Sequence {
    /// The type of the elements produced.
    type Item;

    /// Drives the sequence, calling `consumer` for every element until it
    /// returns [`Flow::Stop`] or the elements run out.
    fn produce<F>(self, consumer: F) -> Flow
    where
        Self: Sized,
        F: FnMut(Self::Item) -> Flow;
}

/// Single-threaded adapters and terminal operations for every [`Sequence`].
pub trait SequenceExt: Sequence + Sized {
    /// Transforms every element with `f`.
    fn map<U, F>(self, f: F) -> Map<Self, F>
    where
        F: FnMut(Self::Item) -> U,
    {
        Map::new(self, f)
    }

    /// Keeps the elements for which `predicate` holds.
    fn filter<P>(self, predicate: P) -> Filter<Self, P>
    where
        P: FnMut(&Self::Item) -> bool,
    {
        Filter::new(self, predicate)
    }

    /// Yields at most `limit` elements, then stops the source.
    fn take(self, limit: usize) -> Take<Self> {
        Take::new(self, limit)
    }

    /// Drops the first `count` elements.
    fn skip(self, count: usize) -> Skip<Self> {
        Skip::new(self, count)
    }

    /// Groups consecutive elements into vectors of `size` (the last may be
    /// shorter). A `size` of zero is treated as one.
    fn chunks(self, size: usize) -> Chunks<Self> {
        Chunks::new(self, size)
    }

    /// Decouples producer and consumer pace with a lookahead buffer of
    /// `depth` elements, filled by a background thread.
    ///
    /// See [`Prefetch`].
    fn prefetch(self, depth: usize) -> Prefetch<Self>
    where
        Self: Send,
        Self::Item: Send,
    {
        Prefetch::new(self, depth)
    }

    /// Calls `f` on every element.
    fn for_each<F>(self, mut f: F)
    where
        F: FnMut(Self::Item),
    {
        let _ = self.produce(|item| {
            f(item);
            Flow::Continue
        });
    }

    /// Folds every element into an accumulator, front to back.
    fn fold<B, F>(self, init: B, mut f: F) -> B
    where
        F: FnMut(B, Self::Item) -> B,
    {
        let mut acc = Some(init);
        let _ = self.produce(|item| {
            acc = Option::take(&mut acc).map(|acc| f(acc, item));
            Flow::Continue
        });
        // `acc` is only ever empty while `f` runs.
        match acc {
            Some(acc) => acc,
            None => unreachable!("fold accumulator taken and not restored"),
        }
    }

    /// Counts the elements.
    fn count(self) -> usize {
        self.fold(0, |n, _| n + 1)
    }

    /// Collects every element into a vector.
    fn to_vec(self) -> Vec<Self::Item> {
        let mut out = Vec::new();
        let _ = self.produce(|item| {
            out.push(item);
            Flow::Continue
        });
        out
    }
}

impl<S: Sequence> SequenceExt for S {}
