use super::{Flow, Sequence};

/// Sequence returned by [`SequenceExt::map`](super::SequenceExt::map).
#[derive(Clone, Debug)]
pub struct Map<S, F> {
    source: S,
    f: F,
}

impl<S, F> Map<S, F> {
    pub(crate) const fn new(source: S, f: F) -> Self {
        Self { source, f }
    }
}

impl<S, U, F> Sequence for Map<S, F>
where
    S: Sequence,
    F: FnMut(S::Item) -> U,
{
    type Item = U;

    fn produce<C>(self, mut consumer: C) -> Flow
    where
        C: FnMut(U) -> Flow,
    {
        let mut f = self.f;
        self.source.produce(|item| consumer(f(item)))
    }
}

/// Sequence returned by [`SequenceExt::filter`](super::SequenceExt::filter).
#[derive(Clone, Debug)]
pub struct Filter<S, P> {
    source: S,
    predicate: P,
}

impl<S, P> Filter<S, P> {
    pub(crate) const fn new(source: S, predicate: P) -> Self {
        Self { source, predicate }
    }
}

impl<S, P> Sequence for Filter<S, P>
where
    S: Sequence,
    P: FnMut(&S::Item) -> bool,
{
    type Item = S::Item;

    fn produce<C>(self, mut consumer: C) -> Flow
    where
        C: FnMut(S::Item) -> Flow,
    {
        let mut predicate = self.predicate;
        self.source.produce(|item| {
            if predicate(&item) {
                consumer(item)
            } else {
                Flow::Continue
            }
        })
    }
}

/// Sequence returned by [`SequenceExt::take`](super::SequenceExt::take).
#[derive(Clone, Debug)]
pub struct Take<S> {
    source: S,
    limit: usize,
}

impl<S> Take<S> {
    pub(crate) const fn new(source: S, limit: usize) -> Self {
        Self { source, limit }
    }
}

impl<S: Sequence> Sequence for Take<S> {
    type Item = S::Item;

    fn produce<C>(self, mut consumer: C) -> Flow
    where
        C: FnMut(S::Item) -> Flow,
    {
        // Never touch the source for an empty limit.
        if self.limit == 0 {
            return Flow::Continue;
        }

        let mut remaining = self.limit;
        let mut stopped = false;
        let _ = self.source.produce(|item| {
            remaining -= 1;
            if consumer(item).is_stop() {
                stopped = true;
                return Flow::Stop;
            }
            Flow::from(remaining > 0)
        });

        if stopped { Flow::Stop } else { Flow::Continue }
    }
}

/// Sequence returned by [`SequenceExt::skip`](super::SequenceExt::skip).
#[derive(Clone, Debug)]
pub struct Skip<S> {
    source: S,
    count: usize,
}

impl<S> Skip<S> {
    pub(crate) const fn new(source: S, count: usize) -> Self {
        Self { source, count }
    }
}

impl<S: Sequence> Sequence for Skip<S> {
    type Item = S::Item;

    fn produce<C>(self, mut consumer: C) -> Flow
    where
        C: FnMut(S::Item) -> Flow,
    {
        let mut to_skip = self.count;
        self.source.produce(|item| {
            if to_skip > 0 {
                to_skip -= 1;
                Flow::Continue
            } else {
                consumer(item)
            }
        })
    }
}

/// Sequence returned by [`SequenceExt::chunks`](super::SequenceExt::chunks).
#[derive(Clone, Debug)]
pub struct Chunks<S> {
    source: S,
    size: usize,
}

impl<S> Chunks<S> {
    pub(crate) fn new(source: S, size: usize) -> Self {
        Self {
            source,
            size: size.max(1),
        }
    }
}

impl<S: Sequence> Sequence for Chunks<S> {
    type Item = Vec<S::Item>;

    fn produce<C>(self, mut consumer: C) -> Flow
    where
        C: FnMut(Vec<S::Item>) -> Flow,
    {
        let size = self.size;
        let mut chunk = Vec::with_capacity(size);
        let flow = self.source.produce(|item| {
            chunk.push(item);
            if chunk.len() < size {
                return Flow::Continue;
            }
            consumer(core::mem::replace(&mut chunk, Vec::with_capacity(size)))
        });

        if flow.is_stop() || chunk.is_empty() {
            flow
        } else {
            consumer(chunk)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Flow, Sequence, SequenceExt, iter};
    use std::cell::Cell;

    #[test]
    fn adapters_compose() {
        let out = iter(1..=20)
            .map(|x| x * 3)
            .filter(|x| x % 2 == 0)
            .skip(1)
            .take(3)
            .to_vec();
        assert_eq!(out, [12, 18, 24]);
    }

    #[test]
    fn take_stops_the_source() {
        let pulled = Cell::new(0);
        let out = iter((0..).inspect(|_| pulled.set(pulled.get() + 1)))
            .take(5)
            .to_vec();
        assert_eq!(out, [0, 1, 2, 3, 4]);
        assert_eq!(pulled.get(), 5);
    }

    #[test]
    fn take_zero_pulls_nothing() {
        let pulled = Cell::new(0);
        let flow = iter((0..).inspect(|_| pulled.set(pulled.get() + 1)))
            .take(0)
            .produce(|_| Flow::Continue);
        assert!(flow.is_continue());
        assert_eq!(pulled.get(), 0);
    }

    #[test]
    fn take_reports_consumer_stop() {
        assert!(iter(0..10).take(5).produce(|_| Flow::Stop).is_stop());
        assert!(iter(0..10).take(5).produce(|_| Flow::Continue).is_continue());
    }

    #[test]
    fn chunks_flush_the_tail() {
        let out = iter(0..7).chunks(3).to_vec();
        assert_eq!(out, [vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
        assert_eq!(iter(0..6).chunks(3).count(), 2);
        assert_eq!(iter(0..2).chunks(0).count(), 2);
    }

    #[test]
    fn chunks_do_not_flush_after_stop() {
        let mut seen = Vec::new();
        let flow = iter(0..7).chunks(2).produce(|chunk| {
            seen.push(chunk);
            Flow::Stop
        });
        assert!(flow.is_stop());
        assert_eq!(seen, [vec![0, 1]]);
    }

    #[test]
    fn fold_runs_front_to_back() {
        let s = iter(["a", "b", "c"]).fold(String::new(), |mut acc, x| {
            acc.push_str(x);
            acc
        });
        assert_eq!(s, "abc");
    }
}
