use super::{Flow, Sequence};

/// A sequence over the items of an iterator.
///
/// Built with [`iter`].
#[derive(Clone, Debug)]
pub struct Iter<I> {
    iter: I,
}

/// Creates a sequence from anything iterable.
///
/// The iterator is advanced lazily, one element per consumer call, and is
/// dropped as soon as the consumer stops.
///
/// ```
/// use sequin::prelude::*;
///
/// assert_eq!(sequin::iter(0..3).to_vec(), [0, 1, 2]);
/// ```
pub fn iter<I: IntoIterator>(iter: I) -> Iter<I::IntoIter> {
    Iter {
        iter: iter.into_iter(),
    }
}

impl<I: Iterator> Sequence for Iter<I> {
    type Item = I::Item;

    fn produce<F>(self, mut consumer: F) -> Flow
    where
        F: FnMut(Self::Item) -> Flow,
    {
        for item in self.iter {
            if consumer(item).is_stop() {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }
}

/// A sequence with no elements.
#[derive(Clone, Copy, Debug)]
pub struct Empty<T>(core::marker::PhantomData<fn() -> T>);

/// Creates a sequence with no elements.
pub const fn empty<T>() -> Empty<T> {
    Empty(core::marker::PhantomData)
}

impl<T> Sequence for Empty<T> {
    type Item = T;

    fn produce<F>(self, _consumer: F) -> Flow
    where
        F: FnMut(T) -> Flow,
    {
        Flow::Continue
    }
}

/// A sequence with exactly one element.
///
/// Built with [`once`].
#[derive(Clone, Copy, Debug)]
pub struct Once<T>(T);

/// Creates a sequence with exactly one element.
pub const fn once<T>(item: T) -> Once<T> {
    Once(item)
}

impl<T> Sequence for Once<T> {
    type Item = T;

    fn produce<F>(self, mut consumer: F) -> Flow
    where
        F: FnMut(T) -> Flow,
    {
        consumer(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SequenceExt;

    #[test]
    fn iter_stops_on_request() {
        let mut seen = Vec::new();
        let flow = iter(0..100).produce(|x| {
            seen.push(x);
            Flow::from(x < 4)
        });
        assert!(flow.is_stop());
        assert_eq!(seen, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn exhausted_sequences_continue() {
        assert!(iter(0..3).produce(|_| Flow::Continue).is_continue());
        assert!(empty::<u8>().produce(|_| Flow::Stop).is_continue());
    }

    #[test]
    fn once_yields_one_element() {
        assert_eq!(once(7).to_vec(), [7]);
        assert_eq!(iter(vec!['a', 'b']).to_vec(), ['a', 'b']);
        assert!(once(1).produce(|_| Flow::Stop).is_stop());
    }

    #[test]
    fn std_collections_keep_their_own_methods() {
        // With the extension traits in scope, inherent methods still resolve.
        let mut slot = Some(3);
        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot, None);

        let v = vec![1, 2, 3, 4, 5];
        let chunks: Vec<&[i32]> = v.chunks(2).collect();
        assert_eq!(chunks, [&[1, 2][..], &[3, 4][..], &[5][..]]);
        assert_eq!(v.len(), 5);
    }
}
