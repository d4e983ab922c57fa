//! Cooperative cancellation shared by every stage of one parallel call.
//!
//! A [`CancelToken`] is a monotonic flag: once cancelled it stays cancelled.
//! Besides the flag it owns a channel whose only sender is dropped on
//! cancellation, so every thread parked in [`CancelToken::send`] or
//! [`CancelToken::recv`] wakes up at once instead of waiting for its queue.
//! An optional deadline turns the token into a timeout: the first check or
//! wait that observes the deadline cancels the token for everyone.

use core::time::Duration;
use crossbeam_channel::{self as channel, Receiver, Sender, select};
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, Ordering};
use std::{sync::Arc, time::Instant};

/// Shared cancellation signal for one top-level call.
///
/// Clones share the same state. A token governs exactly one call: once it is
/// cancelled (or its deadline passes) every sequence driven with it ends
/// early, so pass a fresh token to each call.
///
/// # Example
///
/// ```
/// use sequin::{CancelToken, ParallelConfig, prelude::*};
///
/// let token = CancelToken::new();
/// let config = ParallelConfig::new().with_cancel_token(token.clone());
///
/// // Cancelling before the call makes it end immediately.
/// token.cancel();
/// let out = sequin::iter(0..1_000).par_map(config, |x| x + 1).to_vec();
/// assert!(out.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    // Dropped on cancel; disconnecting `closed` wakes every waiter.
    closer: Mutex<Option<Sender<()>>>,
    closed: Receiver<()>,
    deadline: Mutex<Option<Instant>>,
}

/// Why a blocking operation on a [`CancelToken`] gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupted {
    /// The other side of the channel is gone.
    Disconnected,
    /// The token was cancelled or its deadline passed.
    Cancelled,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Creates a token that is not cancelled and has no deadline.
    pub fn new() -> Self {
        let (closer, closed) = channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                closer: Mutex::new(Some(closer)),
                closed,
                deadline: Mutex::new(None),
            }),
        }
    }

    /// Creates a token that cancels itself once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        token.set_timeout(timeout);
        token
    }

    /// Arms (or tightens) the deadline to `now + timeout`.
    ///
    /// An earlier deadline that is already armed wins.
    pub fn set_timeout(&self, timeout: Duration) {
        // Saturate instead of panicking on absurd timeouts.
        if let Some(deadline) = Instant::now().checked_add(timeout) {
            self.set_deadline(deadline);
        }
    }

    /// Arms (or tightens) the deadline. An earlier deadline wins.
    pub fn set_deadline(&self, deadline: Instant) {
        let mut current = self.inner.deadline.lock();
        match *current {
            Some(existing) if existing <= deadline => {}
            _ => *current = Some(deadline),
        }
    }

    /// Returns the armed deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        *self.inner.deadline.lock()
    }

    /// Sets the flag and wakes every blocked waiter. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            drop(self.inner.closer.lock().take());
            #[cfg(feature = "tracing")]
            tracing::debug!("Cancellation signalled");
        }
    }

    /// Returns `true` once the token is cancelled or its deadline passed.
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match self.deadline() {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel();
                true
            }
            _ => false,
        }
    }

    fn timer(&self) -> Receiver<Instant> {
        match self.deadline() {
            Some(deadline) => channel::at(deadline),
            None => channel::never(),
        }
    }

    /// Sends `value`, blocking while the channel is full.
    ///
    /// Gives up when the token is cancelled (the value is dropped) or when
    /// every receiver is gone.
    pub(crate) fn send<T>(&self, tx: &Sender<T>, value: T) -> Result<(), Interrupted> {
        let timer = self.timer();
        select! {
            send(tx, value) -> res => res.map_err(|_| Interrupted::Disconnected),
            recv(self.inner.closed) -> _ => Err(Interrupted::Cancelled),
            recv(timer) -> _ => {
                self.cancel();
                Err(Interrupted::Cancelled)
            }
        }
    }

    /// Receives the next value, blocking while the channel is empty.
    ///
    /// Gives up when the token is cancelled or when every sender is gone.
    pub(crate) fn recv<T>(&self, rx: &Receiver<T>) -> Result<T, Interrupted> {
        let timer = self.timer();
        select! {
            recv(rx) -> res => res.map_err(|_| Interrupted::Disconnected),
            recv(self.inner.closed) -> _ => Err(Interrupted::Cancelled),
            recv(timer) -> _ => {
                self.cancel();
                Err(Interrupted::Cancelled)
            }
        }
    }
}

/// Cancels the token when dropped, including during unwinding.
pub(crate) struct CancelOnDrop<'a>(pub(crate) &'a CancelToken);

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn cancel_is_monotonic_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_wakes_blocked_receiver() {
        let token = CancelToken::new();
        let (_tx, rx) = channel::bounded::<u8>(1);

        thread::scope(|s| {
            let waiter = s.spawn(|| token.recv(&rx));
            thread::sleep(Duration::from_millis(20));
            token.cancel();
            assert_eq!(waiter.join().unwrap(), Err(Interrupted::Cancelled));
        });
    }

    #[test]
    fn cancel_wakes_blocked_sender() {
        let token = CancelToken::new();
        let (tx, _rx) = channel::bounded::<u8>(1);
        tx.send(0).unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| token.send(&tx, 1));
            thread::sleep(Duration::from_millis(20));
            token.cancel();
            assert_eq!(waiter.join().unwrap(), Err(Interrupted::Cancelled));
        });
    }

    #[test]
    fn deadline_cancels_waiters() {
        let token = CancelToken::with_timeout(Duration::from_millis(20));
        let (_tx, rx) = channel::bounded::<u8>(1);
        let start = Instant::now();
        assert_eq!(token.recv(&rx), Err(Interrupted::Cancelled));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(token.is_cancelled());
    }

    #[test]
    fn earlier_deadline_wins() {
        let token = CancelToken::with_timeout(Duration::from_secs(1));
        let first = token.deadline().unwrap();
        token.set_timeout(Duration::from_secs(60));
        assert_eq!(token.deadline(), Some(first));
        token.set_timeout(Duration::from_millis(1));
        assert!(token.deadline().unwrap() < first);
    }

    #[test]
    fn disconnect_is_not_cancellation() {
        let token = CancelToken::new();
        let (tx, rx) = channel::bounded::<u8>(1);
        drop(tx);
        assert_eq!(token.recv(&rx), Err(Interrupted::Disconnected));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn drop_guard_cancels() {
        let token = CancelToken::new();
        {
            let _guard = CancelOnDrop(&token);
        }
        assert!(token.is_cancelled());
    }
}
