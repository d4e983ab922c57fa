//! Per-call configuration of the parallel engine.
//!
//! [`ParallelConfig`] is a builder of optional knobs. Nothing is validated
//! eagerly: when a call starts, the config is resolved into [`Settings`],
//! and every value that is missing or invalid falls back to its documented
//! default. A bad value never fails the call.
//!
//! ## Defaults
//!
//! | knob          | default                     |
//! |---------------|-----------------------------|
//! | `concurrency` | host parallelism            |
//! | `ordered`     | `true`                      |
//! | `buffer_size` | `2 × concurrency`           |
//! | `chunk_size`  | `0` (unbounded reordering)  |
//! | `timeout`     | none                        |

use crate::{cancel::CancelToken, stats::Stats};
use core::time::Duration;
use std::sync::Arc;

/// Multiplier applied to the worker count when no queue depth is given.
pub const DEFAULT_BUFFER_FACTOR: usize = 2;

/// Options for one parallel call.
///
/// All setters are optional and composable. Zero values for
/// `concurrency` and `buffer_size` are ignored in favour of the defaults.
///
/// # Example
///
/// ```
/// use sequin::ParallelConfig;
///
/// let config = ParallelConfig::new()
///     .with_concurrency(4)
///     .with_chunk_size(16);
///
/// let settings = config.resolve();
/// assert_eq!(settings.concurrency, 4);
/// assert_eq!(settings.buffer_size, 8);
/// assert!(settings.ordered);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ParallelConfig {
    concurrency: Option<usize>,
    ordered: Option<bool>,
    buffer_size: Option<usize>,
    chunk_size: usize,
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
    stats: Option<Arc<Stats>>,
}

/// How worker results are reconciled with input order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Results are forwarded in completion order.
    Unordered,
    /// Input order, with an unbounded reorder buffer.
    Ordered,
    /// Input order, admitting one window of `n` elements at a time.
    Chunked(usize),
}

/// A fully resolved [`ParallelConfig`].
#[derive(Clone, Debug)]
pub struct Settings {
    /// Number of worker threads, at least one.
    pub concurrency: usize,
    /// Whether output order matches input order.
    pub ordered: bool,
    /// Depth of the work queue and the results channel, at least one.
    pub buffer_size: usize,
    /// Reorder window; zero means unbounded.
    pub chunk_size: usize,
    /// Reconciliation mode derived from `ordered` and `chunk_size`.
    pub mode: Mode,
    /// Token shared by every stage of the call.
    pub cancel: CancelToken,
    /// Optional counters for the call.
    pub stats: Option<Arc<Stats>>,
}

impl ParallelConfig {
    /// Creates a config where every knob takes its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads. Zero is ignored.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Sets whether output order must match input order.
    #[must_use]
    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered = Some(ordered);
        self
    }

    /// Shorthand for `with_ordered(false)`.
    #[must_use]
    pub fn unordered(self) -> Self {
        self.with_ordered(false)
    }

    /// Sets the depth of the work queue. Zero is ignored.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Sets the reorder window for ordered calls; zero disables windowing.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Cancels the call once `timeout` has elapsed since it started.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Uses `token` as the call's cancellation signal, so the call can be
    /// stopped from another thread.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Records the call's counters into `stats`.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<Stats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Resolves every knob, substituting defaults for missing or invalid
    /// values.
    ///
    /// The deadline of a configured timeout is armed on the resolved token,
    /// so resolve right before starting the call.
    pub fn resolve(&self) -> Settings {
        let concurrency = match self.concurrency {
            Some(0) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Ignoring concurrency of 0, using host parallelism");
                default_concurrency()
            }
            Some(n) => n,
            None => default_concurrency(),
        };

        let buffer_size = match self.buffer_size {
            Some(0) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Ignoring buffer size of 0, using {DEFAULT_BUFFER_FACTOR}x concurrency");
                concurrency.saturating_mul(DEFAULT_BUFFER_FACTOR)
            }
            Some(n) => n,
            None => concurrency.saturating_mul(DEFAULT_BUFFER_FACTOR),
        };

        let ordered = self.ordered.unwrap_or(true);
        let mode = match (ordered, self.chunk_size) {
            (false, _) => Mode::Unordered,
            (true, 0) => Mode::Ordered,
            (true, n) => Mode::Chunked(n),
        };

        let cancel = self.cancel.clone().unwrap_or_default();
        if let Some(timeout) = self.timeout {
            cancel.set_timeout(timeout);
        }

        Settings {
            concurrency,
            ordered,
            buffer_size,
            chunk_size: self.chunk_size,
            mode,
            cancel,
            stats: self.stats.clone(),
        }
    }
}

impl From<usize> for ParallelConfig {
    /// A config with `concurrency` workers and every other knob defaulted.
    fn from(concurrency: usize) -> Self {
        Self::new().with_concurrency(concurrency)
    }
}

/// Number of workers used when none is configured.
pub fn default_concurrency() -> usize {
    num_cpus::get().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_host_parallelism() {
        let settings = ParallelConfig::new().resolve();
        assert_eq!(settings.concurrency, default_concurrency());
        assert_eq!(settings.buffer_size, 2 * settings.concurrency);
        assert!(settings.ordered);
        assert_eq!(settings.chunk_size, 0);
        assert_eq!(settings.mode, Mode::Ordered);
        assert!(settings.cancel.deadline().is_none());
    }

    #[test]
    fn invalid_values_fall_back() {
        let settings = ParallelConfig::new()
            .with_concurrency(0)
            .with_buffer_size(0)
            .resolve();
        assert_eq!(settings.concurrency, default_concurrency());
        assert_eq!(settings.buffer_size, 2 * default_concurrency());
    }

    #[test]
    fn mode_selection() {
        assert_eq!(ParallelConfig::from(3).unordered().resolve().mode, Mode::Unordered);
        assert_eq!(
            ParallelConfig::from(3).unordered().with_chunk_size(4).resolve().mode,
            Mode::Unordered
        );
        assert_eq!(ParallelConfig::from(3).with_chunk_size(4).resolve().mode, Mode::Chunked(4));
    }

    #[test]
    fn explicit_buffer_size_wins() {
        let settings = ParallelConfig::from(8).with_buffer_size(3).resolve();
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.buffer_size, 3);
    }

    #[test]
    fn timeout_arms_the_token() {
        let token = CancelToken::new();
        let settings = ParallelConfig::new()
            .with_cancel_token(token.clone())
            .with_timeout(Duration::from_secs(30))
            .resolve();
        assert!(settings.cancel.deadline().is_some());
        assert_eq!(token.deadline(), settings.cancel.deadline());
    }

    #[test]
    fn each_resolution_gets_a_fresh_token() {
        let config = ParallelConfig::new();
        let a = config.resolve();
        a.cancel.cancel();
        assert!(!config.resolve().cancel.is_cancelled());
    }
}
