//! Errors surfaced by fallible parallel calls.
//!
//! Infallible operations (`par_map`, `par_filter`, ...) have nothing to
//! report except a panic in user code, which is re-raised on the calling
//! thread once every worker has been joined. The `try_*` family reports the
//! first failure as a value instead:
//!
//! - `Task`: the user function returned `Err` for the element at `index`.
//! - `Panicked`: the user function panicked on the element at `index`.
//!
//! Cancellation and timeouts are not errors: they end the output early.

use core::any::Any;

/// A result whose error is [`Error<E>`].
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// The first failure observed by a fallible parallel call.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error<E> {
    /// The user function failed on an element.
    #[error("task failed on element {index}: {source}")]
    Task {
        /// Sequence index of the failing element.
        index: u64,
        /// The error returned by the user function.
        source: E,
    },

    /// The user function panicked on an element.
    #[error("task panicked on element {index}: {message}")]
    Panicked {
        /// Sequence index of the failing element.
        index: u64,
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl<E> Error<E> {
    /// Sequence index of the element that failed.
    pub const fn index(&self) -> u64 {
        match self {
            Self::Task { index, .. } | Self::Panicked { index, .. } => *index,
        }
    }

    /// Returns the user error, if this is not a panic.
    pub fn into_task_error(self) -> Option<E> {
        match self {
            Self::Task { source, .. } => Some(source),
            Self::Panicked { .. } => None,
        }
    }

    pub(crate) fn from_failure(index: u64, failure: Failure<E>) -> Self {
        match failure {
            Failure::Task(source) => Self::Task { index, source },
            Failure::Panic(payload) => Self::Panicked {
                index,
                message: panic_message(payload.as_ref()),
            },
        }
    }
}

/// How a task failed inside a worker.
pub(crate) enum Failure<E> {
    /// The task returned an error.
    Task(E),
    /// The task panicked; the payload is re-raised or reported.
    Panic(Box<dyn Any + Send>),
}

impl<E> core::fmt::Debug for Failure<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Task(_) => f.write_str("Failure::Task"),
            Self::Panic(payload) => write!(f, "Failure::Panic({:?})", panic_message(payload.as_ref())),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("non-string panic payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_keep_their_index() {
        let err = Error::from_failure(5, Failure::Task("boom"));
        assert_eq!(err.index(), 5);
        assert_eq!(err.to_string(), "task failed on element 5: boom");
        assert_eq!(err.into_task_error(), Some("boom"));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let err = Error::<String>::from_failure(2, Failure::Panic(Box::new("bad input")));
        assert_eq!(
            err,
            Error::Panicked {
                index: 2,
                message: "bad input".into()
            }
        );

        let err = Error::<String>::from_failure(3, Failure::Panic(Box::new(String::from("owned"))));
        assert_eq!(err.to_string(), "task panicked on element 3: owned");

        let err = Error::<String>::from_failure(4, Failure::Panic(Box::new(42_u32)));
        assert!(err.to_string().contains("non-string"));
    }
}
