#![doc = include_str!("../README.md")]

mod cancel;
mod config;
mod error;
mod parallel;
mod prefetch;
mod seq;
mod stats;

pub use crate::cancel::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::parallel::*;
pub use crate::prefetch::*;
pub use crate::seq::*;
pub use crate::stats::*;

/// Extension traits, for glob import.
pub mod prelude {
    pub use crate::parallel::ParallelExt as _;
    pub use crate::seq::{Flow, Sequence, SequenceExt as _};
}
