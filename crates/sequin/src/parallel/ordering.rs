//! Reconciles out-of-order worker completions with input order.

use super::{dispatch::ChunkGate, task::Yielded};
use crate::{config::Mode, seq::Flow};
use std::collections::HashMap;

/// The consumer-side ordering buffer of one call.
pub(crate) enum Reorder<U> {
    /// Forward results as they complete.
    Unordered,
    /// Hold early results until every lower index has been emitted.
    Unbounded {
        next: u64,
        pending: HashMap<u64, Yielded<U>>,
    },
    /// Hold one window of results and emit it once it is complete.
    Chunked {
        base: u64,
        window: Vec<Option<Yielded<U>>>,
        filled: usize,
    },
}

impl<U> Reorder<U> {
    pub(crate) fn new(mode: Mode) -> Self {
        match mode {
            Mode::Unordered => Self::Unordered,
            Mode::Ordered => Self::Unbounded {
                next: 0,
                pending: HashMap::new(),
            },
            Mode::Chunked(size) => Self::Chunked {
                base: 0,
                window: (0..size).map(|_| None).collect(),
                filled: 0,
            },
        }
    }

    /// Results held back, waiting for a lower index.
    pub(crate) fn pending(&self) -> usize {
        match self {
            Self::Unordered => 0,
            Self::Unbounded { pending, .. } => pending.len(),
            Self::Chunked { filled, .. } => *filled,
        }
    }

    /// Takes the output of the element at `index`, emitting everything that
    /// became ready.
    ///
    /// In chunked mode a completed window is emitted in full and its permits
    /// are then returned to `gate`, admitting the next window.
    pub(crate) fn accept<F>(
        &mut self,
        index: u64,
        output: Yielded<U>,
        gate: Option<&ChunkGate>,
        emit: &mut F,
    ) -> Flow
    where
        F: FnMut(U) -> Flow,
    {
        match self {
            Self::Unordered => output.drain(emit),
            Self::Unbounded { next, pending } => {
                if index != *next {
                    pending.insert(index, output);
                    return Flow::Continue;
                }

                let mut flow = output.drain(emit);
                *next += 1;
                while flow.is_continue() {
                    let Some(output) = pending.remove(next) else {
                        break;
                    };
                    flow = output.drain(emit);
                    *next += 1;
                }
                flow
            }
            Self::Chunked {
                base,
                window,
                filled,
            } => {
                debug_assert!(index >= *base, "index {index} below window {base}");
                let slot = (index - *base) as usize;
                debug_assert!(slot < window.len(), "index {index} beyond window {base}");
                window[slot] = Some(output);
                *filled += 1;
                if *filled < window.len() {
                    return Flow::Continue;
                }

                *base += window.len() as u64;
                *filled = 0;
                for output in window.iter_mut().filter_map(Option::take) {
                    if output.drain(emit).is_stop() {
                        return Flow::Stop;
                    }
                }
                if let Some(gate) = gate {
                    gate.release(window.len());
                }
                Flow::Continue
            }
        }
    }

    /// Emits the contiguous run of held results below `limit` (all of them
    /// when `limit` is `None`) and discards the rest.
    ///
    /// Called once the results channel is closed: at end of input this
    /// releases the final partial window, after a failure it releases what
    /// precedes the failing element.
    pub(crate) fn flush<F>(&mut self, limit: Option<u64>, emit: &mut F) -> Flow
    where
        F: FnMut(U) -> Flow,
    {
        let limit = limit.unwrap_or(u64::MAX);
        let mut flow = Flow::Continue;
        match self {
            Self::Unordered => {}
            Self::Unbounded { next, pending } => {
                while flow.is_continue() && *next < limit {
                    let Some(output) = pending.remove(next) else {
                        break;
                    };
                    flow = output.drain(emit);
                    *next += 1;
                }
                pending.clear();
            }
            Self::Chunked {
                base,
                window,
                filled,
            } => {
                for (offset, slot) in window.iter_mut().enumerate() {
                    let Some(output) = slot.take() else {
                        break;
                    };
                    if flow.is_stop() || *base + offset as u64 >= limit {
                        break;
                    }
                    flow = output.drain(emit);
                }
                window.iter_mut().for_each(|slot| *slot = None);
                *filled = 0;
            }
        }
        flow
    }
}
