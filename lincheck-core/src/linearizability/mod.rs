//! Linearizability checking for key-value histories
//!
//! [`LinearizabilityChecker`] decides whether a single per-key history admits
//! a linearization under a [`Specification`](crate::model::Specification).
//! [`Resolver`] searches subsets of ambiguous operations for one whose
//! inclusion makes an otherwise failing history linearizable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod checker;
pub mod resolver;

pub use checker::{CheckOutcome, LinearizabilityChecker};
pub use resolver::{Resolution, Resolver, MAX_SUBSET_BITS};

/// Cooperative cancellation shared between check workers.
///
/// The checker polls the flag once per search step, so a worker stops
/// shortly after another one has settled the answer.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
