//! Cost-based pool selection algorithms.
//!
//! Three pure decisions, each computed from a freshly fetched cost matrix:
//!
//! ```text
//!   availability   ──► read from a pool that already holds the file
//!   pool_to_pool   ──► pick (source, destination) for a replica copy
//!   staging        ──► pick a pool to restore the file from the archive
//! ```
//!
//! None of them touch request state. The request actor maps their outcomes
//! onto its state machine.

mod availability;
mod pool_to_pool;
mod staging;

pub use availability::{check_availability, Availability};
pub use pool_to_pool::{select_pool_to_pool, PoolToPool, PoolToPoolPair};
pub use staging::select_stage_pool;

use crate::location::{CostCandidate, PoolManagerParameters};
use std::sync::Arc;

/// Result of one selection run.
#[derive(Debug, Clone)]
pub struct SelectionOutcome<T> {
    pub outcome: T,
    /// Parameter set in effect for the decision.
    pub parameters: Arc<PoolManagerParameters>,
    /// Cheapest pool considered, when one was.
    pub best: Option<CostCandidate>,
}

impl<T> SelectionOutcome<T> {
    pub(crate) fn new(outcome: T, parameters: Arc<PoolManagerParameters>) -> Self {
        Self {
            outcome,
            parameters,
            best: None,
        }
    }

    pub(crate) fn with_best(mut self, best: CostCandidate) -> Self {
        self.best = Some(best);
        self
    }
}
