//! Tunable selection parameters.
//!
//! Every matrix row may carry its own parameter set (tiered fallback). Rows
//! without one use the default partition held by the [`ParameterStore`].
//! Actors always work on an `Arc` snapshot, so an operator changing the
//! defaults never alters a decision already in flight.

use parking_lot::RwLock;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Policy for placing two copies of a file on the same host.
///
/// Used both for pool-to-pool source/destination pairing and for picking a
/// different pool when a stage is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameHostPolicy {
    /// Same-host pairs are rejected.
    Never,
    /// Prefer distinct hosts, fall back to the cheapest pair.
    BestEffort,
    /// Host names are ignored.
    NotChecked,
}

impl SameHostPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::BestEffort => "besteffort",
            Self::NotChecked => "notchecked",
        }
    }
}

impl fmt::Display for SameHostPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SameHostPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "besteffort" | "best-effort" => Ok(Self::BestEffort),
            "notchecked" | "not-checked" => Ok(Self::NotChecked),
            other => Err(format!("Value not supported : {}", other)),
        }
    }
}

/// Snapshot of the tunable parameters of one partition.
///
/// Cost thresholds of `0.0` disable the corresponding check.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolManagerParameters {
    /// Pool-to-pool copies are allowed when the file is on a read-prohibited pool.
    pub p2p_allowed: bool,
    /// Pool-to-pool copy when the cheapest holder is too expensive.
    pub p2p_on_cost: bool,
    /// Re-run the availability check after a copy or stage completes.
    pub p2p_for_transfer: bool,
    /// An archive backend exists to stage from.
    pub has_hsm_backend: bool,
    /// Stage when the cheapest holder is too expensive.
    pub stage_on_cost: bool,
    /// Destination pools must be cheaper than `slope * source cost`.
    pub slope: f64,
    /// Maximum number of copies pool-to-pool may create.
    pub max_copies: usize,
    /// Pools below this cost are considered equal ("idle" cut).
    pub min_cost_cut: f64,
    /// Cost above which a holder is too expensive to read from.
    pub cost_cut: f64,
    /// Sources above this cost are too busy to copy from.
    pub alert_cost_cut: f64,
    /// Cost above which the availability check gives up.
    pub panic_cost_cut: f64,
    /// A matrix row is good enough when its cheapest pool is below this cost.
    pub fallback_cost_cut: f64,
    /// Same-host policy for pool-to-pool pairs.
    pub same_host_copy: SameHostPolicy,
}

impl Default for PoolManagerParameters {
    fn default() -> Self {
        Self {
            p2p_allowed: true,
            p2p_on_cost: false,
            p2p_for_transfer: false,
            has_hsm_backend: false,
            stage_on_cost: false,
            slope: 0.0,
            max_copies: 500,
            min_cost_cut: 0.0,
            cost_cut: 0.0,
            alert_cost_cut: 0.0,
            panic_cost_cut: 0.0,
            fallback_cost_cut: 0.0,
            same_host_copy: SameHostPolicy::BestEffort,
        }
    }
}

/// Holder of the default partition parameters.
#[derive(Debug, Default)]
pub struct ParameterStore {
    current: RwLock<Arc<PoolManagerParameters>>,
}

impl ParameterStore {
    pub fn new(parameters: PoolManagerParameters) -> Self {
        Self {
            current: RwLock::new(Arc::new(parameters)),
        }
    }

    /// Returns the current defaults. The snapshot never changes afterwards.
    pub fn snapshot(&self) -> Arc<PoolManagerParameters> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the defaults with a modified copy.
    pub fn update(&self, f: impl FnOnce(&mut PoolManagerParameters)) {
        let mut guard = self.current.write();
        let mut next = (**guard).clone();
        f(&mut next);
        *guard = Arc::new(next);
    }
}
