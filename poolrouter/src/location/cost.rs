//! Cost matrix types and the collaborator traits that produce them.

use super::parameters::PoolManagerParameters;
use super::{FileId, ProtocolInfo, StorageInfo};
use crate::error::RequestError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Tag holding the host a pool runs on.
pub const HOSTNAME_TAG: &str = "hostname";

/// Direction a cost matrix is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Reading an existing replica.
    Read,
    /// Staging from the archive onto a pool.
    Stage,
    /// Replicating from pool to pool.
    PoolToPool,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Stage => "cache",
            Self::PoolToPool => "p2p",
        };
        f.write_str(s)
    }
}

/// One candidate pool with its performance cost. Lower is better.
#[derive(Debug, Clone, PartialEq)]
pub struct CostCandidate {
    pub pool: String,
    pub performance_cost: f64,
    pub tags: HashMap<String, String>,
}

impl CostCandidate {
    pub fn new(pool: impl Into<String>, performance_cost: f64) -> Self {
        Self {
            pool: pool.into(),
            performance_cost,
            tags: HashMap::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.tags.insert(HOSTNAME_TAG.to_string(), host.into());
        self
    }

    pub fn hostname(&self) -> Option<&str> {
        self.tags.get(HOSTNAME_TAG).map(String::as_str)
    }
}

impl fmt::Display for CostCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(cost={:.4})", self.pool, self.performance_cost)
    }
}

/// One policy tier of the matrix; candidates sorted by cost.
#[derive(Debug, Clone, Default)]
pub struct MatrixRow {
    pub candidates: Vec<CostCandidate>,
    /// Parameters of this tier; `None` means the default partition.
    pub parameters: Option<Arc<PoolManagerParameters>>,
}

impl MatrixRow {
    pub fn new(candidates: Vec<CostCandidate>) -> Self {
        Self {
            candidates,
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: PoolManagerParameters) -> Self {
        self.parameters = Some(Arc::new(parameters));
        self
    }

    /// Parameters of the row, or `defaults` when the row has none.
    pub fn parameters_or(&self, defaults: &Arc<PoolManagerParameters>) -> Arc<PoolManagerParameters> {
        self.parameters
            .as_ref()
            .map(Arc::clone)
            .unwrap_or_else(|| Arc::clone(defaults))
    }
}

/// Ranked rows of candidate pools.
#[derive(Debug, Clone, Default)]
pub struct CostMatrix {
    pub rows: Vec<MatrixRow>,
}

impl CostMatrix {
    pub fn new(rows: Vec<MatrixRow>) -> Self {
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Where a file currently is, as seen from one read request.
#[derive(Debug, Clone, Default)]
pub struct ReadLocation {
    /// Permitted pools holding the file, per tier, cheapest first.
    pub matrix: CostMatrix,
    /// Number of pools the request may read from at all.
    pub allowed_pool_count: usize,
    /// Every pool holding a replica, permitted or not.
    pub holding_pools: Vec<String>,
    /// Number of permitted pools holding the file.
    pub available_pool_count: usize,
    /// Online pools holding the file, usable as pool-to-pool sources.
    pub sources: Vec<CostCandidate>,
}

/// What the cost module needs to compute a matrix.
#[derive(Debug, Clone)]
pub struct LocationQuery {
    pub file: FileId,
    pub storage_info: StorageInfo,
    pub protocol_info: ProtocolInfo,
    pub link_group: Option<String>,
}

/// Producer of cost matrices.
///
/// Implementations compute matrices from pool telemetry. Results are never
/// cached by the caller.
pub trait CostMatrixSource: Send + Sync + 'static {
    /// Computes the read view of the file.
    fn read_location(&self, query: &LocationQuery) -> Result<ReadLocation, RequestError>;

    /// Computes candidate pools for writing the file in `direction`.
    ///
    /// For [`Direction::Stage`] pools already holding the file are excluded.
    fn fetch_matrix(
        &self,
        direction: Direction,
        query: &LocationQuery,
    ) -> Result<CostMatrix, RequestError>;

    /// Drops any location data cached for `file`.
    fn invalidate(&self, _file: &FileId) {}
}

/// Maps client attributes to the units used in request keys.
pub trait SelectionUnit: Send + Sync + 'static {
    /// Network class of `host`.
    fn net_identifier(&self, host: &str) -> String;

    /// Protocol unit for `<protocol>/<major>`, `None` if unknown.
    fn protocol_unit(&self, protocol_version: &str) -> Option<String>;
}
