//! Pool-to-pool selection: choose a source holding the file and a
//! destination to copy it to.

use super::SelectionOutcome;
use crate::error::{codes, RequestError};
use crate::location::{
    CostCandidate, CostMatrixSource, Direction, LocationQuery, PoolManagerParameters,
    SameHostPolicy,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Slopes at or below this value disable the slope limit.
const MIN_EFFECTIVE_SLOPE: f64 = 0.01;

/// Chosen source and destination of a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolToPoolPair {
    pub source: CostCandidate,
    pub destination: CostCandidate,
}

/// Outcome of [`select_pool_to_pool`].
#[derive(Debug, Clone, PartialEq)]
pub enum PoolToPool {
    Found(PoolToPoolPair),
    /// Policy forbids the copy (copy limit, no candidates, same host).
    NotPermitted(RequestError),
    /// Every source is above the alert cost.
    SourceCostExceeded(RequestError),
    /// Every destination is above the cost limit.
    CostExceeded(RequestError),
    Error(RequestError),
}

/// Selects a source/destination pair for replicating the file.
///
/// `override_cost` lifts the alert and destination cost limits; it is set
/// when the copy is forced rather than chosen for load reasons.
pub fn select_pool_to_pool(
    source: &dyn CostMatrixSource,
    query: &LocationQuery,
    defaults: &Arc<PoolManagerParameters>,
    override_cost: bool,
) -> SelectionOutcome<PoolToPool> {
    let location = match source.read_location(query) {
        Ok(location) => location,
        Err(e) => {
            warn!(file = %query.file, error = %e, "Failed to compute pool-to-pool sources");
            return SelectionOutcome::new(PoolToPool::Error(e), Arc::clone(defaults));
        }
    };

    let read_parameters = location
        .matrix
        .rows
        .first()
        .map(|row| row.parameters_or(defaults))
        .unwrap_or_else(|| Arc::clone(defaults));

    let mut sources = location.sources;
    sources.sort_by(|a, b| a.performance_cost.total_cmp(&b.performance_cost));

    let Some(cheapest_source) = sources.first() else {
        return SelectionOutcome::new(
            PoolToPool::Error(RequestError::new(
                codes::P2P_NO_SOURCE,
                "PANIC : Tried to do p2p, but source was empty",
            )),
            read_parameters,
        );
    };

    if sources.len() >= read_parameters.max_copies {
        return SelectionOutcome::new(
            PoolToPool::NotPermitted(RequestError::new(
                codes::P2P_TOO_MANY_COPIES,
                format!("Not replicated : already too many copies : {}", sources.len()),
            )),
            read_parameters,
        );
    }

    if !override_cost
        && read_parameters.alert_cost_cut > 0.0
        && cheapest_source.performance_cost > read_parameters.alert_cost_cut
    {
        return SelectionOutcome::new(
            PoolToPool::SourceCostExceeded(RequestError::new(
                codes::P2P_SOURCES_BUSY,
                format!(
                    "Not replicated : all source pools exceed alert cost : {}",
                    read_parameters.alert_cost_cut
                ),
            )),
            read_parameters,
        );
    }

    let slope_limit = if read_parameters.slope > MIN_EFFECTIVE_SLOPE {
        read_parameters.slope * cheapest_source.performance_cost
    } else {
        0.0
    };
    let max_cost = slope_limit.max(read_parameters.cost_cut);

    let matrix = match source.fetch_matrix(Direction::PoolToPool, query) {
        Ok(matrix) => matrix,
        Err(e) => {
            warn!(file = %query.file, error = %e, "Failed to compute pool-to-pool destinations");
            return SelectionOutcome::new(PoolToPool::Error(e), read_parameters);
        }
    };

    if matrix.is_empty() {
        return SelectionOutcome::new(
            PoolToPool::NotPermitted(RequestError::new(
                codes::P2P_NO_CANDIDATES,
                "No P2P candidates configured",
            )),
            read_parameters,
        );
    }

    let row = matrix
        .rows
        .iter()
        .find(|row| !row.candidates.is_empty())
        .or_else(|| matrix.rows.last());
    let (parameters, candidates) = match row {
        Some(row) => (row.parameters_or(defaults), row.candidates.as_slice()),
        None => (Arc::clone(defaults), &[][..]),
    };

    let mut destinations: Vec<&CostCandidate> = candidates
        .iter()
        .filter(|c| !sources.iter().any(|s| s.pool == c.pool))
        .collect();

    if destinations.is_empty() {
        return SelectionOutcome::new(
            PoolToPool::NotPermitted(RequestError::new(
                codes::P2P_NO_DESTINATION,
                "Not replicated : file already everywhere",
            )),
            parameters,
        );
    }

    if !override_cost && max_cost > 0.0 {
        destinations.retain(|c| c.performance_cost < max_cost);
        if destinations.is_empty() {
            return SelectionOutcome::new(
                PoolToPool::CostExceeded(RequestError::new(
                    codes::P2P_NO_DESTINATION,
                    format!("Not replicated : All destination pools exceed cost {}", max_cost),
                )),
                parameters,
            );
        }
    }

    destinations.sort_by(|a, b| a.performance_cost.total_cmp(&b.performance_cost));

    let cheapest_pair = || PoolToPoolPair {
        source: sources[0].clone(),
        destination: destinations[0].clone(),
    };

    let pair = match parameters.same_host_copy {
        SameHostPolicy::NotChecked => cheapest_pair(),
        policy => match distinct_host_pair(&sources, &destinations) {
            Some(pair) => pair,
            None if policy == SameHostPolicy::BestEffort => cheapest_pair(),
            None => {
                return SelectionOutcome::new(
                    PoolToPool::NotPermitted(RequestError::new(
                        codes::P2P_NO_DESTINATION,
                        "Not replicated : sameHostCopy=never : no matching pool found",
                    )),
                    parameters,
                );
            }
        },
    };

    debug!(
        file = %query.file,
        source = %pair.source,
        destination = %pair.destination,
        "Selected pool-to-pool pair"
    );
    SelectionOutcome::new(PoolToPool::Found(pair), parameters)
}

/// First (source, destination) in cost order on different hosts.
///
/// Sources without a host tag never qualify.
fn distinct_host_pair(
    sources: &[CostCandidate],
    destinations: &[&CostCandidate],
) -> Option<PoolToPoolPair> {
    for source in sources {
        let Some(source_host) = source.hostname() else {
            continue;
        };
        if let Some(destination) = destinations
            .iter()
            .find(|d| d.hostname() != Some(source_host))
        {
            return Some(PoolToPoolPair {
                source: source.clone(),
                destination: (*destination).clone(),
            });
        }
    }
    None
}
