//! Stage pool selection.

use super::SelectionOutcome;
use crate::error::{codes, RequestError};
use crate::location::{
    CostCandidate, CostMatrixSource, Direction, LocationQuery, PoolManagerParameters,
    SameHostPolicy,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Selects a pool to restore the file onto.
///
/// With no `previous` candidate this is the cheapest pool of the first tier
/// that is good enough. When a previous stage attempt failed, that pool is
/// skipped unless it is the last candidate of its tier, and pools on the
/// previous host are avoided according to `same_host_retry`.
pub fn select_stage_pool(
    source: &dyn CostMatrixSource,
    query: &LocationQuery,
    defaults: &Arc<PoolManagerParameters>,
    previous: Option<&CostCandidate>,
    same_host_retry: SameHostPolicy,
) -> SelectionOutcome<Result<CostCandidate, RequestError>> {
    let matrix = match source.fetch_matrix(Direction::Stage, query) {
        Ok(matrix) => matrix,
        Err(e) => {
            warn!(file = %query.file, error = %e, "Failed to compute stage candidates");
            return SelectionOutcome::new(Err(e), Arc::clone(defaults));
        }
    };

    if matrix.is_empty() {
        return SelectionOutcome::new(
            Err(RequestError::new(
                codes::STAGE_NO_CANDIDATES,
                "No pool candidates available/configured/left for staging",
            )),
            Arc::clone(defaults),
        );
    }

    let mut parameters = matrix.rows[0].parameters_or(defaults);
    let mut chosen: Option<&CostCandidate> = None;

    match previous {
        None => {
            for row in &matrix.rows {
                parameters = row.parameters_or(defaults);
                let Some(first) = row.candidates.first() else {
                    continue;
                };
                chosen = Some(first);
                if parameters.fallback_cost_cut == 0.0
                    || first.performance_cost < parameters.fallback_cost_cut
                {
                    break;
                }
            }
        }
        Some(previous) => {
            let previous_host = match same_host_retry {
                SameHostPolicy::NotChecked => None,
                _ => previous.hostname(),
            };
            let mut remembered: Option<&CostCandidate> = None;

            'rows: for row in &matrix.rows {
                parameters = row.parameters_or(defaults);
                let count = row.candidates.len();

                for (index, candidate) in row.candidates.iter().enumerate() {
                    if candidate.pool == previous.pool && index + 1 < count {
                        continue;
                    }
                    if let Some(host) = previous_host {
                        if remembered.is_none() {
                            remembered = Some(candidate);
                        }
                        if candidate.hostname() == Some(host) {
                            continue;
                        }
                    }
                    if parameters.fallback_cost_cut > 0.0
                        && candidate.performance_cost > parameters.fallback_cost_cut
                    {
                        remembered = None;
                        continue 'rows;
                    }
                    chosen = Some(candidate);
                    break 'rows;
                }
            }

            if chosen.is_none() && same_host_retry == SameHostPolicy::BestEffort {
                chosen = remembered;
            }
        }
    }

    match chosen {
        Some(candidate) => {
            debug!(file = %query.file, pool = %candidate, "Selected stage pool");
            SelectionOutcome::new(Ok(candidate.clone()), parameters)
        }
        None => SelectionOutcome::new(
            Err(RequestError::new(
                codes::STAGE_NO_CHEAP_CANDIDATES,
                "No cheap candidates available for staging",
            )),
            parameters,
        ),
    }
}
