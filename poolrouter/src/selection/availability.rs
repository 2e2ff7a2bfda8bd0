//! Read-path selection: is the file on a pool the client may read from, and
//! is that pool cheap enough?

use super::SelectionOutcome;
use crate::error::{codes, RequestError};
use crate::location::{
    CostCandidate, CostMatrixSource, FileId, LocationQuery, PoolManagerParameters,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of [`check_availability`].
#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    /// A readable pool was chosen.
    Found(CostCandidate),
    /// No pool holds the file.
    NotFound,
    /// Pools hold the file but none may be read from.
    NotPermitted,
    /// The cheapest holder is above the cost cut.
    CostExceeded,
    /// The check failed; code and message describe why.
    Error(RequestError),
}

/// Runs the availability check against a fresh read location.
///
/// `best` in the result is the cheapest holder considered. For
/// [`Availability::CostExceeded`] it is the fallback target a stage or
/// pool-to-pool decision may still fall back to.
pub fn check_availability(
    source: &dyn CostMatrixSource,
    query: &LocationQuery,
    defaults: &Arc<PoolManagerParameters>,
) -> SelectionOutcome<Availability> {
    let location = match source.read_location(query) {
        Ok(location) => location,
        Err(e) => {
            warn!(file = %query.file, error = %e, "Failed to compute read location");
            return SelectionOutcome::new(
                Availability::Error(RequestError::new(
                    codes::NO_PERMISSION_ENTRIES,
                    format!("Failed to compute file location : {}", e.message),
                )),
                Arc::clone(defaults),
            );
        }
    };

    let rows = &location.matrix.rows;
    if rows.is_empty() || location.allowed_pool_count == 0 {
        return SelectionOutcome::new(
            Availability::Error(RequestError::new(
                codes::NO_PERMISSION_ENTRIES,
                "Configuration Error : No entries in Permission Matrix for this request",
            )),
            Arc::clone(defaults),
        );
    }

    let mut parameters = rows[0].parameters_or(defaults);

    if location.holding_pools.is_empty() {
        debug!(file = %query.file, "No pool holds the file");
        return SelectionOutcome::new(Availability::NotFound, parameters);
    }
    if location.available_pool_count == 0 {
        debug!(
            file = %query.file,
            holders = location.holding_pools.len(),
            "File only on read-prohibited pools"
        );
        return SelectionOutcome::new(Availability::NotPermitted, parameters);
    }

    // Scan tiers until one is good enough
    let mut best: Option<(usize, &CostCandidate)> = None;
    let mut scanned: Vec<&CostCandidate> = Vec::new();
    let mut allow_fallback = false;

    for (index, row) in rows.iter().enumerate() {
        let Some(first) = row.candidates.first() else {
            continue;
        };
        scanned.push(first);

        let is_better = best
            .map(|(_, b)| b.performance_cost > first.performance_cost)
            .unwrap_or(true);
        if is_better {
            best = Some((index, first));
        }

        parameters = row.parameters_or(defaults);
        allow_fallback = parameters.fallback_cost_cut > 0.0;

        let best_cost = best.map(|(_, b)| b.performance_cost).unwrap_or(f64::MAX);
        if (!allow_fallback && scanned.len() == 1) || best_cost < parameters.fallback_cost_cut {
            break;
        }
    }

    let Some((best_row, best_pool)) = best else {
        return SelectionOutcome::new(Availability::NotFound, parameters);
    };
    let best_cost = best_pool.performance_cost;

    if parameters.cost_cut > 0.0 && best_cost >= parameters.cost_cut {
        let cheapest = if allow_fallback {
            scanned
                .iter()
                .copied()
                .reduce(|a, b| {
                    if b.performance_cost < a.performance_cost {
                        b
                    } else {
                        a
                    }
                })
                .unwrap_or(best_pool)
        } else {
            best_pool
        };
        debug!(
            file = %query.file,
            cost = best_cost,
            cost_cut = parameters.cost_cut,
            "Best pool too expensive"
        );
        return SelectionOutcome::new(Availability::CostExceeded, parameters)
            .with_best(cheapest.clone());
    }

    if parameters.panic_cost_cut > 0.0 && best_cost > parameters.panic_cost_cut {
        return SelectionOutcome::new(
            Availability::Error(RequestError::new(
                codes::PANIC_COST,
                format!(
                    "Cost limit exceeded : {} > {}",
                    best_cost, parameters.panic_cost_cut
                ),
            )),
            parameters,
        )
        .with_best(best_pool.clone());
    }

    let row = &rows[best_row].candidates;
    let chosen = if parameters.min_cost_cut > 0.0 {
        row.iter()
            .filter(|c| c.performance_cost < parameters.min_cost_cut)
            .min_by_key(|c| spread_hash(&query.file, &c.pool))
            .unwrap_or(best_pool)
    } else {
        best_pool
    };

    debug!(file = %query.file, pool = %chosen, "Selected read pool");
    SelectionOutcome::new(Availability::Found(chosen.clone()), parameters)
        .with_best(best_pool.clone())
}

/// Deterministic per file and pool, so idle pools are picked evenly across
/// files but always the same way for one file.
fn spread_hash(file: &FileId, pool: &str) -> i32 {
    file.as_str()
        .chars()
        .chain(pool.chars())
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}
