//! Periodic liveness sweep.
//!
//! Every sweep interval each live request receives an `Alive` command. A
//! request waiting on its retry timer re-enters INIT once the timer has
//! expired; a request waiting on a pool sends a liveness check when due.

use super::actor::{Command, Input};
use super::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Posts `Alive` to a snapshot of all live requests.
pub(crate) fn sweep(registry: &Arc<Registry>) -> usize {
    let actors = registry.snapshot();
    for actor in &actors {
        registry.post(actor, Input::Command(Command::Alive));
    }
    actors.len()
}

pub(crate) struct Sweeper {
    registry: Arc<Registry>,
    interval: Duration,
}

impl Sweeper {
    pub(crate) fn new(registry: Arc<Registry>) -> Self {
        let interval = registry.policy().sweep_interval;
        Self { registry, interval }
    }

    /// Runs the sweep until cancelled.
    pub(crate) async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            let swept = sweep(&self.registry);
            if swept > 0 {
                debug!(requests = swept, "Liveness sweep");
            }
        }
    }
}
