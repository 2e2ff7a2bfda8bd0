//! Liveness checks for running stages and copies.
//!
//! While a request waits for a fetch or a pool-to-pool reply, the pinger
//! periodically asks the target pool whether it still has the transfer in
//! hand. The ping travels through the correlation table like any other
//! pool message; its reply is interpreted by the waiting state.

use super::actor::RequestActor;
use super::registry::{CorrelationKind, Registry};
use crate::location::FileId;
use crate::messages::{CorrelationId, PoolRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
pub(crate) struct LivenessPinger {
    interval: Duration,
    target: Option<String>,
    due: Option<Instant>,
    ping: Option<CorrelationId>,
}

impl LivenessPinger {
    /// Arms the pinger for `pool`. A zero interval leaves it disarmed.
    pub(crate) fn start(&mut self, pool: &str, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        self.interval = interval;
        self.target = Some(pool.to_string());
        self.due = Some(Instant::now() + interval);
    }

    /// Disarms the pinger and drops any outstanding ping.
    pub(crate) fn stop(&mut self, registry: &Registry) {
        self.target = None;
        self.due = None;
        if let Some(ping) = self.ping.take() {
            registry.forget(ping);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.target.is_some()
    }

    pub(crate) fn is_ping(&self, correlation: CorrelationId) -> bool {
        self.ping == Some(correlation)
    }

    pub(crate) fn ping_answered(&mut self) {
        self.ping = None;
    }

    /// Pool to ping at `now`, if the pinger is armed and due.
    fn due_target(&self, now: Instant) -> Option<&str> {
        match (&self.target, self.due) {
            (Some(target), Some(due)) if now > due => Some(target),
            _ => None,
        }
    }

    /// Sends a ping if one is due and re-arms the timer.
    pub(crate) fn alive(&mut self, registry: &Registry, actor: &Arc<RequestActor>, file: &FileId) {
        let now = Instant::now();
        let Some(target) = self.due_target(now).map(str::to_string) else {
            return;
        };

        if let Some(previous) = self.ping.take() {
            registry.forget(previous);
        }

        debug!(request = %actor.name(), pool = %target, "Sending liveness check");
        let request = PoolRequest::CheckFile {
            pool: target.clone(),
            file: file.clone(),
        };
        if let Ok(correlation) =
            registry.send_tracked(actor, CorrelationKind::Ping, &target, request, None)
        {
            self.ping = Some(correlation);
        }
        self.due = Some(now + self.interval);
    }
}
