//! Shared container state: key → actor map, correlation table, overrides.
//!
//! Locks here are narrow. They guard map mutation only and are never held
//! across an actor step or an outbound send.

use super::actor::{Command, Input, RequestActor};
use super::policy::{ContainerPolicy, PolicyStore};
use super::workers::WorkerPool;
use crate::config::ConfigFile;
use crate::error::{RequestError, SendError};
use crate::location::{CostMatrixSource, FileId, ParameterStore};
use crate::messages::{CorrelationId, Notification, PoolRequest};
use crate::transport::{NamespaceClient, PoolTransport};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tracing::{debug, warn};

/// What an outstanding pool message is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationKind {
    Fetch,
    PoolToPool,
    Ping,
}

impl fmt::Display for CorrelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => f.write_str("fetch"),
            Self::PoolToPool => f.write_str("p2p"),
            Self::Ping => f.write_str("ping"),
        }
    }
}

/// Routing entry for one outstanding pool message.
///
/// Holds only a weak reference: the actor owns its own lifecycle.
#[derive(Debug)]
pub(crate) struct Correlation {
    pub(crate) actor: Weak<RequestActor>,
    pub(crate) request: String,
    pub(crate) kind: CorrelationKind,
    pub(crate) destination: String,
}

/// Outstanding pool message as shown by `ls -w`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    pub correlation: CorrelationId,
    pub request: String,
    pub kind: CorrelationKind,
    pub destination: String,
}

impl fmt::Display for PendingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} -> {}",
            self.correlation, self.kind, self.request, self.destination
        )
    }
}

/// Why a tracked send did not happen.
#[derive(Debug)]
pub(crate) enum TrackedSendError {
    /// The per-kind limit of outstanding messages is reached.
    OutOfResources,
    Send(SendError),
}

#[derive(Debug, Default)]
pub(crate) struct ContainerStats {
    pub(crate) submitted: AtomicU64,
    pub(crate) clumped: AtomicU64,
    pub(crate) actors_created: AtomicU64,
    pub(crate) answered: AtomicU64,
    pub(crate) restore_exceeded: AtomicU64,
}

/// Counters reported by `info`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Client requests accepted.
    pub submitted: u64,
    /// Requests that joined an existing actor.
    pub clumped: u64,
    pub actors_created: u64,
    /// Client requests answered, successfully or not.
    pub answered: u64,
    /// Stage attempts refused by the concurrent stage limit.
    pub restore_exceeded: u64,
}

impl ContainerStats {
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            clumped: self.clumped.load(Ordering::Relaxed),
            actors_created: self.actors_created.load(Ordering::Relaxed),
            answered: self.answered.load(Ordering::Relaxed),
            restore_exceeded: self.restore_exceeded.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct Registry {
    pub(crate) actors: DashMap<String, Arc<RequestActor>>,
    correlations: Mutex<HashMap<CorrelationId, Correlation>>,
    next_correlation: AtomicU64,
    overrides: Mutex<BTreeMap<FileId, RequestError>>,
    pub(crate) policy: PolicyStore,
    pub(crate) parameters: ParameterStore,
    pub(crate) workers: WorkerPool,
    pub(crate) stats: ContainerStats,
    pub(crate) cost: Arc<dyn CostMatrixSource>,
    pub(crate) transport: Arc<dyn PoolTransport>,
    pub(crate) namespace: Arc<dyn NamespaceClient>,
}

impl Registry {
    pub(crate) fn new(
        config: &ConfigFile,
        cost: Arc<dyn CostMatrixSource>,
        transport: Arc<dyn PoolTransport>,
        namespace: Arc<dyn NamespaceClient>,
    ) -> Self {
        Self {
            actors: DashMap::new(),
            correlations: Mutex::new(HashMap::new()),
            next_correlation: AtomicU64::new(1),
            overrides: Mutex::new(BTreeMap::new()),
            policy: PolicyStore::new(ContainerPolicy::from(&config.container)),
            parameters: ParameterStore::new(config.partition.clone()),
            workers: WorkerPool::new(config.container.max_workers),
            stats: ContainerStats::default(),
            cost,
            transport,
            namespace,
        }
    }

    pub(crate) fn policy(&self) -> Arc<ContainerPolicy> {
        self.policy.snapshot()
    }

    // =========================================================================
    // Mailbox delivery
    // =========================================================================

    /// Queues `input` and activates the actor if it is idle.
    pub(crate) fn post(self: &Arc<Self>, actor: &Arc<RequestActor>, input: Input) {
        if actor.enqueue(input) {
            let actor = Arc::clone(actor);
            let registry = Arc::clone(self);
            self.workers.spawn(actor.run(registry));
        }
    }

    /// Posts a liveness check to `actor` once `deadline` has passed.
    pub(crate) fn schedule_alive(self: &Arc<Self>, actor: &Arc<RequestActor>, deadline: Instant) {
        let registry = Arc::downgrade(self);
        let actor = Arc::downgrade(actor);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let (Some(registry), Some(actor)) = (registry.upgrade(), actor.upgrade()) {
                registry.post(&actor, Input::Command(Command::Alive));
            }
        });
    }

    /// Point-in-time list of live actors.
    pub(crate) fn snapshot(&self) -> Vec<Arc<RequestActor>> {
        self.actors.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Removes `actor` unless a client request arrived in the meantime.
    ///
    /// Returns true if the actor is no longer registered.
    pub(crate) fn deregister(&self, actor: &Arc<RequestActor>) -> bool {
        let removed = self
            .actors
            .remove_if(actor.name(), |_, current| {
                Arc::ptr_eq(current, actor) && !actor.has_clients()
            })
            .is_some();
        removed
            || !self
                .actors
                .get(actor.name())
                .map(|current| Arc::ptr_eq(current.value(), actor))
                .unwrap_or(false)
    }

    // =========================================================================
    // Correlation table
    // =========================================================================

    /// Registers a correlation entry and sends `request` to `destination`.
    ///
    /// With a `limit`, the send is refused once that many entries of the
    /// same kind are outstanding.
    pub(crate) fn send_tracked(
        &self,
        actor: &Arc<RequestActor>,
        kind: CorrelationKind,
        destination: &str,
        request: PoolRequest,
        limit: Option<usize>,
    ) -> Result<CorrelationId, TrackedSendError> {
        let correlation = CorrelationId(self.next_correlation.fetch_add(1, Ordering::Relaxed));
        {
            let mut table = self.correlations.lock();
            if let Some(limit) = limit {
                let pending = table
                    .values()
                    .filter(|c| c.kind == kind && c.actor.strong_count() > 0)
                    .count();
                if pending >= limit {
                    return Err(TrackedSendError::OutOfResources);
                }
            }
            table.insert(
                correlation,
                Correlation {
                    actor: Arc::downgrade(actor),
                    request: actor.name().to_string(),
                    kind,
                    destination: destination.to_string(),
                },
            );
        }

        let request_kind = request.kind();
        if let Err(e) = self.transport.send(correlation, destination, request) {
            self.correlations.lock().remove(&correlation);
            warn!(
                request = %actor.name(),
                pool = %destination,
                error = %e,
                "Failed to send {} request",
                request_kind
            );
            return Err(TrackedSendError::Send(e));
        }

        debug!(
            request = %actor.name(),
            pool = %destination,
            %correlation,
            "Sent {} request",
            request_kind
        );
        Ok(correlation)
    }

    /// Removes the entry for `correlation`, returning it if present.
    pub(crate) fn take_correlation(&self, correlation: CorrelationId) -> Option<Correlation> {
        self.correlations.lock().remove(&correlation)
    }

    /// Drops the entry for `correlation`; a late reply will be discarded.
    pub(crate) fn forget(&self, correlation: CorrelationId) {
        self.correlations.lock().remove(&correlation);
    }

    /// Drops every outstanding message of `actor`; returns how many.
    pub(crate) fn forget_actor(&self, actor: &Arc<RequestActor>) -> usize {
        let mut table = self.correlations.lock();
        let before = table.len();
        table.retain(|_, c| c.actor.as_ptr() != Arc::as_ptr(actor));
        before - table.len()
    }

    pub(crate) fn pending(&self) -> Vec<PendingReply> {
        let mut pending: Vec<PendingReply> = self
            .correlations
            .lock()
            .iter()
            .map(|(id, c)| PendingReply {
                correlation: *id,
                request: c.request.clone(),
                kind: c.kind,
                destination: c.destination.clone(),
            })
            .collect();
        pending.sort_by_key(|p| p.correlation);
        pending
    }

    // =========================================================================
    // Operator overrides
    // =========================================================================

    pub(crate) fn forced_outcome(&self, file: &FileId) -> Option<RequestError> {
        self.overrides.lock().get(file).cloned()
    }

    pub(crate) fn set_forced_outcome(&self, file: FileId, error: RequestError) {
        self.overrides.lock().insert(file, error);
    }

    pub(crate) fn clear_forced_outcome(&self, file: &FileId) -> Option<RequestError> {
        self.overrides.lock().remove(file)
    }

    pub(crate) fn forced_outcomes(&self) -> Vec<(FileId, RequestError)> {
        self.overrides
            .lock()
            .iter()
            .map(|(f, e)| (f.clone(), e.clone()))
            .collect()
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Sends `notification` to the configured warning path. Failures are logged.
    pub(crate) fn notify(&self, notification: Notification) {
        let destination = self.policy().warning_path.clone();
        if let Err(e) = self.transport.notify(&destination, notification) {
            warn!(destination = %destination, error = %e, "Failed to send notification");
        }
    }
}
