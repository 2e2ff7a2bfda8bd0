//! Entry point of the request container.
//!
//! The dispatcher owns the registry and turns external events (client
//! requests, pool replies, pool status changes, operator commands) into
//! mailbox posts. It never runs selection logic itself.

use super::actor::{Command, Input, RequestActor, RequestContext};
use super::policy::ContainerPolicy;
use super::registry::{PendingReply, Registry, StatsSnapshot};
use super::state::RequestSummary;
use super::sweeper::{self, Sweeper};
use crate::config::{ConfigFile, LoggingSettings};
use crate::error::{codes, AdminError, RequestError, SubmitError};
use crate::location::{
    CostMatrixSource, DestinationFileStatus, FileId, PoolManagerParameters, ProtocolInfo,
    RequestKey, SelectionUnit, StorageInfo,
};
use crate::messages::{
    CorrelationId, PoolReply, PoolSelection, PoolStatus, SelectReadPool, SelectionReply,
};
use crate::transport::{NamespaceClient, PoolTransport};
use dashmap::mapref::entry::Entry;
use regex::Regex;
use std::fmt::Write as _;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Protocol used for operator-initiated replication.
pub const REPLICATE_PROTOCOL: &str = "DCap";

/// Major version used for operator-initiated replication.
pub const REPLICATE_PROTOCOL_VERSION: u32 = 3;

/// External services the container talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub cost: Arc<dyn CostMatrixSource>,
    pub selection: Arc<dyn SelectionUnit>,
    pub transport: Arc<dyn PoolTransport>,
    pub namespace: Arc<dyn NamespaceClient>,
}

/// The request container.
pub struct Dispatcher {
    registry: Arc<Registry>,
    selection: Arc<dyn SelectionUnit>,
    logging: LoggingSettings,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(config: &ConfigFile, collaborators: Collaborators) -> Self {
        let registry = Registry::new(
            config,
            collaborators.cost,
            collaborators.transport,
            collaborators.namespace,
        );
        Self {
            registry: Arc::new(registry),
            selection: collaborators.selection,
            logging: config.logging.clone(),
            shutdown: CancellationToken::new(),
        }
    }

    // =========================================================================
    // Client requests
    // =========================================================================

    /// Accepts a client request and returns where its answer will arrive.
    ///
    /// Requests with the same key join the existing request instead of
    /// starting a new one.
    pub fn submit(
        &self,
        request: SelectReadPool,
    ) -> Result<oneshot::Receiver<SelectionReply>, SubmitError> {
        if request.replicate.is_some_and(|r| r.is_reply) {
            warn!(file = %request.file, "Rejecting replicate request that is a reply");
            return Err(SubmitError::ReplicateIsReply(request.file));
        }

        let protocol_version = request.protocol_info.protocol_version();
        let protocol = self
            .selection
            .protocol_unit(&protocol_version)
            .ok_or(SubmitError::UnknownProtocol(protocol_version))?;
        let net = self
            .selection
            .net_identifier(request.protocol_info.client_host());

        let key = RequestKey {
            file: request.file.clone(),
            net,
            protocol,
            replicate: request.replicate.is_some(),
        };
        let name = key.canonical_name();
        let (tx, rx) = oneshot::channel();
        let stats = &self.registry.stats;
        stats.submitted.fetch_add(1, Ordering::Relaxed);

        match self.registry.actors.entry(name) {
            Entry::Occupied(entry) => {
                entry.get().add_client(tx);
                stats.clumped.fetch_add(1, Ordering::Relaxed);
                debug!(request = %entry.key(), "Joined existing request");
            }
            Entry::Vacant(entry) => {
                let context = RequestContext {
                    storage_info: request.storage_info,
                    protocol_info: request.protocol_info,
                    link_group: request.link_group,
                    enforce_p2p: request.replicate.is_some(),
                    destination_status: request
                        .replicate
                        .map(|r| r.destination_status)
                        .unwrap_or_default(),
                };
                let actor = Arc::new(RequestActor::new(
                    key,
                    context,
                    self.registry.parameters.snapshot(),
                ));
                actor.add_client(tx);
                entry.insert(Arc::clone(&actor));
                stats.actors_created.fetch_add(1, Ordering::Relaxed);
                debug!(request = %actor.name(), "New request");
                self.registry.post(&actor, Input::Kick);
            }
        }
        Ok(rx)
    }

    /// Submits `request` and waits for its answer.
    pub async fn select_read_pool(
        &self,
        request: SelectReadPool,
    ) -> Result<PoolSelection, RequestError> {
        let answer = self.submit(request)?;
        answer.await.unwrap_or_else(|_| {
            Err(RequestError::new(
                codes::SELECTION_FAILED,
                "Request removed before it was answered",
            ))
        })
    }

    // =========================================================================
    // Pool events
    // =========================================================================

    /// Hands a pool reply to the request waiting for it.
    ///
    /// Returns false if nobody is waiting for `correlation` any more.
    pub fn route_reply(&self, correlation: CorrelationId, reply: PoolReply) -> bool {
        let Some(entry) = self.registry.take_correlation(correlation) else {
            debug!(%correlation, kind = reply.kind(), "Dropping reply nobody waits for");
            return false;
        };
        let Some(actor) = entry.actor.upgrade() else {
            debug!(%correlation, request = %entry.request, "Dropping reply for removed request");
            return false;
        };
        self.registry
            .post(&actor, Input::Reply { correlation, reply });
        true
    }

    /// Retries requests affected by a pool status change.
    ///
    /// DOWN retries every request depending on `pool`. UP does the same and
    /// also retries every request without a pool candidate.
    pub fn pool_status_changed(&self, pool: &str, status: PoolStatus) -> usize {
        info!(pool, %status, "Pool status changed");
        let mut retried = 0;
        for actor in self.registry.snapshot() {
            let candidate = actor.candidate_pool();
            if status == PoolStatus::Up && candidate.is_none() {
                debug!(request = %actor.name(), "Retrying request without candidate");
                self.post_retry(&actor, false);
                retried += 1;
            }
            if candidate.as_deref() == Some(pool) {
                debug!(request = %actor.name(), pool, "Retrying request on changed pool");
                self.post_retry(&actor, false);
                retried += 1;
            }
        }
        retried
    }

    /// Runs one liveness sweep; returns the number of requests visited.
    pub fn sweep(&self) -> usize {
        sweeper::sweep(&self.registry)
    }

    /// Starts the periodic sweep. It stops on [`shutdown`](Self::shutdown).
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        let sweeper = Sweeper::new(Arc::clone(&self.registry));
        tokio::spawn(sweeper.run(self.shutdown.clone()))
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // =========================================================================
    // Operator commands on requests
    // =========================================================================

    fn actor(&self, name: &str) -> Result<Arc<RequestActor>, AdminError> {
        self.registry
            .actors
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AdminError::NotFound(name.to_string()))
    }

    fn post_retry(&self, actor: &Arc<RequestActor>, update_storage_info: bool) {
        self.registry.post(
            actor,
            Input::Command(Command::Retry {
                update_storage_info,
            }),
        );
    }

    pub fn retry(&self, name: &str, update_storage_info: bool) -> Result<(), AdminError> {
        let actor = self.actor(name)?;
        self.post_retry(&actor, update_storage_info);
        Ok(())
    }

    /// Retries every request with an error, or every request with `force_all`.
    pub fn retry_all(&self, force_all: bool, update_storage_info: bool) -> usize {
        let mut retried = 0;
        for actor in self.registry.snapshot() {
            if force_all || actor.error_code() != 0 {
                self.post_retry(&actor, update_storage_info);
                retried += 1;
            }
        }
        retried
    }

    /// Answers every client of `name` with the given error.
    pub fn fail(&self, name: &str, code: i32, message: &str) -> Result<(), AdminError> {
        if code <= 0 {
            return Err(AdminError::InvalidArgument(format!(
                "error code must be > 0 : {}",
                code
            )));
        }
        let actor = self.actor(name)?;
        self.registry.post(
            &actor,
            Input::Command(Command::Fail(RequestError::new(code, message))),
        );
        Ok(())
    }

    /// Removes `name` from the registry without answering its clients.
    pub fn destroy(&self, name: &str) -> Result<(), AdminError> {
        let Some((_, actor)) = self.registry.actors.remove(name) else {
            return Err(AdminError::NotFound(name.to_string()));
        };
        let dropped = self.registry.forget_actor(&actor);
        info!(request = name, dropped, "Request destroyed");
        Ok(())
    }

    /// Operator-initiated replication of `file` for a client on `host`.
    pub async fn replicate(
        &self,
        file: FileId,
        host: &str,
    ) -> Result<oneshot::Receiver<SelectionReply>, AdminError> {
        let storage_info = self.storage_info(&file).await?;
        let request = SelectReadPool::new(
            file,
            storage_info,
            ProtocolInfo::new(REPLICATE_PROTOCOL, REPLICATE_PROTOCOL_VERSION, host),
        )
        .replicate(DestinationFileStatus::Undetermined);
        Ok(self.submit(request)?)
    }

    async fn storage_info(&self, file: &FileId) -> Result<StorageInfo, AdminError> {
        let bound = self.registry.policy().storage_info_timeout;
        match tokio::time::timeout(bound, self.registry.namespace.storage_info(file)).await {
            Ok(Ok(storage_info)) => Ok(storage_info),
            Ok(Err(e)) => Err(AdminError::InvalidArgument(e.to_string())),
            Err(_) => Err(AdminError::InvalidArgument(format!(
                "Timeout fetching storage info of {}",
                file
            ))),
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Live requests, sorted by name, optionally filtered on their summary line.
    pub fn list(&self, filter: Option<&Regex>) -> Vec<RequestSummary> {
        let mut summaries: Vec<RequestSummary> = self
            .registry
            .snapshot()
            .iter()
            .map(|actor| actor.summary())
            .filter(|summary| filter.map_or(true, |re| re.is_match(&summary.to_string())))
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn pending(&self) -> Vec<PendingReply> {
        self.registry.pending()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.registry.stats.snapshot()
    }

    /// Human-readable controller state.
    pub fn info(&self) -> String {
        let policy = self.policy();
        let parameters = self.parameters();
        let stats = self.stats();
        let mut out = String::new();

        let max_restore = policy
            .max_restore
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unlimited".to_string());

        let _ = writeln!(out, "  Thread Controller : {}", self.registry.workers);
        let _ = writeln!(out, "      Retry Timeout : {} seconds", policy.retry_timer.as_secs());
        let _ = writeln!(out, "    Maximum Retries : {}", policy.max_retries);
        let _ = writeln!(out, "    Pool Ping Timer : {} seconds", policy.ping_interval.as_secs());
        let _ = writeln!(out, "           On Error : {}", policy.on_error);
        let _ = writeln!(out, "          Allow p2p : {}", parameters.p2p_allowed);
        let _ = writeln!(out, "        Allow stage : {}", parameters.has_hsm_backend);
        let _ = writeln!(out, "     Same Host Copy : {}", parameters.same_host_copy);
        let _ = writeln!(out, "    Same Host Retry : {}", policy.same_host_retry);
        let _ = writeln!(out, "        Max Restore : {}", max_restore);
        let _ = writeln!(out, "   Restore Exceeded : {}", stats.restore_exceeded);
        let _ = writeln!(out, "       Warning Path : {}", policy.warning_path);
        let _ = writeln!(out, "           Clumping : {}", policy.max_request_clumping);
        let _ = writeln!(
            out,
            "            Suspend : incoming={} staging={}",
            policy.suspend_incoming, policy.suspend_staging
        );
        let _ = writeln!(
            out,
            "          Cost Cuts : min={} cut={} alert={} panic={} fallback={} slope={}",
            parameters.min_cost_cut,
            parameters.cost_cut,
            parameters.alert_cost_cut,
            parameters.panic_cost_cut,
            parameters.fallback_cost_cut,
            parameters.slope
        );
        let _ = writeln!(
            out,
            "           Requests : submitted={} clumped={} created={} answered={} active={}",
            stats.submitted,
            stats.clumped,
            stats.actors_created,
            stats.answered,
            self.registry.actors.len()
        );
        out
    }

    /// Current settings as INI text.
    pub fn dump_setup(&self) -> String {
        ConfigFile {
            container: self
                .policy()
                .to_settings(self.registry.workers.max_workers()),
            partition: (*self.parameters()).clone(),
            logging: self.logging.clone(),
        }
        .to_config_string()
    }

    // =========================================================================
    // Policy and parameters
    // =========================================================================

    pub fn policy(&self) -> Arc<ContainerPolicy> {
        self.registry.policy()
    }

    /// Applies `f` to the live policy. Running requests see the change at
    /// their next decision.
    pub fn update_policy(&self, f: impl FnOnce(&mut ContainerPolicy)) {
        self.registry.policy.update(f);
    }

    pub fn parameters(&self) -> Arc<PoolManagerParameters> {
        self.registry.parameters.snapshot()
    }

    pub fn update_parameters(&self, f: impl FnOnce(&mut PoolManagerParameters)) {
        self.registry.parameters.update(f);
    }

    pub fn set_max_workers(&self, max_workers: usize) {
        self.registry.workers.set_max_workers(max_workers);
    }

    pub fn max_workers(&self) -> usize {
        self.registry.workers.max_workers()
    }

    // =========================================================================
    // Forced outcomes
    // =========================================================================

    /// Makes every request for `file` answer with `error` at INIT.
    pub fn set_forced_outcome(&self, file: FileId, error: RequestError) {
        info!(%file, code = error.code, "Forced outcome set");
        self.registry.set_forced_outcome(file, error);
    }

    pub fn clear_forced_outcome(&self, file: &FileId) -> bool {
        self.registry.clear_forced_outcome(file).is_some()
    }

    pub fn forced_outcomes(&self) -> Vec<(FileId, RequestError)> {
        self.registry.forced_outcomes()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
