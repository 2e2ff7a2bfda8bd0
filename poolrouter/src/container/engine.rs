//! The request state machine.
//!
//! ```text
//!                ┌──────────────► DONE ◄──────────────┐
//!                │                 ▲                  │
//!   INIT ──► availability ──► POOL_TO_POOL ──► WAITING_FOR_P2P
//!     ▲          │                 │                  │
//!     │          └──────────► STAGE ──► WAITING_FOR_STAGE
//!     │                        │                      │
//!     └──── retry timer ◄── error handler ──► SUSPENDED
//! ```
//!
//! Every step either continues at once (`Flow::Continue`, no mailbox
//! input consumed) or waits for the next mailbox item (`Flow::Wait`).
//! Selection failures are recorded as a [`RequestError`] on the request
//! and surface to clients only when the request reaches DONE.

use super::actor::{candidate_label, Command, Input, RequestActor, RequestContext};
use super::ping::LivenessPinger;
use super::policy::OnError;
use super::registry::{CorrelationKind, Registry, TrackedSendError};
use super::state::{timestamp, Flow, RequestSummary, State, STATUS_IDLE};
use crate::error::{codes, RequestError};
use crate::location::{CostCandidate, FileId, LocationQuery, PoolManagerParameters};
use crate::messages::{CorrelationId, Notification, PoolReply, PoolRequest, PoolSelection};
use crate::selection::{
    check_availability, select_pool_to_pool, select_stage_pool, Availability, PoolToPool,
};
use chrono::{DateTime, Local};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What the actor borrows from its surroundings during one step.
pub(crate) struct StepContext<'a> {
    pub(crate) registry: &'a Arc<Registry>,
    pub(crate) actor: &'a Arc<RequestActor>,
}

/// Interpretation of a pool reply while waiting.
#[derive(Debug, PartialEq)]
enum ReplyOutcome {
    Ok,
    /// The archive asked to defer the stage.
    Delay,
    /// An intermediate ping reply; keep waiting.
    Pending,
    Failed(RequestError),
}

/// Mutable state of one request, owned by its execution loop.
pub(crate) struct ActorCore {
    file: FileId,
    name: String,
    context: RequestContext,
    state: State,
    force_continue: bool,
    retry_counter: i32,
    error: Option<RequestError>,
    status: String,

    pool_candidate: Option<CostCandidate>,
    p2p_source: Option<CostCandidate>,
    p2p_destination: Option<CostCandidate>,
    /// Fallback read pool from the last availability check.
    best_pool: Option<CostCandidate>,
    override_cost: bool,

    /// Global parameters captured at the start of the attempt.
    partition: Arc<PoolManagerParameters>,
    /// Parameters of the read or stage row routing follows. A pool-to-pool
    /// row only prices the copy.
    parameters: Arc<PoolManagerParameters>,

    waiting_for: Option<CorrelationId>,
    wait_until: Option<Instant>,
    pinger: LivenessPinger,
}

impl ActorCore {
    pub(crate) fn new(
        file: FileId,
        name: String,
        context: RequestContext,
        partition: Arc<PoolManagerParameters>,
    ) -> Self {
        Self {
            file,
            name,
            context,
            state: State::Init,
            force_continue: false,
            retry_counter: -1,
            error: None,
            status: STATUS_IDLE.to_string(),
            pool_candidate: None,
            p2p_source: None,
            p2p_destination: None,
            best_pool: None,
            override_cost: false,
            parameters: Arc::clone(&partition),
            partition,
            waiting_for: None,
            wait_until: None,
            pinger: LivenessPinger::default(),
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn take_continue(&mut self) -> bool {
        std::mem::take(&mut self.force_continue)
    }

    pub(crate) fn reset_continue(&mut self) {
        self.force_continue = false;
    }

    pub(crate) fn summary(&self, started: DateTime<Local>, queued: usize) -> RequestSummary {
        let pool = self
            .pool_candidate
            .as_ref()
            .or(self.p2p_destination.as_ref())
            .map(|c| c.pool.clone());
        let (error_code, error_message) = match &self.error {
            Some(e) => (e.code, e.message.clone()),
            None => (0, String::new()),
        };
        RequestSummary {
            name: self.name.clone(),
            queued,
            retry_count: self.retry_counter,
            started,
            candidate: candidate_label(
                self.pool_candidate.as_ref(),
                self.p2p_source.as_ref(),
                self.p2p_destination.as_ref(),
            ),
            pool,
            state: self.state,
            status: self.status.clone(),
            error_code,
            error_message,
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Processes one input; `None` is an internal continuation.
    pub(crate) async fn step(&mut self, cx: &StepContext<'_>, input: Option<Input>) {
        match (self.state, input) {
            (State::Done, None) => self.on_done(cx),
            (State::Done, Some(input)) => {
                debug!(request = %self.name, ?input, "Input after completion ignored");
            }
            (_, Some(Input::Command(command))) => self.handle_command(cx, command).await,
            (State::Init, None) => self.on_init(cx).await,
            (State::Init, Some(Input::Kick)) if self.retry_counter < 0 => self.on_init(cx).await,
            (State::PoolToPool, None) => self.on_pool_to_pool(cx).await,
            (State::Stage, None) => self.on_stage(cx).await,
            (State::WaitingForStage, Some(Input::Reply { correlation, reply })) => {
                if self.accept_reply(correlation) {
                    self.on_stage_reply(cx, reply).await;
                }
            }
            (State::WaitingForPoolToPool, Some(Input::Reply { correlation, reply })) => {
                if self.accept_reply(correlation) {
                    self.on_pool_to_pool_reply(cx, reply).await;
                }
            }
            (state, input) => {
                debug!(request = %self.name, %state, ?input, "Input ignored");
            }
        }
    }

    fn next_step(&mut self, cx: &StepContext<'_>, state: State, flow: Flow) {
        if self.error.as_ref().is_some_and(RequestError::is_not_found) {
            self.state = State::Done;
            self.force_continue = true;
            self.status = "Failed".to_string();
            self.warn_operator(cx, "Failed");
            return;
        }
        self.state = state;
        self.force_continue = flow == Flow::Continue;
        if !matches!(state, State::Done | State::Suspended) {
            self.error = None;
        }
    }

    fn set_error(&mut self, error: RequestError) {
        self.error = Some(error);
    }

    fn query(&self) -> LocationQuery {
        LocationQuery {
            file: self.file.clone(),
            storage_info: self.context.storage_info.clone(),
            protocol_info: self.context.protocol_info.clone(),
            link_group: self.context.link_group.clone(),
        }
    }

    fn has_archive_copy(&self) -> bool {
        self.parameters.has_hsm_backend && self.context.storage_info.is_stored
    }

    // =========================================================================
    // INIT
    // =========================================================================

    async fn on_init(&mut self, cx: &StepContext<'_>) {
        if let Some(forced) = cx.registry.forced_outcome(&self.file) {
            info!(request = %self.name, code = forced.code, "Answering with forced outcome");
            self.set_error(forced);
            self.next_step(cx, State::Done, Flow::Continue);
            return;
        }

        let policy = cx.registry.policy();
        if policy.suspend_incoming {
            self.status = format!("Suspended (forced) {}", timestamp());
            self.set_error(RequestError::new(codes::SUSPEND_ENFORCED, "Suspend enforced"));
            self.next_step(cx, State::Suspended, Flow::Wait);
            self.warn_operator(cx, "Suspended (forced)");
            return;
        }

        self.retry_counter += 1;
        cx.registry.cost.invalidate(&self.file);
        self.partition = cx.registry.parameters.snapshot();
        self.parameters = Arc::clone(&self.partition);
        self.override_cost = false;

        if self.context.enforce_p2p {
            self.next_step(cx, State::PoolToPool, Flow::Continue);
            return;
        }

        let selection = check_availability(cx.registry.cost.as_ref(), &self.query(), &self.partition);
        self.parameters = selection.parameters;
        self.best_pool = selection.best;

        match selection.outcome {
            Availability::Found(pool) => {
                debug!(request = %self.name, pool = %pool, "File available");
                if policy.send_hit_info {
                    cx.registry.notify(Notification::Hit {
                        file: self.file.clone(),
                        pool: pool.pool.clone(),
                        cached: true,
                    });
                }
                self.pool_candidate = Some(pool);
                self.next_step(cx, State::Done, Flow::Continue);
            }
            Availability::NotFound => {
                if policy.send_hit_info {
                    cx.registry.notify(Notification::Hit {
                        file: self.file.clone(),
                        pool: super::state::POOL_UNKNOWN.to_string(),
                        cached: false,
                    });
                }
                if self.parameters.has_hsm_backend {
                    self.next_step(cx, State::Stage, Flow::Continue);
                } else {
                    self.status = format!("Suspended (pool unavailable) {}", timestamp());
                    self.pool_candidate = None;
                    self.set_error(RequestError::new(codes::POOL_UNAVAILABLE, "Suspend"));
                    self.next_step(cx, State::Suspended, Flow::Wait);
                }
            }
            Availability::NotPermitted => {
                self.override_cost = true;
                let next = if self.parameters.p2p_allowed || !self.parameters.has_hsm_backend {
                    State::PoolToPool
                } else {
                    State::Stage
                };
                self.next_step(cx, next, Flow::Continue);
            }
            Availability::CostExceeded => {
                if self.parameters.p2p_on_cost {
                    self.next_step(cx, State::PoolToPool, Flow::Continue);
                } else if self.parameters.has_hsm_backend && self.parameters.stage_on_cost {
                    self.next_step(cx, State::Stage, Flow::Continue);
                } else {
                    self.set_error(RequestError::new(
                        codes::COST_EXCEEDED,
                        "Cost exceeded (st,p2p not allowed)",
                    ));
                    self.next_step(cx, State::Done, Flow::Continue);
                }
            }
            Availability::Error(e) => {
                debug!(request = %self.name, error = %e, "Availability check failed, trying to stage");
                self.next_step(cx, State::Stage, Flow::Continue);
            }
        }
    }

    // =========================================================================
    // POOL_TO_POOL
    // =========================================================================

    async fn on_pool_to_pool(&mut self, cx: &StepContext<'_>) {
        let selection = select_pool_to_pool(
            cx.registry.cost.as_ref(),
            &self.query(),
            &self.partition,
            self.override_cost,
        );
        let policy = cx.registry.policy();

        match selection.outcome {
            PoolToPool::Found(pair) => {
                let request = PoolRequest::PoolToPool {
                    source: pair.source.pool.clone(),
                    destination: pair.destination.pool.clone(),
                    file: self.file.clone(),
                    storage_info: self.context.storage_info.clone(),
                    destination_status: self.context.destination_status,
                };
                let destination = pair.destination.pool.clone();
                self.p2p_source = Some(pair.source);
                self.p2p_destination = Some(pair.destination);

                match self.track(cx, CorrelationKind::PoolToPool, &destination, request, None) {
                    Ok(()) => {
                        self.next_step(cx, State::WaitingForPoolToPool, Flow::Wait);
                        self.status = format!("Pool2Pool {}", timestamp());
                        self.pinger.start(&destination, policy.ping_interval);
                        if policy.send_hit_info {
                            cx.registry.notify(Notification::Hit {
                                file: self.file.clone(),
                                pool: self
                                    .p2p_source
                                    .as_ref()
                                    .map(|s| s.pool.clone())
                                    .unwrap_or_default(),
                                cached: true,
                            });
                        }
                    }
                    Err(e) => {
                        self.set_error(e);
                        self.after_pool_to_pool_failure(cx);
                    }
                }
            }
            PoolToPool::NotPermitted(e) => {
                self.set_error(e);
                if self.accept_fallback(cx) {
                    return;
                }
                if self.context.enforce_p2p {
                    self.next_step(cx, State::Done, Flow::Continue);
                } else if self.has_archive_copy() {
                    debug!(request = %self.name, "Pool-to-pool not permitted, trying to stage");
                    self.next_step(cx, State::Stage, Flow::Continue);
                } else {
                    self.set_error(RequestError::new(
                        codes::P2P_NOT_PERMITTED,
                        "Pool to pool not permitted",
                    ));
                    self.next_step(cx, State::Suspended, Flow::Wait);
                }
            }
            PoolToPool::SourceCostExceeded(e) => {
                self.set_error(e);
                if self.has_archive_copy() && self.parameters.stage_on_cost {
                    let next = if self.context.enforce_p2p {
                        State::Done
                    } else {
                        State::Stage
                    };
                    self.next_step(cx, next, Flow::Continue);
                } else if !self.accept_fallback(cx) {
                    self.set_error(RequestError::new(
                        codes::PANIC_NO_POOL_SOURCE,
                        "PANIC : File not present in any reasonable pool",
                    ));
                    self.next_step(cx, State::Done, Flow::Continue);
                }
            }
            PoolToPool::CostExceeded(e) => {
                self.set_error(e);
                if !self.accept_fallback(cx) {
                    if !self.context.enforce_p2p {
                        self.set_error(RequestError::new(
                            codes::PANIC_NO_POOL_COST,
                            "PANIC : File not present in any reasonable pool",
                        ));
                    }
                    self.next_step(cx, State::Done, Flow::Continue);
                }
            }
            PoolToPool::Error(e) => {
                self.set_error(e);
                self.after_pool_to_pool_failure(cx);
            }
        }
    }

    /// Settles on the fallback read pool, if the availability check left one.
    fn accept_fallback(&mut self, cx: &StepContext<'_>) -> bool {
        let Some(best) = self.best_pool.clone() else {
            return false;
        };
        info!(request = %self.name, pool = %best, "Choosing high cost pool");
        if cx.registry.policy().send_cost_info {
            cx.registry.notify(Notification::Cost {
                file: self.file.clone(),
                pool: best.pool.clone(),
                cost: best.performance_cost,
            });
        }
        self.pool_candidate = Some(best);
        self.error = None;
        self.next_step(cx, State::Done, Flow::Continue);
        true
    }

    fn after_pool_to_pool_failure(&mut self, cx: &StepContext<'_>) {
        if self.context.enforce_p2p {
            self.next_step(cx, State::Done, Flow::Continue);
        } else if self.has_archive_copy() {
            self.next_step(cx, State::Stage, Flow::Continue);
        } else {
            self.next_step(cx, State::Suspended, Flow::Wait);
        }
    }

    // =========================================================================
    // STAGE
    // =========================================================================

    async fn on_stage(&mut self, cx: &StepContext<'_>) {
        let policy = cx.registry.policy();
        if policy.suspend_staging {
            self.status = format!("Suspended Stage (forced) {}", timestamp());
            self.set_error(RequestError::new(codes::SUSPEND_ENFORCED, "Suspend enforced"));
            self.next_step(cx, State::Suspended, Flow::Wait);
            self.warn_operator(cx, "Suspended Stage (forced)");
            return;
        }

        let selection = select_stage_pool(
            cx.registry.cost.as_ref(),
            &self.query(),
            &self.partition,
            self.pool_candidate.as_ref(),
            policy.same_host_retry,
        );
        self.parameters = selection.parameters;

        let pool = match selection.outcome {
            Ok(pool) => pool,
            Err(e) => {
                self.set_error(e);
                self.error_handler(cx).await;
                return;
            }
        };

        let request = PoolRequest::FetchFile {
            pool: pool.pool.clone(),
            file: self.file.clone(),
            storage_info: self.context.storage_info.clone(),
        };
        let destination = pool.pool.clone();
        self.pool_candidate = Some(pool);

        match self.track(cx, CorrelationKind::Fetch, &destination, request, policy.max_restore) {
            Ok(()) => {
                self.next_step(cx, State::WaitingForStage, Flow::Wait);
                self.status = format!("Staging {}", timestamp());
                self.pinger.start(&destination, policy.ping_interval);
            }
            Err(e) if e.code == codes::RESOURCE_UNAVAILABLE => {
                cx.registry
                    .stats
                    .restore_exceeded
                    .fetch_add(1, Ordering::Relaxed);
                self.out_of_resources(cx, "Restore");
            }
            Err(e) => {
                self.set_error(e);
                self.error_handler(cx).await;
            }
        }
    }

    fn out_of_resources(&mut self, cx: &StepContext<'_>, detail: &str) {
        self.clear_steering(cx);
        self.set_error(RequestError::new(
            codes::RESOURCE_UNAVAILABLE,
            format!("Resource temporarily unavailable : {}", detail),
        ));
        self.next_step(cx, State::Done, Flow::Continue);
        self.status = "Failed".to_string();
        self.warn_operator(cx, "Failed");
    }

    // =========================================================================
    // Waiting for replies
    // =========================================================================

    /// Returns true if `correlation` belongs to the current wait or ping.
    fn accept_reply(&mut self, correlation: CorrelationId) -> bool {
        if self.waiting_for == Some(correlation) {
            self.waiting_for = None;
            true
        } else if self.pinger.is_ping(correlation) {
            self.pinger.ping_answered();
            true
        } else {
            debug!(request = %self.name, %correlation, "Dropping stale reply");
            false
        }
    }

    async fn on_stage_reply(&mut self, cx: &StepContext<'_>, reply: PoolReply) {
        let outcome = match reply {
            PoolReply::FetchFile { return_code: 0, .. } => ReplyOutcome::Ok,
            PoolReply::FetchFile {
                return_code: codes::HSM_DELAY,
                error,
            } => {
                self.set_error(RequestError::new(
                    codes::HSM_DELAY,
                    format!(
                        "Suspend by HSM request : {}",
                        error.as_deref().unwrap_or("No info")
                    ),
                ));
                ReplyOutcome::Delay
            }
            PoolReply::FetchFile { return_code, error } => ReplyOutcome::Failed(RequestError::new(
                return_code,
                error.unwrap_or_else(|| format!("Error={}", return_code)),
            )),
            other => check_file_outcome(other, codes::INVALID_STAGE_REPLY),
        };

        match outcome {
            ReplyOutcome::Ok => {
                info!(request = %self.name, pool = ?self.pool_candidate.as_ref().map(|c| &c.pool), "Stage completed");
                self.clear_steering(cx);
                let next = if self.parameters.p2p_for_transfer {
                    State::Init
                } else {
                    State::Done
                };
                self.next_step(cx, next, Flow::Continue);
            }
            ReplyOutcome::Delay => {
                self.clear_steering(cx);
                self.status = "Suspended By HSM request".to_string();
                self.next_step(cx, State::Suspended, Flow::Wait);
            }
            ReplyOutcome::Pending => {}
            ReplyOutcome::Failed(e) => {
                warn!(request = %self.name, error = %e, "Stage failed");
                self.clear_steering(cx);
                self.set_error(e);
                self.error_handler(cx).await;
            }
        }
    }

    async fn on_pool_to_pool_reply(&mut self, cx: &StepContext<'_>, reply: PoolReply) {
        let outcome = match reply {
            PoolReply::PoolToPool { return_code: 0, .. } => ReplyOutcome::Ok,
            PoolReply::PoolToPool { return_code, error } => {
                ReplyOutcome::Failed(RequestError::new(
                    return_code,
                    error.unwrap_or_else(|| format!("Error={}", return_code)),
                ))
            }
            other => check_file_outcome(other, codes::INVALID_P2P_REPLY),
        };

        match outcome {
            ReplyOutcome::Ok => {
                info!(request = %self.name, destination = ?self.p2p_destination.as_ref().map(|c| &c.pool), "Pool-to-pool completed");
                self.clear_steering(cx);
                self.pool_candidate = self.p2p_destination.clone();
                let next = if self.parameters.p2p_for_transfer && !self.context.enforce_p2p {
                    State::Init
                } else {
                    State::Done
                };
                self.next_step(cx, next, Flow::Continue);
            }
            ReplyOutcome::Pending | ReplyOutcome::Delay => {}
            ReplyOutcome::Failed(e) => {
                warn!(request = %self.name, error = %e, "Pool-to-pool failed");
                self.clear_steering(cx);
                self.set_error(e);
                if self.has_archive_copy() {
                    self.next_step(cx, State::Stage, Flow::Continue);
                } else {
                    self.error_handler(cx).await;
                }
            }
        }
    }

    // =========================================================================
    // Error handling and retries
    // =========================================================================

    async fn error_handler(&mut self, cx: &StepContext<'_>) {
        let policy = cx.registry.policy();
        if self.retry_counter == 0 {
            cx.registry.cost.invalidate(&self.file);
            self.refresh_storage_info(cx).await;
            self.next_step(cx, State::Init, Flow::Continue);
        } else if self.retry_counter < policy.max_retries as i32 {
            cx.registry.cost.invalidate(&self.file);
            self.refresh_storage_info(cx).await;
            self.wait_for(cx, policy.retry_timer);
            self.status = format!("Waiting {}", timestamp());
            self.next_step(cx, State::Init, Flow::Wait);
        } else {
            match policy.on_error {
                OnError::Suspend => {
                    self.status = format!("Suspended {}", timestamp());
                    self.next_step(cx, State::Suspended, Flow::Wait);
                    self.warn_operator(cx, "Suspended");
                }
                OnError::Fail => {
                    self.next_step(cx, State::Done, Flow::Continue);
                    self.status = "Failed".to_string();
                    self.warn_operator(cx, "Failed");
                }
            }
        }
    }

    /// Arms the retry timer.
    fn wait_for(&mut self, cx: &StepContext<'_>, delay: Duration) {
        let deadline = Instant::now() + delay;
        self.wait_until = Some(deadline);
        cx.registry.schedule_alive(cx.actor, deadline);
    }

    /// Refetches the storage descriptor within the configured bound.
    ///
    /// A not-found answer is recorded as the request error; other failures
    /// keep the previous descriptor.
    async fn refresh_storage_info(&mut self, cx: &StepContext<'_>) {
        let file = self.file.clone();
        let bound = cx.registry.policy().storage_info_timeout;
        let outcome = tokio::time::timeout(bound, cx.registry.namespace.storage_info(&file)).await;
        match outcome {
            Ok(Ok(storage_info)) => self.context.storage_info = storage_info,
            Ok(Err(e)) => match e.as_not_found() {
                Some(not_found) => self.set_error(not_found),
                None => warn!(request = %self.name, error = %e, "Fetching storage info failed"),
            },
            Err(_) => {
                warn!(request = %self.name, timeout = ?bound, "Timeout fetching storage info");
            }
        }
    }

    async fn handle_command(&mut self, cx: &StepContext<'_>, command: Command) {
        match command {
            Command::Fail(error) => {
                info!(request = %self.name, code = error.code, "Failed by operator");
                self.clear_steering(cx);
                self.set_error(error);
                self.next_step(cx, State::Done, Flow::Continue);
            }
            Command::Retry {
                update_storage_info,
            } => {
                info!(request = %self.name, "Retry enforced");
                self.status = "Retry enforced".to_string();
                self.retry_counter = 0;
                self.clear_steering(cx);
                cx.registry.cost.invalidate(&self.file);
                self.error = None;
                if update_storage_info {
                    self.refresh_storage_info(cx).await;
                }
                self.next_step(cx, State::Init, Flow::Continue);
            }
            Command::Alive => {
                let expired = self
                    .wait_until
                    .is_some_and(|deadline| Instant::now() >= deadline);
                if expired {
                    debug!(request = %self.name, "Retry timer expired");
                    self.next_step(cx, State::Init, Flow::Continue);
                    self.clear_steering(cx);
                } else {
                    self.pinger.alive(cx.registry, cx.actor, &self.file);
                }
            }
        }
    }

    // =========================================================================
    // DONE
    // =========================================================================

    fn on_done(&mut self, cx: &StepContext<'_>) {
        self.clear_steering(cx);

        let policy = cx.registry.policy();
        let limit = if self.error.is_some() {
            usize::MAX
        } else {
            policy.max_request_clumping
        };
        let reply = match (&self.error, &self.pool_candidate) {
            (Some(e), _) => Err(e.clone()),
            (None, Some(pool)) => Ok(PoolSelection {
                pool: pool.pool.clone(),
            }),
            (None, None) => Err(RequestError::new(
                codes::SELECTION_FAILED,
                "No pool candidate selected",
            )),
        };

        let clients = cx.actor.take_clients(limit);
        let answered = clients.len();
        for client in clients {
            // The client may have given up waiting.
            let _ = client.send(reply.clone());
        }
        cx.registry
            .stats
            .answered
            .fetch_add(answered as u64, Ordering::Relaxed);

        match &reply {
            Ok(selection) => {
                info!(request = %self.name, pool = %selection.pool, answered, "Request answered")
            }
            Err(e) => info!(request = %self.name, error = %e, answered, "Request answered with error"),
        }

        if !cx.registry.deregister(cx.actor) {
            // More clients are waiting; start over for them.
            self.next_step(cx, State::Init, Flow::Continue);
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Sends a tracked pool message, superseding the current wait.
    fn track(
        &mut self,
        cx: &StepContext<'_>,
        kind: CorrelationKind,
        destination: &str,
        request: PoolRequest,
        limit: Option<usize>,
    ) -> Result<(), RequestError> {
        if let Some(previous) = self.waiting_for.take() {
            cx.registry.forget(previous);
        }
        match cx
            .registry
            .send_tracked(cx.actor, kind, destination, request, limit)
        {
            Ok(correlation) => {
                self.waiting_for = Some(correlation);
                Ok(())
            }
            Err(TrackedSendError::OutOfResources) => Err(RequestError::new(
                codes::RESOURCE_UNAVAILABLE,
                "Resource temporarily unavailable",
            )),
            Err(TrackedSendError::Send(e)) => Err(RequestError::new(
                codes::SELECTION_FAILED,
                format!("Failed to send {} request to {} : {}", kind, destination, e),
            )),
        }
    }

    /// Drops the pending wait, the retry timer and the pinger.
    fn clear_steering(&mut self, cx: &StepContext<'_>) {
        if let Some(correlation) = self.waiting_for.take() {
            cx.registry.forget(correlation);
        }
        self.wait_until = None;
        self.pinger.stop(cx.registry);
    }

    fn warn_operator(&self, cx: &StepContext<'_>, prefix: &str) {
        let (return_code, message) = match &self.error {
            Some(e) => (e.code, format!("{} {}", prefix, e.message)),
            None => (0, prefix.to_string()),
        };
        warn!(request = %self.name, code = return_code, "{}", message);
        cx.registry.notify(Notification::Warning {
            file: self.file.clone(),
            storage_info: self.context.storage_info.clone(),
            return_code,
            message,
        });
    }
}

/// Interprets a ping reply, or rejects a reply of the wrong kind.
fn check_file_outcome(reply: PoolReply, invalid_code: i32) -> ReplyOutcome {
    match reply {
        PoolReply::CheckFile { waiting: true, .. } => ReplyOutcome::Pending,
        PoolReply::CheckFile { have: true, .. } => ReplyOutcome::Ok,
        PoolReply::CheckFile { .. } => ReplyOutcome::Failed(RequestError::new(
            codes::UNEXPECTED,
            "Pool reports file neither present nor pending",
        )),
        other => ReplyOutcome::Failed(RequestError::new(
            invalid_code,
            format!("Invalid message arrived : {}", other.kind()),
        )),
    }
}
