//! Per-key request actor: mailbox, waiting clients and execution loop.
//!
//! ```text
//!   submit ─┐                     ┌─► step(Nil)   (continue)
//!   reply  ─┼─► mailbox (FIFO) ───┤
//!   admin  ─┘     │ active flag   └─► step(input) (wait)
//!                 ▼
//!          one loop at a time on the worker pool
//! ```
//!
//! The activation flag lives under the same lock as the queue, so a post
//! either hands its input to the running loop or starts a new one, never
//! both.

use super::engine::{ActorCore, StepContext};
use super::registry::Registry;
use super::state::RequestSummary;
use crate::error::RequestError;
use crate::location::{
    CostCandidate, DestinationFileStatus, PoolManagerParameters, ProtocolInfo, RequestKey,
    StorageInfo,
};
use crate::messages::{CorrelationId, PoolReply, SelectionReply};
use chrono::{DateTime, Local};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Items delivered through an actor's mailbox.
#[derive(Debug)]
pub(crate) enum Input {
    /// Start processing a freshly created actor.
    Kick,
    /// A pool answered a message sent by this actor.
    Reply {
        correlation: CorrelationId,
        reply: PoolReply,
    },
    Command(Command),
}

/// Out-of-band control inputs.
#[derive(Debug, Clone)]
pub(crate) enum Command {
    /// Restart from INIT with a fresh retry counter.
    Retry { update_storage_info: bool },
    /// Answer all clients with this error.
    Fail(RequestError),
    /// Liveness check from the sweeper or the retry timer.
    Alive,
}

#[derive(Debug, Default)]
struct Mailbox {
    queue: VecDeque<Input>,
    active: bool,
}

/// Request attributes fixed at creation, apart from the storage descriptor
/// which may be refreshed.
#[derive(Debug, Clone)]
pub(crate) struct RequestContext {
    pub(crate) storage_info: StorageInfo,
    pub(crate) protocol_info: ProtocolInfo,
    pub(crate) link_group: Option<String>,
    pub(crate) enforce_p2p: bool,
    pub(crate) destination_status: DestinationFileStatus,
}

pub(crate) struct RequestActor {
    name: String,
    started: DateTime<Local>,
    mailbox: Mutex<Mailbox>,
    clients: Mutex<VecDeque<oneshot::Sender<SelectionReply>>>,
    core: tokio::sync::Mutex<ActorCore>,
    summary: Mutex<RequestSummary>,
}

impl std::fmt::Debug for RequestActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestActor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl RequestActor {
    pub(crate) fn new(
        key: RequestKey,
        context: RequestContext,
        partition: Arc<PoolManagerParameters>,
    ) -> Self {
        let name = key.canonical_name();
        let started = Local::now();
        let core = ActorCore::new(key.file.clone(), name.clone(), context, partition);
        let summary = core.summary(started, 0);
        Self {
            name,
            started,
            mailbox: Mutex::new(Mailbox::default()),
            clients: Mutex::new(VecDeque::new()),
            core: tokio::sync::Mutex::new(core),
            summary: Mutex::new(summary),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    // =========================================================================
    // Mailbox
    // =========================================================================

    /// Appends `input`; returns true if the caller must start the loop.
    pub(crate) fn enqueue(&self, input: Input) -> bool {
        let mut mailbox = self.mailbox.lock();
        mailbox.queue.push_back(input);
        if mailbox.active {
            false
        } else {
            mailbox.active = true;
            true
        }
    }

    /// Pops the next input, releasing the activation flag when empty.
    fn next_input(&self) -> Option<Input> {
        let mut mailbox = self.mailbox.lock();
        let input = mailbox.queue.pop_front();
        if input.is_none() {
            mailbox.active = false;
        }
        input
    }

    // =========================================================================
    // Waiting clients
    // =========================================================================

    pub(crate) fn add_client(&self, client: oneshot::Sender<SelectionReply>) {
        self.clients.lock().push_back(client);
    }

    /// Removes up to `limit` waiting clients, oldest first.
    pub(crate) fn take_clients(&self, limit: usize) -> Vec<oneshot::Sender<SelectionReply>> {
        let mut clients = self.clients.lock();
        let count = limit.min(clients.len());
        clients.drain(..count).collect()
    }

    pub(crate) fn has_clients(&self) -> bool {
        !self.clients.lock().is_empty()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Listing view as of the last completed step.
    pub(crate) fn summary(&self) -> RequestSummary {
        let mut summary = self.summary.lock().clone();
        summary.queued = self.clients.lock().len();
        summary
    }

    /// Pool the request currently depends on.
    pub(crate) fn candidate_pool(&self) -> Option<String> {
        self.summary.lock().pool.clone()
    }

    pub(crate) fn error_code(&self) -> i32 {
        self.summary.lock().error_code
    }

    // =========================================================================
    // Execution loop
    // =========================================================================

    /// Drains the mailbox until it is empty and no continuation is pending.
    pub(crate) async fn run(self: Arc<Self>, registry: Arc<Registry>) {
        let mut core = self.core.lock().await;
        loop {
            let input = if core.take_continue() {
                None
            } else {
                match self.next_input() {
                    Some(input) => Some(input),
                    None => break,
                }
            };

            let cx = StepContext {
                registry: &registry,
                actor: &self,
            };
            let outcome = AssertUnwindSafe(core.step(&cx, input)).catch_unwind().await;
            if outcome.is_err() {
                error!(request = %self.name, state = %core.state(), "Request step panicked");
                core.reset_continue();
            }

            let queued = self.clients.lock().len();
            *self.summary.lock() = core.summary(self.started, queued);
        }
        debug!(request = %self.name, state = %core.state(), "Request idle");
    }
}

/// Pool candidate as shown in listings.
pub(crate) fn candidate_label(
    pool: Option<&CostCandidate>,
    source: Option<&CostCandidate>,
    destination: Option<&CostCandidate>,
) -> String {
    use super::state::POOL_UNKNOWN;
    match (pool, destination) {
        (Some(pool), _) => pool.pool.clone(),
        (None, Some(destination)) => format!(
            "{}->{}",
            source.map(|s| s.pool.as_str()).unwrap_or(POOL_UNKNOWN),
            destination.pool
        ),
        (None, None) => POOL_UNKNOWN.to_string(),
    }
}
