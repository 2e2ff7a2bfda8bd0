//! Request container: one actor per request key, driven to a readable pool.
//!
//! # Architecture
//!
//! ```text
//!   client ──submit──► Dispatcher ──► Registry { key → RequestActor }
//!                          │                        │ mailbox (FIFO)
//!   pool ───route_reply────┤                        ▼
//!                          │               ActorCore state machine
//!   monitor ─pool_status───┤                   │         │
//!                          │          selection::*   PoolTransport
//!   Sweeper ──sweep────────┘                   │
//!                                     correlation table (weak)
//! ```
//!
//! Concurrent requests for the same key are clumped onto one actor. Each
//! actor processes its mailbox on at most one worker at a time; different
//! actors run in parallel on a bounded [`WorkerPool`](workers::WorkerPool).
//! Pool replies find their actor through the correlation table, which only
//! holds weak references and is pruned whenever a wait is cleared.
//!
//! # Retry ladder
//!
//! A failed attempt is retried immediately the first time, then after the
//! retry timer while attempts remain. Past `max_retries` the request is
//! suspended or failed according to [`OnError`]. A file missing from the
//! namespace always ends the request.

mod actor;
mod dispatcher;
mod engine;
mod ping;
mod policy;
mod registry;
mod state;
mod sweeper;
mod workers;

pub use dispatcher::{Collaborators, Dispatcher, REPLICATE_PROTOCOL, REPLICATE_PROTOCOL_VERSION};
pub use policy::{ContainerPolicy, OnError};
pub use registry::{CorrelationKind, PendingReply, StatsSnapshot};
pub use state::{RequestSummary, State, POOL_UNKNOWN, STATUS_IDLE};
