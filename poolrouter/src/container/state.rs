//! Actor states and the listing summary.

use chrono::{DateTime, Local};
use std::fmt;

/// Placeholder shown when an actor has no pool candidate.
pub const POOL_UNKNOWN: &str = "<unknown>";

/// Status shown before the first transition.
pub const STATUS_IDLE: &str = "[<idle>]";

/// States of the request state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Done,
    PoolToPool,
    Stage,
    WaitingForStage,
    WaitingForPoolToPool,
    Suspended,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Done => "Done",
            Self::PoolToPool => "Pool2Pool",
            Self::Stage => "Stage",
            Self::WaitingForStage => "WaitingForStage",
            Self::WaitingForPoolToPool => "WaitingForP2P",
            Self::Suspended => "Suspended",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the execution loop proceeds after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Run the next step at once without consuming the mailbox.
    Continue,
    /// Return until the next mailbox item arrives.
    Wait,
}

/// Timestamp used in status strings, `MM.dd HH:mm:ss`.
pub(crate) fn timestamp() -> String {
    Local::now().format("%m.%d %H:%M:%S").to_string()
}

/// Point-in-time view of one actor, as shown by `ls` and `xls`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSummary {
    pub name: String,
    /// Client requests waiting for an answer.
    pub queued: usize,
    pub retry_count: i32,
    pub started: DateTime<Local>,
    /// Chosen pool, `source->destination` for copies, or [`POOL_UNKNOWN`].
    pub candidate: String,
    /// Pool the request currently depends on, if any.
    pub pool: Option<String>,
    pub state: State,
    pub status: String,
    pub error_code: i32,
    pub error_message: String,
}

impl fmt::Display for RequestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} m={} r={} [{}] [{}] {{{},{}}}",
            self.name,
            self.queued,
            self.retry_count,
            self.candidate,
            self.status,
            self.error_code,
            self.error_message
        )
    }
}
