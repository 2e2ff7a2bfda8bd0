//! Request error codes and the crate's error types.
//!
//! Failures of the selection process itself are not Rust errors: they are
//! recorded on the request as a [`RequestError`] (numeric code plus message)
//! and only surfaced to clients when the request is answered. The `thiserror`
//! enums in this module cover the crate's own fallible API (submission,
//! collaborator calls).

use crate::location::FileId;
use thiserror::Error;

/// Numeric return codes attached to answered requests and operator warnings.
pub mod codes {
    /// Generic failure, default for operator-injected outcomes.
    pub const GENERIC: i32 = 1;

    /// Too many concurrent stage requests.
    pub const RESOURCE_UNAVAILABLE: i32 = 5;

    /// Unexpected condition while handling a reply.
    pub const UNEXPECTED: i32 = 102;

    /// Cost of the cheapest pool exceeds the panic threshold.
    pub const PANIC_COST: i32 = 125;

    /// Cost exceeded and neither staging nor pool-to-pool is allowed.
    pub const COST_EXCEEDED: i32 = 127;

    /// Unexpected failure during selection or while sending.
    pub const SELECTION_FAILED: i32 = 128;

    /// No permission-matrix entries for the request.
    pub const NO_PERMISSION_ENTRIES: i32 = 130;

    /// Pool-to-pool attempted without any source.
    pub const P2P_NO_SOURCE: i32 = 132;

    /// The file already has the maximum number of copies.
    pub const P2P_TOO_MANY_COPIES: i32 = 133;

    /// Every source pool is above the alert cost.
    pub const P2P_SOURCES_BUSY: i32 = 134;

    /// No destination candidates configured for pool-to-pool.
    pub const P2P_NO_CANDIDATES: i32 = 136;

    /// No usable destination (already everywhere, too expensive, same host).
    pub const P2P_NO_DESTINATION: i32 = 137;

    /// No staging candidates configured.
    pub const STAGE_NO_CANDIDATES: i32 = 149;

    /// No staging candidate below the cost limits.
    pub const STAGE_NO_CHEAP_CANDIDATES: i32 = 150;

    /// Pool-to-pool failed and no pool holding the file is known.
    pub const PANIC_NO_POOL_COST: i32 = 192;

    /// Sources too busy and no pool holding the file is known.
    pub const PANIC_NO_POOL_SOURCE: i32 = 194;

    /// A stage wait received a reply of the wrong kind.
    pub const INVALID_STAGE_REPLY: i32 = 204;

    /// A pool-to-pool wait received a reply of the wrong kind.
    pub const INVALID_P2P_REPLY: i32 = 205;

    /// Pool-to-pool transfer is not permitted and staging is impossible.
    pub const P2P_NOT_PERMITTED: i32 = 265;

    /// Incoming requests or staging are suspended by the operator.
    pub const SUSPEND_ENFORCED: i32 = 1005;

    /// The file is on no pool and there is no archive to stage from.
    pub const POOL_UNAVAILABLE: i32 = 1010;

    /// The file does not exist.
    pub const FILE_NOT_FOUND: i32 = 10001;

    /// The file is no longer part of the namespace.
    pub const NOT_IN_NAMESPACE: i32 = 10002;

    /// The archive asked to defer the stage.
    pub const HSM_DELAY: i32 = 10011;
}

/// A failed selection outcome: return code plus human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct RequestError {
    pub code: i32,
    pub message: String,
}

impl RequestError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns true for errors that end the request regardless of retry policy.
    pub fn is_not_found(&self) -> bool {
        is_not_found_code(self.code)
    }
}

/// Returns true if `code` means the file is gone from the namespace.
pub fn is_not_found_code(code: i32) -> bool {
    code == codes::FILE_NOT_FOUND || code == codes::NOT_IN_NAMESPACE
}

/// Errors returned when a client request cannot be accepted.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The protocol of the request is not known to the selection unit.
    #[error("Protocol not found : {0}")]
    UnknownProtocol(String),

    /// A replicate message arrived that is already a reply.
    #[error("Unexpected replicate request for {0} (is a reply)")]
    ReplicateIsReply(FileId),
}

impl From<SubmitError> for RequestError {
    fn from(e: SubmitError) -> Self {
        RequestError::new(codes::SELECTION_FAILED, e.to_string())
    }
}

/// Errors from administrative commands.
#[derive(Debug, Error)]
pub enum AdminError {
    /// No request with this name.
    #[error("Not found : {0}")]
    NotFound(String),

    #[error("Invalid argument : {0}")]
    InvalidArgument(String),

    /// The command line could not be parsed; carries the usage text.
    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Errors from sending messages to pools or notification destinations.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// No route to the destination.
    #[error("no route to {0}")]
    NoRoute(String),

    /// The transport has shut down.
    #[error("transport closed")]
    Closed,
}

/// Errors from the namespace service.
#[derive(Debug, Clone, Error)]
pub enum NamespaceError {
    /// The file does not exist.
    #[error("file not found: {0}")]
    NotFound(FileId),

    /// The file has been removed from the namespace.
    #[error("file not in namespace: {0}")]
    NotInNamespace(FileId),

    /// The lookup failed for another reason.
    #[error("namespace lookup failed: {0}")]
    Failed(String),
}

impl NamespaceError {
    /// Maps a not-found style error to its request error, if it is one.
    pub fn as_not_found(&self) -> Option<RequestError> {
        match self {
            Self::NotFound(_) => Some(RequestError::new(codes::FILE_NOT_FOUND, "File not found")),
            Self::NotInNamespace(_) => {
                Some(RequestError::new(codes::NOT_IN_NAMESPACE, "File not found"))
            }
            Self::Failed(_) => None,
        }
    }
}
