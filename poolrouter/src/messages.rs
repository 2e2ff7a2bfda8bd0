//! Logical messages exchanged with clients, pools and notification sinks.
//!
//! Wire encoding is the transport's business; these types only carry the
//! fields the container needs.

use crate::error::RequestError;
use crate::location::{DestinationFileStatus, FileId, ProtocolInfo, StorageInfo};
use std::fmt;

/// Identifier tying an outbound pool message to its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// Client request: "give me a pool I can read this file from".
#[derive(Debug, Clone)]
pub struct SelectReadPool {
    pub file: FileId,
    pub storage_info: StorageInfo,
    pub protocol_info: ProtocolInfo,
    pub link_group: Option<String>,
    /// Present when the client asks for a new replica instead of a read.
    pub replicate: Option<ReplicateRequest>,
}

impl SelectReadPool {
    pub fn new(file: FileId, storage_info: StorageInfo, protocol_info: ProtocolInfo) -> Self {
        Self {
            file,
            storage_info,
            protocol_info,
            link_group: None,
            replicate: None,
        }
    }

    pub fn replicate(mut self, destination_status: DestinationFileStatus) -> Self {
        self.replicate = Some(ReplicateRequest {
            destination_status,
            is_reply: false,
        });
        self
    }
}

/// Replicate flags of a client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicateRequest {
    pub destination_status: DestinationFileStatus,
    /// Set when the message is itself a reply; such messages are rejected.
    pub is_reply: bool,
}

/// Successful answer to a [`SelectReadPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSelection {
    pub pool: String,
}

/// What a client eventually receives.
pub type SelectionReply = Result<PoolSelection, RequestError>;

/// Requests sent to pools.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolRequest {
    /// Restore the file from the archive onto `pool`.
    FetchFile {
        pool: String,
        file: FileId,
        storage_info: StorageInfo,
    },
    /// Copy the file from `source` to `destination`; sent to the destination.
    PoolToPool {
        source: String,
        destination: String,
        file: FileId,
        storage_info: StorageInfo,
        destination_status: DestinationFileStatus,
    },
    /// Liveness check: does `pool` have, or is it still fetching, the file?
    CheckFile { pool: String, file: FileId },
}

impl PoolRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FetchFile { .. } => "fetch",
            Self::PoolToPool { .. } => "pool-to-pool",
            Self::CheckFile { .. } => "check-file",
        }
    }
}

/// Replies coming back from pools.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolReply {
    FetchFile {
        return_code: i32,
        error: Option<String>,
    },
    PoolToPool {
        return_code: i32,
        error: Option<String>,
    },
    CheckFile {
        waiting: bool,
        have: bool,
    },
    /// A reply type the container does not know how to interpret.
    Unexpected(String),
}

impl PoolReply {
    pub fn kind(&self) -> &str {
        match self {
            Self::FetchFile { .. } => "fetch",
            Self::PoolToPool { .. } => "pool-to-pool",
            Self::CheckFile { .. } => "check-file",
            Self::Unexpected(kind) => kind,
        }
    }
}

/// Fire-and-forget notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Operator warning on suspend and fail transitions.
    Warning {
        file: FileId,
        storage_info: StorageInfo,
        return_code: i32,
        message: String,
    },
    /// Whether a read was served from a pool already holding the file.
    Hit {
        file: FileId,
        pool: String,
        cached: bool,
    },
    /// Cost of the pool a read was forced onto.
    Cost {
        file: FileId,
        pool: String,
        cost: f64,
    },
}

/// Pool state change reported by the pool monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    Up,
    Down,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("UP"),
            Self::Down => f.write_str("DOWN"),
        }
    }
}
