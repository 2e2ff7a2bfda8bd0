//! File, request and cost-matrix types shared by the selection algorithms
//! and the request container.
//!
//! The cost matrix itself is produced by an external component (the
//! location/cost module of the pool manager). This crate only consumes it
//! through the [`CostMatrixSource`] trait, fresh on every algorithm run.

mod cost;
mod parameters;

pub use cost::{
    CostCandidate, CostMatrix, CostMatrixSource, Direction, LocationQuery, MatrixRow,
    ReadLocation, SelectionUnit, HOSTNAME_TAG,
};
pub use parameters::{ParameterStore, PoolManagerParameters, SameHostPolicy};

use std::fmt;

/// Host name used when the protocol carries no client address.
pub const NO_SUCH_HOST: &str = "NoSuchHost";

/// Namespace identifier of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Storage descriptor of a file as known by the namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageInfo {
    /// Storage class used by the cost module to pick pool groups.
    pub storage_class: String,
    /// Archive (HSM) instance name.
    pub hsm: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Whether a copy exists on the backing archive.
    pub is_stored: bool,
}

/// Transfer protocol the client wants to read with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub protocol: String,
    pub major_version: u32,
    /// Client hosts; the first one decides the network class.
    pub hosts: Vec<String>,
}

impl ProtocolInfo {
    pub fn new(protocol: impl Into<String>, major_version: u32, host: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            major_version,
            hosts: vec![host.into()],
        }
    }

    /// `<protocol>/<major>` as understood by the selection unit.
    pub fn protocol_version(&self) -> String {
        format!("{}/{}", self.protocol, self.major_version)
    }

    /// The host whose network class is used for the request key.
    pub fn client_host(&self) -> &str {
        self.hosts.first().map(String::as_str).unwrap_or(NO_SUCH_HOST)
    }
}

/// Requested state of the replica created by a pool-to-pool copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestinationFileStatus {
    #[default]
    Undetermined,
    Cached,
    Precious,
}

impl fmt::Display for DestinationFileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Undetermined => "undetermined",
            Self::Cached => "cached",
            Self::Precious => "precious",
        };
        f.write_str(s)
    }
}

/// Identity of one decision process.
///
/// Two client requests with equal keys share one request actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub file: FileId,
    pub net: String,
    pub protocol: String,
    pub replicate: bool,
}

impl RequestKey {
    /// Canonical name, `<file>@<net>-<protocol>[-p2p]`.
    pub fn canonical_name(&self) -> String {
        format!(
            "{}@{}-{}{}",
            self.file,
            self.net,
            self.protocol,
            if self.replicate { "-p2p" } else { "" }
        )
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}
