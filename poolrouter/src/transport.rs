//! Seams to the outside world: pools, notification sinks and the namespace.

use crate::error::{NamespaceError, SendError};
use crate::location::{FileId, StorageInfo};
use crate::messages::{CorrelationId, Notification, PoolRequest};
use std::future::Future;
use std::pin::Pin;

/// Outbound message path to pools and notification destinations.
///
/// `send` must not block: replies come back later through
/// [`Dispatcher::route_reply`](crate::container::Dispatcher::route_reply)
/// tagged with the same correlation id.
pub trait PoolTransport: Send + Sync + 'static {
    fn send(
        &self,
        correlation: CorrelationId,
        destination: &str,
        request: PoolRequest,
    ) -> Result<(), SendError>;

    fn notify(&self, destination: &str, notification: Notification) -> Result<(), SendError>;
}

/// Namespace service lookups.
pub trait NamespaceClient: Send + Sync + 'static {
    /// Fetches the current storage descriptor of `file`.
    ///
    /// Callers bound the wait; implementations need not time out themselves.
    fn storage_info<'a>(
        &'a self,
        file: &'a FileId,
    ) -> Pin<Box<dyn Future<Output = Result<StorageInfo, NamespaceError>> + Send + 'a>>;
}
