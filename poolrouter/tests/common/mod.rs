//! Fakes for the container's collaborators, shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use poolrouter::config::ConfigFile;
use poolrouter::container::{Collaborators, Dispatcher};
use poolrouter::error::{NamespaceError, RequestError, SendError};
use poolrouter::location::{
    CostCandidate, CostMatrix, CostMatrixSource, Direction, FileId, LocationQuery, MatrixRow,
    PoolManagerParameters, ProtocolInfo, ReadLocation, SelectionUnit, StorageInfo,
};
use poolrouter::messages::{CorrelationId, Notification, PoolRequest, SelectReadPool};
use poolrouter::transport::{NamespaceClient, PoolTransport};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Cost module
// =============================================================================

/// Cost source whose answers the test changes while requests run.
#[derive(Default)]
pub struct FakeCostSource {
    location: Mutex<ReadLocation>,
    matrices: Mutex<HashMap<Direction, CostMatrix>>,
    read_calls: AtomicUsize,
    invalidations: AtomicUsize,
}

impl FakeCostSource {
    pub fn set_location(&self, location: ReadLocation) {
        *self.location.lock() = location;
    }

    pub fn set_matrix(&self, direction: Direction, pools: &[(&str, f64)]) {
        self.matrices
            .lock()
            .insert(direction, CostMatrix::new(vec![MatrixRow::new(candidates(pools))]));
    }

    pub fn set_matrix_with(
        &self,
        direction: Direction,
        pools: &[(&str, f64)],
        parameters: PoolManagerParameters,
    ) {
        let row = MatrixRow::new(candidates(pools)).with_parameters(parameters);
        self.matrices
            .lock()
            .insert(direction, CostMatrix::new(vec![row]));
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl CostMatrixSource for FakeCostSource {
    fn read_location(&self, _query: &LocationQuery) -> Result<ReadLocation, RequestError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.location.lock().clone())
    }

    fn fetch_matrix(
        &self,
        direction: Direction,
        _query: &LocationQuery,
    ) -> Result<CostMatrix, RequestError> {
        Ok(self
            .matrices
            .lock()
            .get(&direction)
            .cloned()
            .unwrap_or_default())
    }

    fn invalidate(&self, _file: &FileId) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn candidates(pools: &[(&str, f64)]) -> Vec<CostCandidate> {
    pools
        .iter()
        .map(|(pool, cost)| CostCandidate::new(*pool, *cost))
        .collect()
}

/// The file is on `pools`, all readable.
pub fn held_by(pools: &[(&str, f64)]) -> ReadLocation {
    let holders = candidates(pools);
    ReadLocation {
        matrix: CostMatrix::new(vec![MatrixRow::new(holders.clone())]),
        allowed_pool_count: 4,
        holding_pools: holders.iter().map(|c| c.pool.clone()).collect(),
        available_pool_count: holders.len(),
        sources: holders,
    }
}

/// The file is on `pools`, none of them readable, under row `parameters`.
pub fn held_unreadable(pools: &[(&str, f64)], parameters: PoolManagerParameters) -> ReadLocation {
    let holders = candidates(pools);
    ReadLocation {
        matrix: CostMatrix::new(vec![
            MatrixRow::new(holders.clone()).with_parameters(parameters)
        ]),
        allowed_pool_count: 4,
        holding_pools: holders.iter().map(|c| c.pool.clone()).collect(),
        available_pool_count: 0,
        sources: holders,
    }
}

/// No pool holds the file.
pub fn nowhere() -> ReadLocation {
    ReadLocation {
        matrix: CostMatrix::new(vec![MatrixRow::new(vec![])]),
        allowed_pool_count: 4,
        holding_pools: vec![],
        available_pool_count: 0,
        sources: vec![],
    }
}

// =============================================================================
// Selection unit
// =============================================================================

/// Every host is on the `lan` network; only `DCap/3` is known.
pub struct FakeSelectionUnit;

impl SelectionUnit for FakeSelectionUnit {
    fn net_identifier(&self, _host: &str) -> String {
        "lan".to_string()
    }

    fn protocol_unit(&self, protocol_version: &str) -> Option<String> {
        (protocol_version == "DCap/3").then(|| "dcap-3".to_string())
    }
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Debug, Clone)]
pub struct Sent {
    pub correlation: CorrelationId,
    pub destination: String,
    pub request: PoolRequest,
}

/// Records every outbound message.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    notifications: Mutex<Vec<(String, Notification)>>,
    refuse: AtomicBool,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    /// Sent messages of one kind (`fetch`, `pool-to-pool`, `check-file`).
    pub fn sent_of(&self, kind: &str) -> Vec<Sent> {
        self.sent
            .lock()
            .iter()
            .filter(|s| s.request.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn notifications(&self) -> Vec<(String, Notification)> {
        self.notifications.lock().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.notifications
            .lock()
            .iter()
            .filter_map(|(_, n)| match n {
                Notification::Warning { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn refuse_sends(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl PoolTransport for RecordingTransport {
    fn send(
        &self,
        correlation: CorrelationId,
        destination: &str,
        request: PoolRequest,
    ) -> Result<(), SendError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SendError::NoRoute(destination.to_string()));
        }
        self.sent.lock().push(Sent {
            correlation,
            destination: destination.to_string(),
            request,
        });
        Ok(())
    }

    fn notify(&self, destination: &str, notification: Notification) -> Result<(), SendError> {
        self.notifications
            .lock()
            .push((destination.to_string(), notification));
        Ok(())
    }
}

// =============================================================================
// Namespace
// =============================================================================

/// Namespace where every file exists and is stored on tape, unless removed.
#[derive(Default)]
pub struct FakeNamespace {
    removed: Mutex<HashSet<FileId>>,
    lookups: AtomicUsize,
}

impl FakeNamespace {
    pub fn remove(&self, file: &str) {
        self.removed.lock().insert(FileId::new(file));
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl NamespaceClient for FakeNamespace {
    fn storage_info<'a>(
        &'a self,
        file: &'a FileId,
    ) -> Pin<Box<dyn Future<Output = Result<StorageInfo, NamespaceError>> + Send + 'a>> {
        Box::pin(async move {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.removed.lock().contains(file) {
                Err(NamespaceError::NotFound(file.clone()))
            } else {
                Ok(stored())
            }
        })
    }
}

pub fn stored() -> StorageInfo {
    StorageInfo {
        storage_class: "raw:data".to_string(),
        hsm: "osm".to_string(),
        file_size: 1024,
        is_stored: true,
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub cost: Arc<FakeCostSource>,
    pub transport: Arc<RecordingTransport>,
    pub namespace: Arc<FakeNamespace>,
}

impl Harness {
    pub fn new(config: ConfigFile) -> Self {
        let cost = Arc::new(FakeCostSource::default());
        let transport = Arc::new(RecordingTransport::default());
        let namespace = Arc::new(FakeNamespace::default());
        let dispatcher = Dispatcher::new(
            &config,
            Collaborators {
                cost: cost.clone(),
                selection: Arc::new(FakeSelectionUnit),
                transport: transport.clone(),
                namespace: namespace.clone(),
            },
        );
        Self {
            dispatcher,
            cost,
            transport,
            namespace,
        }
    }
}

/// Configuration with an archive backend and a short retry timer.
pub fn staging_config() -> ConfigFile {
    let mut config = ConfigFile::default();
    config.partition.has_hsm_backend = true;
    config.container.retry_timer_secs = 1;
    config
}

pub fn read_request(file: &str, host: &str) -> SelectReadPool {
    SelectReadPool::new(
        FileId::new(file),
        stored(),
        ProtocolInfo::new("DCap", 3, host),
    )
}

/// Canonical request name for a read of `file` from the `lan` network.
pub fn request_name(file: &str) -> String {
    format!("{}@lan-dcap-3", file)
}

/// Polls `condition` until it holds, letting the container make progress.
///
/// Panics after ten (virtual) seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
