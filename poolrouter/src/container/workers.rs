//! Bounded worker pool for actor execution loops.
//!
//! Every activation of an actor runs as one tokio task. The pool caps how
//! many of those tasks run at once:
//!
//! ```text
//!   post ──► spawn ──► acquire permit ──► drain mailbox ──► release
//! ```
//!
//! A limit of 0 means unlimited. Changing the limit swaps the semaphore;
//! loops already holding a permit of the old one finish undisturbed.

use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Worker pool for actor execution loops.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    /// `None` when unlimited.
    semaphore: RwLock<Option<Arc<Semaphore>>>,

    /// Configured limit (0 = unlimited)
    max_workers: AtomicUsize,

    /// Loops currently running (for `info`)
    in_flight: Arc<AtomicUsize>,

    /// Peak concurrent loops observed
    peak_in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub(crate) fn new(max_workers: usize) -> Self {
        Self {
            semaphore: RwLock::new(Self::semaphore_for(max_workers)),
            max_workers: AtomicUsize::new(max_workers),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn semaphore_for(max_workers: usize) -> Option<Arc<Semaphore>> {
        (max_workers > 0).then(|| Arc::new(Semaphore::new(max_workers)))
    }

    /// Changes the limit for loops started from now on.
    pub(crate) fn set_max_workers(&self, max_workers: usize) {
        *self.semaphore.write() = Self::semaphore_for(max_workers);
        self.max_workers.store(max_workers, Ordering::Relaxed);
    }

    pub(crate) fn max_workers(&self) -> usize {
        self.max_workers.load(Ordering::Relaxed)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Runs `work` once a worker slot is free.
    pub(crate) fn spawn<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.semaphore.read().clone();
        let in_flight = Arc::clone(&self.in_flight);
        let peak = Arc::clone(&self.peak_in_flight);

        tokio::spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };

            let current = in_flight.fetch_add(1, Ordering::Relaxed) + 1;
            peak.fetch_max(current, Ordering::Relaxed);

            work.await;

            in_flight.fetch_sub(1, Ordering::Relaxed);
        });
    }
}

impl std::fmt::Display for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let max = self.max_workers();
        if max == 0 {
            write!(
                f,
                "unlimited (active={} peak={})",
                self.in_flight(),
                self.peak_in_flight()
            )
        } else {
            write!(
                f,
                "max={} (active={} peak={})",
                max,
                self.in_flight(),
                self.peak_in_flight()
            )
        }
    }
}
