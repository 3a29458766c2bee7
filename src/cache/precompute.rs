//! Background warming of the expansion cache.
//!
//! After a view is served, the clusters a user is likely to expand next are
//! the ones currently visible. The precomputer evaluates them on a single
//! worker thread, highest priority first, and stores the results through the
//! same cache the request path reads. Requests are deduplicated against both
//! the cache and the queue by cluster id and member set.
//!
//! Stopping the service lets an in-flight evaluation finish and drops
//! whatever is still queued.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::{ExpansionCache, StrategyCache};
use crate::error::{Error, Result};
use crate::expansion::{EvaluationContext, ExpansionEvaluator};
use crate::id::ClusterId;
use crate::snapshot::Snapshot;

/// Lifecycle of the background worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// No worker thread.
    Stopped,
    /// Accepting and processing requests.
    Running,
    /// Finishing the in-flight evaluation.
    Stopping,
}

/// One cluster to evaluate ahead of time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecomputeRequest {
    /// Cluster to evaluate.
    pub cluster_id: ClusterId,
    /// Its member accounts.
    pub members: Vec<u32>,
    /// Higher runs first.
    pub priority: u32,
}

#[derive(Debug)]
struct Queued {
    request: PrecomputeRequest,
    seq: u64,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Max-heap: higher priority first, then FIFO.
    fn cmp(&self, other: &Self) -> Ordering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Message {
    Compute(Queued),
    Shutdown,
}

struct Shared {
    snapshot: Arc<Snapshot>,
    evaluator: Arc<ExpansionEvaluator>,
    cache: Arc<ExpansionCache>,
    /// Waiting or in-flight requests, by id and sorted members.
    queued: Mutex<HashSet<(ClusterId, Vec<u32>)>>,
    processed: AtomicUsize,
}

impl Shared {
    fn process(&self, request: PrecomputeRequest) {
        let PrecomputeRequest { cluster_id, members, .. } = request;
        if !self.cache.contains(&cluster_id, &members) {
            let start = Instant::now();
            let ctx = EvaluationContext::from_snapshot(&self.snapshot, &members);
            let ranked = self.evaluator.evaluate(&ctx);
            let computation_ms = start.elapsed().as_secs_f64() * 1000.0;
            log::debug!(
                "precomputed {cluster_id} ({} members) in {computation_ms:.1}ms",
                members.len()
            );
            self.cache.put(cluster_id.clone(), &members, ranked, computation_ms);
            self.processed.fetch_add(1, AtomicOrdering::Relaxed);
        }
        self.queued.lock().remove(&(cluster_id, members));
    }

    fn run(&self, rx: Receiver<Message>) {
        let mut heap = BinaryHeap::new();
        'outer: loop {
            if heap.is_empty() {
                match rx.recv() {
                    Ok(Message::Compute(q)) => heap.push(q),
                    Ok(Message::Shutdown) | Err(_) => break,
                }
            }
            loop {
                match rx.try_recv() {
                    Ok(Message::Compute(q)) => heap.push(q),
                    Ok(Message::Shutdown) | Err(TryRecvError::Disconnected) => break 'outer,
                    Err(TryRecvError::Empty) => break,
                }
            }
            if let Some(next) = heap.pop() {
                self.process(next.request);
            }
        }
        let dropped = heap.len();
        self.queued.lock().clear();
        if dropped > 0 {
            log::info!("precompute worker stopped with {dropped} requests pending");
        }
    }
}

/// Single-worker background evaluator feeding an [`ExpansionCache`].
pub struct Precomputer {
    shared: Arc<Shared>,
    status: RwLock<ServiceStatus>,
    sender: Mutex<Option<Sender<Message>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    seq: AtomicU64,
}

impl std::fmt::Debug for Precomputer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Precomputer")
            .field("status", &self.status())
            .field("queued", &self.queued_len())
            .field("processed", &self.processed())
            .finish()
    }
}

impl Precomputer {
    /// A stopped precomputer.
    pub fn new(
        snapshot: Arc<Snapshot>,
        evaluator: Arc<ExpansionEvaluator>,
        cache: Arc<ExpansionCache>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                snapshot,
                evaluator,
                cache,
                queued: Mutex::new(HashSet::new()),
                processed: AtomicUsize::new(0),
            }),
            status: RwLock::new(ServiceStatus::Stopped),
            sender: Mutex::new(None),
            handle: Mutex::new(None),
            seq: AtomicU64::new(0),
        }
    }

    /// Spawn the worker thread.
    pub fn start(&self) -> Result<()> {
        let mut status = self.status.write();
        if *status != ServiceStatus::Stopped {
            return Err(Error::PrecomputerAlreadyRunning);
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("zoomtree-precompute".into())
            .spawn(move || shared.run(rx))
            .map_err(|e| Error::WorkerSpawn(e.to_string()))?;

        *self.sender.lock() = Some(tx);
        *self.handle.lock() = Some(handle);
        *status = ServiceStatus::Running;
        log::info!("precompute worker started");
        Ok(())
    }

    /// Stop the worker, waiting for the in-flight evaluation. Idempotent.
    pub fn stop(&self) {
        {
            let mut status = self.status.write();
            if *status != ServiceStatus::Running {
                return;
            }
            *status = ServiceStatus::Stopping;
        }

        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(Message::Shutdown);
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::warn!("precompute worker panicked");
            }
        }

        *self.status.write() = ServiceStatus::Stopped;
        log::info!("precompute worker stopped");
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ServiceStatus {
        *self.status.read()
    }

    /// Whether the worker accepts requests.
    pub fn is_running(&self) -> bool {
        self.status() == ServiceStatus::Running
    }

    /// Queue a cluster. Returns `false` when it is already cached or queued
    /// with the same members, or the worker is not running.
    pub fn enqueue(&self, request: PrecomputeRequest) -> bool {
        if !self.is_running() {
            log::debug!(
                "precompute request for {} ignored: worker not running",
                request.cluster_id
            );
            return false;
        }
        if self.shared.cache.contains(&request.cluster_id, &request.members) {
            return false;
        }
        let key = (request.cluster_id.clone(), request.members.clone());
        if !self.shared.queued.lock().insert(key.clone()) {
            return false;
        }

        let queued = Queued {
            request,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
        };
        let sent = self
            .sender
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(Message::Compute(queued)).is_ok());
        if !sent {
            self.shared.queued.lock().remove(&key);
        }
        sent
    }

    /// Queue every visible cluster, earlier entries first. Returns how many
    /// were newly queued.
    pub fn visible_set_changed<I>(&self, visible: I) -> usize
    where
        I: IntoIterator<Item = (ClusterId, Vec<u32>)>,
    {
        let visible: Vec<_> = visible.into_iter().collect();
        let n = visible.len();
        let queued = visible
            .into_iter()
            .enumerate()
            .filter(|(pos, (cluster_id, members))| {
                self.enqueue(PrecomputeRequest {
                    cluster_id: cluster_id.clone(),
                    members: members.clone(),
                    priority: (n - pos) as u32,
                })
            })
            .count();
        log::debug!("visible set changed: queued {queued} of {n} clusters");
        queued
    }

    /// Requests waiting or in flight.
    pub fn queued_len(&self) -> usize {
        self.shared.queued.lock().len()
    }

    /// Clusters evaluated since creation.
    pub fn processed(&self) -> usize {
        self.shared.processed.load(AtomicOrdering::Relaxed)
    }
}

impl Drop for Precomputer {
    fn drop(&mut self) {
        self.stop();
    }
}
