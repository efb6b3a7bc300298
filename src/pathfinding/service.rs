//! Asynchronous path search.
//!
//! Requests become [`SearchJob`]s on a crossbeam channel drained by a fixed
//! pool of named worker threads. Each job carries an immutable
//! [`SearchSnapshot`], so workers never touch the live grid. Finished
//! searches travel back on a completion channel and are turned into
//! [`Path`]s and handed to their callbacks by [`PathSearchService::pump`] on
//! the simulation thread. Callbacks never leave that thread.
//!
//! With `worker_count = 0` no threads are spawned and `pump` runs the queued
//! searches itself, in submission order.

use super::astar::{self, SearchParams, SearchSnapshot};
use super::error::PathError;
use super::movement::MovementModifier;
use super::path::{Path, PathTrack};
use super::smoothing::{self, SmoothedRoute};
use super::types::{Cell, RequestId};
use crate::config::NavConfig;
use crate::structures::WalkabilityGrid;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Completion callback. Runs exactly once, inside `pump`.
pub type PathCallback = Box<dyn FnOnce(Result<Path, PathError>) + Send>;

/// What `request_path` did with a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    Queued(RequestId),
    /// Rejected without searching. The callback still receives the error on
    /// the next pump.
    Rejected(RequestId, PathError),
}

impl RequestStatus {
    pub fn id(&self) -> RequestId {
        match *self {
            Self::Queued(id) | Self::Rejected(id, _) => id,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

/// Service counters for telemetry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub queued: usize,
    pub running: usize,
    pub delivered: u64,
    pub rejected: u64,
    /// Searches that ended in `NoPath`.
    pub failed: u64,
    /// Live paths invalidated by edits.
    pub invalidated: u64,
    /// Paths computed against an older snapshot and validated before delivery.
    pub stale_deliveries: u64,
}

/// A request handed to a worker.
struct SearchJob {
    id: RequestId,
    start: Cell,
    goal: Cell,
    modifier: Arc<dyn MovementModifier>,
    snapshot: SearchSnapshot,
}

struct FoundRoute {
    raw: Vec<Cell>,
    smoothed: SmoothedRoute,
}

/// A finished search travelling back to the simulation thread.
struct SearchOutcome {
    id: RequestId,
    result: Result<FoundRoute, PathError>,
    snapshot: SearchSnapshot,
}

#[derive(Clone, Copy, Debug)]
struct WorkerSettings {
    params: SearchParams,
    smoothing: bool,
    slow_search: Duration,
}

#[derive(Default)]
struct Counters {
    queued: AtomicUsize,
    running: AtomicUsize,
}

/// Run one search. Panics inside the search are reported as `NoPath`.
fn run_job(job: SearchJob, settings: &WorkerSettings) -> SearchOutcome {
    let started = Instant::now();
    let SearchJob {
        id,
        start,
        goal,
        modifier,
        snapshot,
    } = job;

    let result = panic::catch_unwind(AssertUnwindSafe(|| -> Result<FoundRoute, PathError> {
        let raw = astar::find_path(&snapshot, start, goal, modifier.as_ref(), &settings.params)?;
        // Any-angle shortcuts would break a 4-connected movement model.
        let shortcut = settings.smoothing && snapshot.diagonal_movement();
        let smoothed = smoothing::smooth(&snapshot, &raw, modifier.as_ref(), shortcut);
        Ok(FoundRoute { raw, smoothed })
    }))
    .unwrap_or_else(|_| {
        error!("[PATHFINDING] Search {:?} from {} to {} panicked, reporting NoPath", id, start, goal);
        Err(PathError::NoPath)
    });

    let elapsed = started.elapsed();
    if elapsed > settings.slow_search {
        warn!(
            "[PATHFINDING] Slow search {:?} from {} to {}: {:?}",
            id, start, goal, elapsed
        );
    }

    SearchOutcome { id, result, snapshot }
}

/// Live-path registry size below which `pump` skips pruning.
const LIVE_PRUNE_MIN: usize = 64;

/// Main loop of a search worker. Exits when the job channel closes.
///
/// The worker that leaves the pool idle posts on `idle` to wake `wait_idle`.
fn worker_loop(
    jobs: Receiver<SearchJob>,
    done: Sender<SearchOutcome>,
    idle: Sender<()>,
    counters: Arc<Counters>,
    settings: WorkerSettings,
) {
    while let Ok(job) = jobs.recv() {
        counters.running.fetch_add(1, Ordering::AcqRel);
        counters.queued.fetch_sub(1, Ordering::AcqRel);

        let outcome = run_job(job, &settings);
        // Running drops only after the outcome is visible to `pump`.
        let _ = done.send(outcome);
        counters.running.fetch_sub(1, Ordering::AcqRel);

        if counters.queued.load(Ordering::Acquire) + counters.running.load(Ordering::Acquire) == 0 {
            // Full means a wakeup is already pending.
            let _ = idle.try_send(());
        }
    }
}

/// Queue, worker pool and delivery side of path search.
pub struct PathSearchService {
    job_tx: Option<Sender<SearchJob>>,
    done_tx: Sender<SearchOutcome>,
    done_rx: Receiver<SearchOutcome>,
    idle_rx: Receiver<()>,
    /// Jobs run by `pump` itself when there are no workers.
    inline_jobs: VecDeque<SearchJob>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
    settings: WorkerSettings,
    callbacks: FxHashMap<RequestId, PathCallback>,
    rejected: VecDeque<(RequestId, PathError)>,
    live: Vec<Weak<PathTrack>>,
    /// Registry length that triggers the next prune in `pump`.
    live_prune_at: usize,
    next_id: u64,
    stats: ServiceStats,
    high_pending_warn: usize,
    pending_warned: bool,
}

impl PathSearchService {
    pub fn new(config: &NavConfig) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<SearchJob>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<SearchOutcome>();
        let (idle_tx, idle_rx) = crossbeam_channel::bounded::<()>(1);
        let counters = Arc::new(Counters::default());
        let settings = WorkerSettings {
            params: SearchParams::from_config(config),
            smoothing: config.smoothing,
            slow_search: Duration::from_millis(config.slow_search_warn_ms),
        };

        let mut workers = Vec::with_capacity(config.worker_count);
        for i in 0..config.worker_count {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let idle = idle_tx.clone();
            let counters = Arc::clone(&counters);
            let spawned = thread::Builder::new()
                .name(format!("nav-search-{i}"))
                .spawn(move || worker_loop(jobs, done, idle, counters, settings));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => error!("[PATHFINDING] Failed to spawn search worker {}: {}", i, e),
            }
        }

        if workers.is_empty() {
            info!("[PATHFINDING] Search service running inline (no worker threads)");
        } else {
            info!("[PATHFINDING] Search service started with {} workers", workers.len());
        }

        Self {
            job_tx: (!workers.is_empty()).then_some(job_tx),
            done_tx,
            done_rx,
            idle_rx,
            inline_jobs: VecDeque::new(),
            workers,
            counters,
            settings,
            callbacks: FxHashMap::default(),
            rejected: VecDeque::new(),
            live: Vec::new(),
            live_prune_at: LIVE_PRUNE_MIN,
            next_id: 0,
            stats: ServiceStats::default(),
            high_pending_warn: config.high_pending_warn,
            pending_warned: false,
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Record a request rejected before searching.
    pub fn reject(&mut self, error: PathError, callback: PathCallback) -> RequestId {
        let id = self.next_request_id();
        self.callbacks.insert(id, callback);
        self.rejected.push_back((id, error));
        self.stats.rejected += 1;
        debug!("[PATHFINDING] Request {:?} rejected: {}", id, error);
        id
    }

    /// Queue a search against `snapshot`.
    pub fn submit(
        &mut self,
        start: Cell,
        goal: Cell,
        modifier: Arc<dyn MovementModifier>,
        snapshot: SearchSnapshot,
        callback: PathCallback,
    ) -> RequestId {
        let id = self.next_request_id();
        self.callbacks.insert(id, callback);
        let job = SearchJob {
            id,
            start,
            goal,
            modifier,
            snapshot,
        };

        self.counters.queued.fetch_add(1, Ordering::AcqRel);
        match &self.job_tx {
            Some(tx) => {
                if let Err(e) = tx.send(job) {
                    // All workers are gone; fall back to running it ourselves.
                    error!("[PATHFINDING] Search queue closed, running {:?} inline", id);
                    self.inline_jobs.push_back(e.into_inner());
                }
            }
            None => self.inline_jobs.push_back(job),
        }

        let pending = self.pending_count();
        if pending > self.high_pending_warn && !self.pending_warned {
            warn!("[PATHFINDING] {} path requests pending (threshold {})", pending, self.high_pending_warn);
            self.pending_warned = true;
        } else if pending <= self.high_pending_warn / 2 {
            self.pending_warned = false;
        }
        id
    }

    /// Queued plus running searches.
    pub fn pending_count(&self) -> usize {
        self.counters.queued.load(Ordering::Acquire) + self.counters.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            queued: self.counters.queued.load(Ordering::Acquire),
            running: self.counters.running.load(Ordering::Acquire),
            ..self.stats
        }
    }

    /// Block until no search is queued or running, or `timeout` passes.
    /// Returns whether the service went idle. Completions still need a `pump`.
    ///
    /// Inline mode has nothing running in the background and returns at once.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        if self.workers.is_empty() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending_count() == 0 {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.idle_rx.recv_timeout(remaining) {
                // May be a leftover wakeup from an earlier batch; recheck.
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return self.pending_count() == 0;
                }
            }
        }
    }

    /// Deliver every finished request to its callback. Must be called from
    /// the simulation thread with the current grid and edit version.
    ///
    /// Results computed against an older snapshot are checked against `grid`
    /// first: a path whose footprint crosses a cell that degraded since its
    /// snapshot is delivered already invalid.
    pub fn pump(&mut self, grid: &WalkabilityGrid, version: u64) -> usize {
        let mut delivered = 0;

        while let Some((id, error)) = self.rejected.pop_front() {
            if let Some(callback) = self.callbacks.remove(&id) {
                callback(Err(error));
                delivered += 1;
            }
        }

        while let Some(job) = self.inline_jobs.pop_front() {
            self.counters.running.fetch_add(1, Ordering::AcqRel);
            self.counters.queued.fetch_sub(1, Ordering::AcqRel);
            let outcome = run_job(job, &self.settings);
            let _ = self.done_tx.send(outcome);
            self.counters.running.fetch_sub(1, Ordering::AcqRel);
        }

        while let Ok(outcome) = self.done_rx.try_recv() {
            let Some(callback) = self.callbacks.remove(&outcome.id) else {
                warn!("[PATHFINDING] Completion for unknown request {:?}", outcome.id);
                continue;
            };
            delivered += 1;

            match outcome.result {
                Ok(route) => {
                    let path = Path::new(route.smoothed.waypoints, route.raw, route.smoothed.footprint, route.smoothed.segment_starts);
                    if outcome.snapshot.version() != version {
                        self.stats.stale_deliveries += 1;
                        let degraded = path
                            .remaining_footprint()
                            .iter()
                            .any(|&cell| grid.classify(cell) < outcome.snapshot.classify(cell));
                        if degraded && path.track().invalidate() {
                            self.stats.invalidated += 1;
                            debug!("[PATHFINDING] Request {:?} delivered invalid (grid changed mid-search)", outcome.id);
                        }
                    }
                    self.live.push(Arc::downgrade(path.track()));
                    self.stats.delivered += 1;
                    callback(Ok(path));
                }
                Err(error) => {
                    self.stats.failed += 1;
                    callback(Err(error));
                }
            }
        }

        self.prune_live();
        delivered
    }

    /// Drop registry entries whose path was dropped or already invalidated.
    ///
    /// Runs once the registry doubles since the last prune, so the cost stays
    /// amortised over deliveries.
    fn prune_live(&mut self) {
        if self.live.len() < self.live_prune_at {
            return;
        }
        let before = self.live.len();
        self.live.retain(|weak| weak.upgrade().is_some_and(|t| t.is_valid()));
        self.live_prune_at = (self.live.len() * 2).max(LIVE_PRUNE_MIN);
        debug!("[PATHFINDING] Pruned live path registry: {} -> {}", before, self.live.len());
    }

    /// Invalidate every live path whose remaining footprint crosses `cells`.
    /// Returns how many paths were newly invalidated.
    pub fn invalidate(&mut self, cells: &FxHashSet<Cell>) -> usize {
        let mut count = 0;
        self.live.retain(|weak| {
            let Some(track) = weak.upgrade() else { return false };
            if !track.is_valid() {
                return false;
            }
            if track.crosses(cells) && track.invalidate() {
                count += 1;
                return false;
            }
            true
        });
        if count > 0 {
            self.stats.invalidated += count as u64;
            debug!("[PATHFINDING] Invalidated {} live paths", count);
        }
        count
    }

    /// Paths delivered, still owned by someone and still valid.
    pub fn live_path_count(&self) -> usize {
        self.live.iter().filter(|w| w.upgrade().is_some_and(|t| t.is_valid())).count()
    }
}

impl Drop for PathSearchService {
    fn drop(&mut self) {
        // Closing the job channel ends every worker loop.
        self.job_tx.take();
        let mut joined = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_ok() {
                joined += 1;
            }
        }
        if joined > 0 {
            debug!("[PATHFINDING] Joined {} search workers", joined);
        }
    }
}
