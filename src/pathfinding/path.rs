use super::error::PathError;
use super::types::Cell;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// The part of a path the navigator keeps watching after delivery.
///
/// Shared between the agent-owned [`Path`] and the service's live-path
/// registry (as a `Weak`), so invalidation never needs to reach the agent.
#[derive(Debug)]
pub(crate) struct PathTrack {
    /// Swept cells of every segment, in travel order. Segment `i` runs from
    /// `footprint[segment_starts[i]]` to the end of its slice.
    footprint: Vec<Cell>,
    segment_starts: Vec<usize>,
    /// Mirrors the owner's cursor.
    progress: AtomicUsize,
    valid: AtomicBool,
}

impl PathTrack {
    pub(crate) fn new(footprint: Vec<Cell>, segment_starts: Vec<usize>, progress: usize) -> Self {
        Self {
            footprint,
            segment_starts,
            progress: AtomicUsize::new(progress),
            valid: AtomicBool::new(true),
        }
    }

    /// Footprint of the segment being walked and everything after it.
    pub(crate) fn remaining_footprint(&self) -> &[Cell] {
        if self.segment_starts.is_empty() {
            return &self.footprint;
        }
        let segment = self.progress.load(Ordering::Relaxed).max(1) - 1;
        match self.segment_starts.get(segment) {
            Some(&start) => &self.footprint[start..],
            None => &[],
        }
    }

    pub(crate) fn crosses(&self, cells: &FxHashSet<Cell>) -> bool {
        self.remaining_footprint().iter().any(|c| cells.contains(c))
    }

    /// Clear the validity flag. Returns true if it was set.
    pub(crate) fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

/// Where an agent stands with respect to its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathStatus {
    Following,
    Arrived,
    /// Blocked after delivery; re-request.
    Invalid,
}

/// A delivered route: smoothed waypoints plus a cursor.
///
/// `waypoints()[0]` is the start cell. The cursor points at the next
/// waypoint to reach, so a fresh path's [`Path::current`] is the first
/// waypoint after the start. The owner advances it; the navigator only ever
/// clears the validity flag.
///
/// ```rust
/// use colony_nav::config::NavConfig;
/// use colony_nav::pathfinding::{Cell, Navigator, Walker};
/// use colony_nav::structures::WalkabilityGrid;
/// use std::sync::{Arc, Mutex};
///
/// let config = NavConfig { worker_count: 0, ..Default::default() };
/// let mut nav = Navigator::new(WalkabilityGrid::new(5, 5), config);
/// let slot = Arc::new(Mutex::new(None));
/// let sink = Arc::clone(&slot);
/// nav.request_path(Cell::new(0, 0), Cell::new(4, 4), Walker::default(), move |result| {
///     *sink.lock().unwrap() = Some(result);
/// });
/// nav.pump();
///
/// let mut path = slot.lock().unwrap().take().unwrap().unwrap();
/// assert_eq!(path.current(), Some(Cell::new(4, 4)));
/// path.advance();
/// assert!(path.is_at_end());
/// ```
#[derive(Debug)]
pub struct Path {
    waypoints: Vec<Cell>,
    cells: Vec<Cell>,
    cursor: usize,
    track: Arc<PathTrack>,
}

impl Path {
    pub(crate) fn new(waypoints: Vec<Cell>, cells: Vec<Cell>, footprint: Vec<Cell>, segment_starts: Vec<usize>) -> Self {
        let cursor = 1.min(waypoints.len());
        let track = Arc::new(PathTrack::new(footprint, segment_starts, cursor));
        Self {
            waypoints,
            cells,
            cursor,
            track,
        }
    }

    pub(crate) fn track(&self) -> &Arc<PathTrack> {
        &self.track
    }

    /// Next waypoint to reach. `None` once arrived.
    pub fn current(&self) -> Option<Cell> {
        self.waypoints.get(self.cursor).copied()
    }

    /// Mark the current waypoint as reached and return the next one.
    pub fn advance(&mut self) -> Option<Cell> {
        if self.cursor < self.waypoints.len() {
            self.cursor += 1;
            self.track.progress.store(self.cursor, Ordering::Relaxed);
        }
        self.current()
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor >= self.waypoints.len()
    }

    pub fn is_valid(&self) -> bool {
        self.track.is_valid()
    }

    /// `Err(InvalidatedMidFlight)` once the path was invalidated.
    pub fn check(&self) -> Result<(), PathError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(PathError::InvalidatedMidFlight)
        }
    }

    /// Waypoints not yet reached.
    pub fn remaining_length(&self) -> usize {
        self.waypoints.len() - self.cursor
    }

    pub fn status(&self) -> PathStatus {
        if !self.is_valid() {
            PathStatus::Invalid
        } else if self.is_at_end() {
            PathStatus::Arrived
        } else {
            PathStatus::Following
        }
    }

    /// All smoothed waypoints, start included.
    pub fn waypoints(&self) -> &[Cell] {
        &self.waypoints
    }

    /// Unsmoothed cell-by-cell route found by the search.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn smooth_len(&self) -> usize {
        self.waypoints.len()
    }

    /// Cells swept by the segments still to walk.
    pub fn remaining_footprint(&self) -> &[Cell] {
        self.track.remaining_footprint()
    }
}
