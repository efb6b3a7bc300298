use super::astar::SearchSnapshot;
use super::error::{GridError, PathError};
use super::graph::NavigationGraph;
use super::movement::MovementModifier;
use super::path::Path;
use super::region_index::{RegionDelta, RegionIndex};
use super::service::{PathSearchService, RequestStatus, ServiceStats};
use super::types::{Cell, ClassChange};
use crate::config::NavConfig;
use crate::profiling::profile;
use crate::structures::{FloodFill, FloodOutcome, Neighborhood, Terrain, TileObject, WalkabilityGrid};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// What one tile edit changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditReport {
    pub changes: Vec<ClassChange>,
    /// Cells whose edge mask changed.
    pub graph_cells_changed: usize,
    pub regions: RegionDelta,
    pub invalidated_paths: usize,
}

impl EditReport {
    /// The edit did not change any cell's class.
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Entry point for the world layer: owns the grid, graph, region index and
/// search service of one world session.
///
/// All mutation happens through `&mut self` on the simulation thread. An
/// edit runs grid → graph → regions → path invalidation synchronously, so a
/// request issued right after an edit is always checked and searched against
/// the edited state.
///
/// # Example
///
/// ```rust
/// use colony_nav::config::NavConfig;
/// use colony_nav::pathfinding::{Cell, Navigator};
/// use colony_nav::structures::{TileObject, WalkabilityGrid};
///
/// let config = NavConfig { worker_count: 0, ..Default::default() };
/// let mut nav = Navigator::new(WalkabilityGrid::new(5, 5), config);
/// assert!(nav.is_reachable(Cell::new(0, 0), Cell::new(4, 0)));
///
/// let wall: Vec<Cell> = (0..5).map(|y| Cell::new(2, y)).collect();
/// nav.on_object_placed(Cell::new(2, 0), TileObject::Wall, &wall).unwrap();
/// assert!(!nav.is_reachable(Cell::new(0, 0), Cell::new(4, 0)));
/// ```
pub struct Navigator {
    config: NavConfig,
    grid: WalkabilityGrid,
    graph: NavigationGraph,
    regions: RegionIndex,
    service: PathSearchService,
    flood: FloodFill,
    version: u64,
}

impl Navigator {
    pub fn new(grid: WalkabilityGrid, config: NavConfig) -> Self {
        let graph = NavigationGraph::build(&grid, config.diagonal_movement);
        let regions = RegionIndex::build(&grid, &graph);
        let service = PathSearchService::new(&config);
        let flood = FloodFill::new(grid.width(), grid.height());

        info!(
            "[PATHFINDING] Navigator ready: {}x{} grid, {} edges, {} regions in {} islands",
            grid.width(),
            grid.height(),
            graph.edge_count(),
            regions.region_count(),
            regions.island_count()
        );

        Self {
            config,
            grid,
            graph,
            regions,
            service,
            flood,
            version: 0,
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn grid(&self) -> &WalkabilityGrid {
        &self.grid
    }

    pub fn graph(&self) -> &NavigationGraph {
        &self.graph
    }

    pub fn regions(&self) -> &RegionIndex {
        &self.regions
    }

    /// Bumped by every edit that changed at least one cell's class.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Immutable view for a search started now.
    pub fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot::capture(&self.grid, &self.graph, self.version)
    }

    fn footprint_cells(&self, anchor: Cell, footprint: &[Cell]) -> Result<Vec<Cell>, GridError> {
        let cells = if footprint.is_empty() { vec![anchor] } else { footprint.to_vec() };
        match cells.iter().find(|&&c| !self.grid.in_bounds(c)) {
            Some(&outside) => Err(GridError::OutOfBounds(outside)),
            None => Ok(cells),
        }
    }

    /// An object now covers `footprint` (or just `anchor` when it is empty).
    ///
    /// Nothing is changed when any footprint cell is out of bounds.
    pub fn on_object_placed(&mut self, anchor: Cell, object: TileObject, footprint: &[Cell]) -> Result<EditReport, GridError> {
        let cells = self.footprint_cells(anchor, footprint)?;
        for &cell in &cells {
            self.grid.place_object(cell, object);
        }
        Ok(self.apply_occupancy(&cells))
    }

    /// The object covering `footprint` (or `anchor`) was removed.
    pub fn on_object_removed(&mut self, anchor: Cell, footprint: &[Cell]) -> Result<EditReport, GridError> {
        let cells = self.footprint_cells(anchor, footprint)?;
        for &cell in &cells {
            self.grid.remove_object(cell);
        }
        Ok(self.apply_occupancy(&cells))
    }

    /// Terraforming: dig out rock, fill in a chasm.
    pub fn set_terrain(&mut self, cell: Cell, terrain: Terrain) -> Result<EditReport, GridError> {
        if !self.grid.in_bounds(cell) {
            return Err(GridError::OutOfBounds(cell));
        }
        self.grid.set_terrain(cell, terrain);
        Ok(self.apply_occupancy(&[cell]))
    }

    /// Reclassify edited cells and propagate the changes.
    #[profile(4)]
    fn apply_occupancy(&mut self, cells: &[Cell]) -> EditReport {
        let changes: Vec<ClassChange> = cells.iter().filter_map(|&cell| self.grid.reclassify(cell)).collect();
        if changes.is_empty() {
            return EditReport::default();
        }
        self.version += 1;

        let (mut min, mut max) = (changes[0].cell, changes[0].cell);
        for change in &changes[1..] {
            min = Cell::new(min.x.min(change.cell.x), min.y.min(change.cell.y));
            max = Cell::new(max.x.max(change.cell.x), max.y.max(change.cell.y));
        }
        let graph_cells_changed = self.graph.update_region(&self.grid, min, max);
        let regions = self.regions.apply_changes(&self.grid, &self.graph, &changes);

        let degraded: FxHashSet<Cell> = changes.iter().filter(|c| c.is_degraded()).map(|c| c.cell).collect();
        let invalidated_paths = if degraded.is_empty() { 0 } else { self.service.invalidate(&degraded) };

        debug!(
            "[PATHFINDING] Edit v{}: {} cells reclassified, {} masks, {} regions, {} paths invalidated",
            self.version,
            changes.len(),
            graph_cells_changed,
            self.regions.region_count(),
            invalidated_paths
        );

        EditReport {
            changes,
            graph_cells_changed,
            regions,
            invalidated_paths,
        }
    }

    /// Ask for a path. Returns immediately; `callback` runs exactly once,
    /// inside a later [`Navigator::pump`].
    ///
    /// Out-of-bounds or blocked endpoints are rejected as
    /// [`PathError::MalformedRequest`], endpoints in different islands as
    /// [`PathError::Unreachable`]. Neither is queued.
    pub fn request_path<M, F>(&mut self, start: Cell, goal: Cell, modifier: M, callback: F) -> RequestStatus
    where
        M: MovementModifier + 'static,
        F: FnOnce(Result<Path, PathError>) + Send + 'static,
    {
        let callback = Box::new(callback);
        let endpoints_ok = [start, goal]
            .iter()
            .all(|&c| self.grid.classify(c).is_passable());
        if !endpoints_ok {
            let id = self.service.reject(PathError::MalformedRequest, callback);
            return RequestStatus::Rejected(id, PathError::MalformedRequest);
        }
        if !self.regions.connected(start, goal) {
            let id = self.service.reject(PathError::Unreachable, callback);
            return RequestStatus::Rejected(id, PathError::Unreachable);
        }

        let snapshot = self.snapshot();
        let id = self.service.submit(start, goal, Arc::new(modifier), snapshot, callback);
        RequestStatus::Queued(id)
    }

    /// Cheap synchronous check through the region index.
    pub fn is_reachable(&self, start: Cell, goal: Cell) -> bool {
        self.grid.classify(start).is_passable()
            && self.grid.classify(goal).is_passable()
            && self.regions.connected(start, goal)
    }

    /// Queued plus running searches.
    pub fn pending_request_count(&self) -> usize {
        self.service.pending_count()
    }

    /// Deliver finished requests. Call once per simulation tick.
    pub fn pump(&mut self) -> usize {
        self.service.pump(&self.grid, self.version)
    }

    /// Block until the worker pool is idle. Follow with [`Navigator::pump`].
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.service.wait_idle(timeout)
    }

    pub fn stats(&self) -> ServiceStats {
        self.service.stats()
    }

    /// Cells of the fully enclosed room containing `cell`, or `None` when the
    /// open floor around it reaches the map edge.
    ///
    /// Doors and walls bound a room; only open floor is part of it.
    pub fn enclosed_room(&mut self, cell: Cell) -> Option<Vec<Cell>> {
        let grid = &self.grid;
        let (w, h) = (grid.width(), grid.height());
        let mut room = None;
        let outcome = self.flood.flood(
            cell,
            Neighborhood::Orthogonal,
            |c| grid.classify(c).is_region_member(),
            |c| c.x > 0 && c.y > 0 && c.x < w - 1 && c.y < h - 1,
            |cells| room = Some(cells.to_vec()),
        );
        match outcome {
            FloodOutcome::Completed { .. } => room,
            _ => None,
        }
    }
}
