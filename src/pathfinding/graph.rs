use super::types::{Cell, Direction, Enterability};
use crate::fixed_math::{FixedNum, DIAGONAL_COST, ORTHOGONAL_COST};
use crate::structures::{NeighborBuf, WalkabilityGrid};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

/// Neighbour list with base step costs.
pub type Neighbors = SmallVec<[(Cell, FixedNum); 8]>;

/// Navigation graph over grid cells, stored as one 8-bit direction mask per cell.
///
/// # Edge rules
///
/// - An edge joins two 4- (or 8-) neighbours when neither endpoint is `None`.
/// - A diagonal edge additionally requires both flanking orthogonal cells to be
///   not `None`, so agents never cut through solid corners.
/// - Base cost is 1 for orthogonal steps and √2 for diagonal steps. Per-agent
///   speed and terrain factors are applied at search time, never stored here,
///   so one graph serves agents with different movement profiles.
///
/// # Incremental updates
///
/// [`NavigationGraph::update_region`] recomputes masks only for the edited
/// rectangle plus a one-cell halo (the neighbours whose edges point into the
/// rectangle, and the diagonals the rectangle flanks). Graph connectivity is
/// therefore always a live derivative of the [`WalkabilityGrid`].
///
/// Like the grid, the mask array is `Arc`-shared with search workers and
/// copied on first write after a snapshot was taken.
#[derive(Clone, Debug)]
pub struct NavigationGraph {
    width: i32,
    height: i32,
    diagonal: bool,
    masks: Arc<Vec<u8>>,
    version: u64,
}

/// Edge mask of one cell under the current grid state.
pub(crate) fn compute_mask(grid: &WalkabilityGrid, cell: Cell, diagonal: bool) -> u8 {
    if !grid.classify(cell).is_passable() {
        return 0;
    }

    let mut mask = 0u8;
    for dir in Direction::ALL {
        let next = cell.step(dir);
        if !grid.classify(next).is_passable() {
            continue;
        }
        if let Some((a, b)) = dir.flanks() {
            if !diagonal {
                continue;
            }
            if !grid.classify(cell.step(a)).is_passable() || !grid.classify(cell.step(b)).is_passable() {
                continue;
            }
        }
        mask |= dir.bit();
    }
    mask
}

/// Iterate the neighbours encoded in an edge mask.
#[inline]
pub(crate) fn mask_neighbors(cell: Cell, mask: u8) -> impl Iterator<Item = (Direction, Cell)> {
    Direction::ALL
        .into_iter()
        .filter(move |dir| mask & dir.bit() != 0)
        .map(move |dir| (dir, cell.step(dir)))
}

#[inline]
pub(crate) fn step_cost(dir: Direction) -> FixedNum {
    if dir.is_diagonal() {
        DIAGONAL_COST
    } else {
        ORTHOGONAL_COST
    }
}

impl NavigationGraph {
    /// Build the full graph for a grid.
    pub fn build(grid: &WalkabilityGrid, diagonal: bool) -> Self {
        let mut graph = Self {
            width: grid.width(),
            height: grid.height(),
            diagonal,
            masks: Arc::new(vec![0; grid.len()]),
            version: 0,
        };
        graph.rebuild_all(grid);
        graph
    }

    /// Recompute every mask. Returns the number of masks that changed.
    pub fn rebuild_all(&mut self, grid: &WalkabilityGrid) -> usize {
        if grid.is_empty() {
            return 0;
        }
        self.update_region(
            grid,
            Cell::new(0, 0),
            Cell::new(grid.width() - 1, grid.height() - 1),
        )
    }

    /// Rebuild edges for all cells in the inclusive rectangle `min..=max` plus
    /// a one-cell halo, clamped to the grid.
    ///
    /// Returns the number of cells whose mask changed. Calling it twice with
    /// no grid change in between is a no-op the second time.
    pub fn update_region(&mut self, grid: &WalkabilityGrid, min: Cell, max: Cell) -> usize {
        let lo_x = (min.x.min(max.x) - 1).max(0);
        let lo_y = (min.y.min(max.y) - 1).max(0);
        let hi_x = (min.x.max(max.x) + 1).min(self.width - 1);
        let hi_y = (min.y.max(max.y) + 1).min(self.height - 1);
        if lo_x > hi_x || lo_y > hi_y {
            return 0;
        }

        let mut changed = 0;
        for y in lo_y..=hi_y {
            for x in lo_x..=hi_x {
                let cell = Cell::new(x, y);
                let idx = (y * self.width + x) as usize;
                let mask = compute_mask(grid, cell, self.diagonal);
                if self.masks[idx] != mask {
                    // make_mut only copies while a worker still holds the old array
                    Arc::make_mut(&mut self.masks)[idx] = mask;
                    changed += 1;
                }
            }
        }

        if changed > 0 {
            self.version += 1;
            debug!(
                "[GRAPH] Rebuilt ({},{})..=({},{}): {} masks changed, version {}",
                lo_x, lo_y, hi_x, hi_y, changed, self.version
            );
        }
        changed
    }

    #[inline]
    fn index(&self, cell: Cell) -> Option<usize> {
        (cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height)
            .then(|| (cell.y * self.width + cell.x) as usize)
    }

    /// Raw edge mask of a cell (0 for out-of-bounds and blocked cells).
    #[inline]
    pub fn edge_mask(&self, cell: Cell) -> u8 {
        self.index(cell).map_or(0, |idx| self.masks[idx])
    }

    /// Neighbours reachable in one step, with base step costs.
    pub fn neighbors(&self, cell: Cell) -> Neighbors {
        mask_neighbors(cell, self.edge_mask(cell))
            .map(|(dir, next)| (next, step_cost(dir)))
            .collect()
    }

    /// Neighbour cells only, appended to a flood-fill buffer.
    pub fn neighbor_cells(&self, cell: Cell, out: &mut NeighborBuf) {
        out.extend(mask_neighbors(cell, self.edge_mask(cell)).map(|(_, next)| next));
    }

    pub fn has_edge(&self, a: Cell, b: Cell) -> bool {
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        Direction::ALL
            .into_iter()
            .find(|dir| dir.offset() == (dx, dy))
            .is_some_and(|dir| self.edge_mask(a) & dir.bit() != 0)
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        let directed: u32 = self.masks.iter().map(|m| m.count_ones()).sum();
        directed as usize / 2
    }

    /// Bumped by every update that changed at least one mask.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn diagonal_movement(&self) -> bool {
        self.diagonal
    }

    /// Shared handle to the current mask array.
    pub fn snapshot(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.masks)
    }
}

/// Enterability of a neighbour as seen from a class snapshot.
#[inline]
pub(crate) fn class_at(classes: &[Enterability], width: i32, height: i32, cell: Cell) -> Enterability {
    if cell.x < 0 || cell.y < 0 || cell.x >= width || cell.y >= height {
        return Enterability::None;
    }
    classes[(cell.y * width + cell.x) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::TileObject;

    fn assert_edge_invariants(grid: &WalkabilityGrid, graph: &NavigationGraph) {
        for cell in grid.cells() {
            for (next, _) in graph.neighbors(cell) {
                assert!(grid.classify(cell).is_passable(), "edge from blocked {}", cell);
                assert!(grid.classify(next).is_passable(), "edge into blocked {}", next);
                let (dx, dy) = (next.x - cell.x, next.y - cell.y);
                if dx != 0 && dy != 0 {
                    assert!(grid.classify(cell.offset(dx, 0)).is_passable(), "corner cut {} -> {}", cell, next);
                    assert!(grid.classify(cell.offset(0, dy)).is_passable(), "corner cut {} -> {}", cell, next);
                }
                assert!(graph.has_edge(next, cell), "edge {} -> {} not symmetric", cell, next);
            }
        }
    }

    #[test]
    fn test_open_grid_degrees() {
        let grid = WalkabilityGrid::new(3, 3);
        let graph = NavigationGraph::build(&grid, true);
        assert_eq!(graph.neighbors(Cell::new(1, 1)).len(), 8);
        assert_eq!(graph.neighbors(Cell::new(0, 0)).len(), 3);
        // 12 orthogonal + 8 diagonal
        assert_eq!(graph.edge_count(), 20);
    }

    #[test]
    fn test_diagonal_costs() {
        let grid = WalkabilityGrid::new(2, 2);
        let graph = NavigationGraph::build(&grid, true);
        for (next, cost) in graph.neighbors(Cell::new(0, 0)) {
            if next == Cell::new(1, 1) {
                assert_eq!(cost, DIAGONAL_COST);
            } else {
                assert_eq!(cost, ORTHOGONAL_COST);
            }
        }
    }

    #[test]
    fn test_no_corner_cutting() {
        let grid = WalkabilityGrid::from_rows(&[
            "..",
            ".#",
        ]);
        let graph = NavigationGraph::build(&grid, true);
        // (0,0) -> (1,1) is flanked by the wall at (1,0)
        assert!(!graph.has_edge(Cell::new(0, 0), Cell::new(1, 1)));
        assert!(graph.has_edge(Cell::new(0, 0), Cell::new(0, 1)));
        assert_edge_invariants(&grid, &graph);
    }

    #[test]
    fn test_door_flank_allows_diagonal() {
        let grid = WalkabilityGrid::from_rows(&[
            "..",
            ".D",
        ]);
        let graph = NavigationGraph::build(&grid, true);
        assert!(graph.has_edge(Cell::new(0, 0), Cell::new(1, 1)));
        assert!(graph.has_edge(Cell::new(0, 0), Cell::new(1, 0)));
    }

    #[test]
    fn test_four_connected_mode() {
        let grid = WalkabilityGrid::new(3, 3);
        let graph = NavigationGraph::build(&grid, false);
        assert_eq!(graph.neighbors(Cell::new(1, 1)).len(), 4);
        assert!(!graph.diagonal_movement());
    }

    #[test]
    fn test_incremental_update_matches_full_rebuild() {
        let mut grid = WalkabilityGrid::new(8, 8);
        let mut graph = NavigationGraph::build(&grid, true);

        for cell in [Cell::new(3, 3), Cell::new(4, 3), Cell::new(4, 4)] {
            grid.place_object(cell, TileObject::Wall);
            grid.on_occupancy_changed(cell);
        }
        let changed = graph.update_region(&grid, Cell::new(3, 3), Cell::new(4, 4));
        assert!(changed > 0);

        let fresh = NavigationGraph::build(&grid, true);
        for cell in grid.cells() {
            assert_eq!(graph.edge_mask(cell), fresh.edge_mask(cell), "mask mismatch at {}", cell);
        }
        assert_edge_invariants(&grid, &graph);
    }

    #[test]
    fn test_update_region_is_idempotent() {
        let mut grid = WalkabilityGrid::new(5, 5);
        let mut graph = NavigationGraph::build(&grid, true);
        grid.place_object(Cell::new(2, 2), TileObject::Wall);
        grid.on_occupancy_changed(Cell::new(2, 2));

        graph.update_region(&grid, Cell::new(2, 2), Cell::new(2, 2));
        let version = graph.version();
        let masks: Vec<u8> = grid.cells().map(|c| graph.edge_mask(c)).collect();

        assert_eq!(graph.update_region(&grid, Cell::new(2, 2), Cell::new(2, 2)), 0);
        assert_eq!(graph.version(), version, "no-op update must not bump the version");
        let again: Vec<u8> = grid.cells().map(|c| graph.edge_mask(c)).collect();
        assert_eq!(masks, again);
    }

    #[test]
    fn test_reversed_and_out_of_range_bounds() {
        let mut grid = WalkabilityGrid::new(4, 4);
        let mut graph = NavigationGraph::build(&grid, true);
        grid.place_object(Cell::new(0, 0), TileObject::Wall);
        grid.on_occupancy_changed(Cell::new(0, 0));

        // Reversed corners are normalised, the halo is clamped at the grid edge.
        assert!(graph.update_region(&grid, Cell::new(0, 0), Cell::new(-5, -5)) > 0);
        assert_eq!(graph.edge_mask(Cell::new(0, 0)), 0);
        assert!(!graph.has_edge(Cell::new(1, 0), Cell::new(0, 0)));
    }

    #[test]
    fn test_snapshot_survives_edit() {
        let mut grid = WalkabilityGrid::new(3, 3);
        let mut graph = NavigationGraph::build(&grid, true);
        let held = graph.snapshot();

        grid.place_object(Cell::new(1, 1), TileObject::Wall);
        grid.on_occupancy_changed(Cell::new(1, 1));
        graph.update_region(&grid, Cell::new(1, 1), Cell::new(1, 1));

        assert_eq!(held[4], 0xFF, "held snapshot keeps the pre-edit center mask");
        assert_eq!(graph.edge_mask(Cell::new(1, 1)), 0);
    }
}
