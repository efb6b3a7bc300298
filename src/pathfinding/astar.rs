use super::error::PathError;
use super::graph::{class_at, mask_neighbors, step_cost, NavigationGraph};
use super::movement::MovementModifier;
use super::types::{Cell, Enterability};
use crate::config::NavConfig;
use crate::fixed_math::{self, FixedNum};
use crate::profiling::profile;
use crate::structures::WalkabilityGrid;
use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::warn;

/// Immutable view of the grid and graph handed to a search worker.
///
/// Holds `Arc` clones of the class and edge-mask arrays; the simulation
/// thread copies an array on its next write, so a running search never sees
/// a torn edit.
#[derive(Clone, Debug)]
pub struct SearchSnapshot {
    width: i32,
    height: i32,
    diagonal: bool,
    classes: Arc<Vec<Enterability>>,
    masks: Arc<Vec<u8>>,
    version: u64,
}

impl SearchSnapshot {
    pub fn capture(grid: &WalkabilityGrid, graph: &NavigationGraph, version: u64) -> Self {
        Self {
            width: grid.width(),
            height: grid.height(),
            diagonal: graph.diagonal_movement(),
            classes: grid.snapshot(),
            masks: graph.snapshot(),
            version,
        }
    }

    /// Navigator edit version this snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn diagonal_movement(&self) -> bool {
        self.diagonal
    }

    #[inline]
    fn index(&self, cell: Cell) -> Option<usize> {
        (cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height)
            .then(|| (cell.y * self.width + cell.x) as usize)
    }

    #[inline]
    pub fn classify(&self, cell: Cell) -> Enterability {
        class_at(&self.classes, self.width, self.height, cell)
    }

    #[inline]
    fn mask(&self, cell: Cell) -> u8 {
        self.index(cell).map_or(0, |idx| self.masks[idx])
    }

    /// Whether an agent with this modifier may stand on `cell`.
    #[inline]
    pub fn enterable(&self, cell: Cell, modifier: &dyn MovementModifier) -> bool {
        match self.classify(cell) {
            Enterability::Immediate => true,
            Enterability::Conditional => modifier.can_enter_conditional(cell),
            Enterability::None => false,
        }
    }

    fn len(&self) -> usize {
        self.classes.len()
    }
}

/// Search tuning taken from [`NavConfig`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchParams {
    pub heuristic_weight: FixedNum,
    pub max_nodes: usize,
}

impl SearchParams {
    pub fn from_config(config: &NavConfig) -> Self {
        Self {
            heuristic_weight: fixed_math::from_config(config.heuristic_weight, 1.0),
            max_nodes: config.max_search_nodes.max(1),
        }
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::from_config(&NavConfig::default())
    }
}

#[derive(Copy, Clone, Eq, PartialEq)]
struct State {
    f: FixedNum,
    g: FixedNum,
    cell: Cell,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on f; deeper nodes first on ties, then a fixed cell order
        // so every worker expands in the same sequence.
        other
            .f
            .cmp(&self.f)
            .then_with(|| self.g.cmp(&other.g))
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn reconstruct_path(came_from: &FxHashMap<Cell, Cell>, mut current: Cell) -> Vec<Cell> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        current = prev;
        path.push(current);
    }
    path.reverse();
    path
}

/// Weighted A* over the snapshot's edge masks.
///
/// Step cost is the base edge cost times `modifier.cell_cost` of the entered
/// cell. The heuristic is octile distance (Manhattan when diagonals are
/// off) times `modifier.min_cell_cost` times the configured weight, so a
/// weight of 1 keeps it admissible.
///
/// Returns the raw cell route, start and goal included.
///
/// # Errors
///
/// [`PathError::NoPath`] when the open set is exhausted, the node budget is
/// spent, or either endpoint is not enterable for this agent (the start may
/// be a door the agent is already standing in).
#[profile(10)]
pub fn find_path(
    snapshot: &SearchSnapshot,
    start: Cell,
    goal: Cell,
    modifier: &dyn MovementModifier,
    params: &SearchParams,
) -> Result<Vec<Cell>, PathError> {
    if !snapshot.classify(start).is_passable() || !snapshot.enterable(goal, modifier) {
        return Err(PathError::NoPath);
    }
    if start == goal {
        return Ok(vec![start]);
    }

    let h_scale = modifier.min_cell_cost().max(FixedNum::ZERO) * params.heuristic_weight;
    let heuristic = |cell: Cell| {
        let (dx, dy) = (goal.x - cell.x, goal.y - cell.y);
        let base = if snapshot.diagonal {
            fixed_math::octile(dx, dy)
        } else {
            fixed_math::manhattan(dx, dy)
        };
        base * h_scale
    };

    let mut open_set = BinaryHeap::new();
    let mut closed = FixedBitSet::with_capacity(snapshot.len());
    let mut came_from: FxHashMap<Cell, Cell> = FxHashMap::default();
    let mut g_score: FxHashMap<Cell, FixedNum> = FxHashMap::default();

    g_score.insert(start, FixedNum::ZERO);
    open_set.push(State {
        f: heuristic(start),
        g: FixedNum::ZERO,
        cell: start,
    });

    let mut expanded = 0usize;
    while let Some(State { g, cell: current, .. }) = open_set.pop() {
        let Some(idx) = snapshot.index(current) else { continue };
        if closed.contains(idx) {
            continue;
        }
        closed.insert(idx);

        if current == goal {
            return Ok(reconstruct_path(&came_from, current));
        }

        expanded += 1;
        if expanded > params.max_nodes {
            warn!(
                "[PATHFINDING] A* exceeded node budget ({}) from {} to {}",
                params.max_nodes, start, goal
            );
            return Err(PathError::NoPath);
        }

        for (dir, next) in mask_neighbors(current, snapshot.mask(current)) {
            let Some(next_idx) = snapshot.index(next) else { continue };
            if closed.contains(next_idx) || !snapshot.enterable(next, modifier) {
                continue;
            }

            let tentative = g + step_cost(dir) * modifier.cell_cost(next);
            if tentative < g_score.get(&next).copied().unwrap_or(FixedNum::MAX) {
                came_from.insert(next, current);
                g_score.insert(next, tentative);
                open_set.push(State {
                    f: tentative + heuristic(next),
                    g: tentative,
                    cell: next,
                });
            }
        }
    }

    Err(PathError::NoPath)
}

/// Sum of step costs along a raw route, as the search scores it.
pub fn route_cost(route: &[Cell], modifier: &dyn MovementModifier) -> FixedNum {
    route
        .windows(2)
        .map(|pair| {
            let diagonal = pair[0].x != pair[1].x && pair[0].y != pair[1].y;
            let base = if diagonal {
                fixed_math::DIAGONAL_COST
            } else {
                fixed_math::ORTHOGONAL_COST
            };
            base * modifier.cell_cost(pair[1])
        })
        .sum()
}
