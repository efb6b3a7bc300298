//! Generic region-growing over the tile grid.
//!
//! Shared by the region index (labelling connected components after an edit)
//! and by zone tooling (detecting fully enclosed rooms).
//!
//! # Abort semantics
//!
//! A flood expands breadth-first from the root over cells accepted by
//! `can_visit`. Every visited cell must also satisfy `is_member`; the first
//! visitable cell that is not a member aborts the whole flood and
//! `on_complete` is never called. This distinguishes "this area is unbounded"
//! (e.g. a room leaking to the map edge) from "this is a valid closed area".
//! Callers that only want plain region growing pass `|_| true`.

use crate::pathfinding::types::{Cell, Direction};
use fixedbitset::FixedBitSet;
use smallvec::SmallVec;
use std::collections::VecDeque;

/// Neighbour list buffer handed to neighbour callbacks.
pub type NeighborBuf = SmallVec<[Cell; 8]>;

/// Geometric neighbourhoods for floods that do not follow the navigation graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Neighborhood {
    /// 4-connected.
    Orthogonal,
    /// 8-connected, without any corner-cutting rule.
    Octile,
}

impl Neighborhood {
    fn directions(self) -> &'static [Direction] {
        match self {
            Neighborhood::Orthogonal => &Direction::CARDINAL,
            Neighborhood::Octile => &Direction::ALL,
        }
    }
}

/// Result of a flood.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloodOutcome {
    /// Every visited cell was a member; `on_complete` received `size` cells.
    Completed { size: usize },
    /// A visitable cell failed `is_member`.
    Aborted { at: Cell },
    /// The root was out of bounds or not visitable.
    RootRejected,
    /// The flood grew past the configured `max_cells`.
    LimitReached,
}

impl FloodOutcome {
    pub fn is_completed(self) -> bool {
        matches!(self, FloodOutcome::Completed { .. })
    }
}

/// Reusable flood-fill scratch space for one grid size.
///
/// The visited bitset is cleared incrementally (only the bits set by the
/// previous flood), so repeated small floods on a large map stay cheap.
#[derive(Clone, Debug)]
pub struct FloodFill {
    width: i32,
    height: i32,
    visited: FixedBitSet,
    touched: Vec<usize>,
    frontier: VecDeque<Cell>,
    members: Vec<Cell>,
    max_cells: Option<usize>,
}

impl FloodFill {
    pub fn new(width: i32, height: i32) -> Self {
        let size = (width.max(0) * height.max(0)) as usize;
        Self {
            width: width.max(0),
            height: height.max(0),
            visited: FixedBitSet::with_capacity(size),
            touched: Vec::new(),
            frontier: VecDeque::new(),
            members: Vec::new(),
            max_cells: None,
        }
    }

    /// Abort floods that grow past `max` cells with [`FloodOutcome::LimitReached`].
    pub fn with_max_cells(mut self, max: usize) -> Self {
        self.max_cells = Some(max);
        self
    }

    #[inline]
    fn index(&self, cell: Cell) -> Option<usize> {
        (cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height)
            .then(|| (cell.y * self.width + cell.x) as usize)
    }

    fn reset(&mut self) {
        for &idx in &self.touched {
            self.visited.set(idx, false);
        }
        self.touched.clear();
        self.frontier.clear();
        self.members.clear();
    }

    #[inline]
    fn mark(&mut self, idx: usize) -> bool {
        if self.visited.contains(idx) {
            return false;
        }
        self.visited.insert(idx);
        self.touched.push(idx);
        true
    }

    /// Flood over a geometric neighbourhood.
    pub fn flood<V, M, C>(
        &mut self,
        root: Cell,
        neighborhood: Neighborhood,
        can_visit: V,
        is_member: M,
        on_complete: C,
    ) -> FloodOutcome
    where
        V: FnMut(Cell) -> bool,
        M: FnMut(Cell) -> bool,
        C: FnOnce(&[Cell]),
    {
        let dirs = neighborhood.directions();
        self.flood_with(
            root,
            |cell, out| out.extend(dirs.iter().map(|&d| cell.step(d))),
            can_visit,
            is_member,
            on_complete,
        )
    }

    /// Flood following an arbitrary neighbour function (e.g. navigation graph edges).
    ///
    /// Neighbours outside the grid are ignored.
    pub fn flood_with<N, V, M, C>(
        &mut self,
        root: Cell,
        mut neighbors: N,
        mut can_visit: V,
        mut is_member: M,
        on_complete: C,
    ) -> FloodOutcome
    where
        N: FnMut(Cell, &mut NeighborBuf),
        V: FnMut(Cell) -> bool,
        M: FnMut(Cell) -> bool,
        C: FnOnce(&[Cell]),
    {
        self.reset();

        let Some(root_idx) = self.index(root) else {
            return FloodOutcome::RootRejected;
        };
        if !can_visit(root) {
            return FloodOutcome::RootRejected;
        }
        if !is_member(root) {
            return FloodOutcome::Aborted { at: root };
        }

        self.mark(root_idx);
        self.frontier.push_back(root);
        let mut buf = NeighborBuf::new();

        while let Some(cell) = self.frontier.pop_front() {
            self.members.push(cell);
            if let Some(max) = self.max_cells {
                if self.members.len() > max {
                    self.reset();
                    return FloodOutcome::LimitReached;
                }
            }

            buf.clear();
            neighbors(cell, &mut buf);
            for &next in &buf {
                let Some(idx) = self.index(next) else { continue };
                if !self.mark(idx) {
                    continue;
                }
                if !can_visit(next) {
                    continue;
                }
                if !is_member(next) {
                    self.reset();
                    return FloodOutcome::Aborted { at: next };
                }
                self.frontier.push_back(next);
            }
        }

        on_complete(&self.members);
        FloodOutcome::Completed { size: self.members.len() }
    }

    /// Plain region growing: every visitable cell reachable from `root`.
    ///
    /// The returned slice is valid until the next flood on this scratch.
    pub fn grow<N, V>(&mut self, root: Cell, neighbors: N, can_visit: V) -> &[Cell]
    where
        N: FnMut(Cell, &mut NeighborBuf),
        V: FnMut(Cell) -> bool,
    {
        match self.flood_with(root, neighbors, can_visit, |_| true, |_| {}) {
            FloodOutcome::Completed { .. } => &self.members,
            _ => &[],
        }
    }
}
