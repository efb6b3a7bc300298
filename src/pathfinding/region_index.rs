use super::graph::NavigationGraph;
use super::types::{Cell, ClassChange, IslandId, RegionId};
use crate::profiling::profile;
use crate::structures::{FloodFill, WalkabilityGrid};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Regions linked by one connector cell (or connector group), sorted.
pub type ConnectorLinks = SmallVec<[RegionId; 4]>;

/// Maximal set of immediately enterable cells mutually reachable over graph edges.
#[derive(Clone, Debug)]
pub struct Region {
    pub(super) id: RegionId,
    pub(super) cells: FxHashSet<Cell>,
    /// Connector cells linking this region to others.
    pub(super) connectors: BTreeSet<Cell>,
    pub(super) adjacent: BTreeSet<RegionId>,
    pub(super) island: IslandId,
}

impl Region {
    fn new(id: RegionId) -> Self {
        Self {
            id,
            cells: FxHashSet::default(),
            connectors: BTreeSet::new(),
            adjacent: BTreeSet::new(),
            island: IslandId(u32::MAX),
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells.iter().copied()
    }

    pub fn connectors(&self) -> &BTreeSet<Cell> {
        &self.connectors
    }

    pub fn adjacent(&self) -> &BTreeSet<RegionId> {
        &self.adjacent
    }

    pub fn island(&self) -> IslandId {
        self.island
    }
}

/// Summary of what one edit batch did to the region partition.
///
/// A slot freed and reused within the same batch shows up in both
/// `destroyed` and `created`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionDelta {
    pub created: Vec<RegionId>,
    pub destroyed: Vec<RegionId>,
    pub merges: usize,
    pub splits: usize,
    /// Cells whose label was corrected by a confirmatory flood.
    pub relabelled: usize,
}

impl RegionDelta {
    pub fn is_empty(&self) -> bool {
        *self == RegionDelta::default()
    }
}

/// Incrementally maintained region partition of the walkable map.
///
/// Answers "can X reach Y at all" from the region graph instead of the cell
/// graph: two endpoints are connected when their regions share an island
/// (connected component of the region adjacency graph).
///
/// # Membership
///
/// Only [`Enterability::Immediate`](super::Enterability::Immediate) cells are
/// region members. Conditional cells (doors) are *connectors*: they belong to
/// no region and link the regions on their open sides. Chains of adjacent
/// connectors act as one connector.
///
/// # Incremental maintenance
///
/// [`RegionIndex::apply_changes`] processes one batch of class changes,
/// after the grid and the graph have been updated:
///
/// 1. Cells that stopped being members leave their region. Regions that lost
///    a cell, or an edge in the 3x3 ring of a degraded cell, become split
///    candidates.
/// 2. Split candidates are relabelled by flood fill constrained to their own
///    cells, seeded from the ring. The largest component keeps the id.
/// 3. New members join a neighbouring region or found a new one.
/// 4. Every graph edge leaving a ring cell is checked; two regions meeting
///    across an edge are merged (larger region survives) and the result is
///    verified by a confirmatory flood.
/// 5. Connector groups whose surroundings changed get their links recomputed,
///    and the adjacency of every region they touched is rebuilt.
/// 6. Islands are recomputed by BFS over the region graph.
///
/// # Performance
///
/// Steps 1-5 cost O(ring + size of merged/split regions). Step 6 is
/// O(regions + adjacency), independent of map size.
#[derive(Clone, Debug)]
pub struct RegionIndex {
    pub(super) width: i32,
    pub(super) height: i32,
    pub(super) cell_region: Vec<Option<RegionId>>,
    pub(super) regions: Vec<Option<Region>>,
    pub(super) free: Vec<u32>,
    pub(super) connector_links: FxHashMap<Cell, ConnectorLinks>,
    pub(super) island_count: usize,
    pub(super) flood: FloodFill,
}

/// Region label lookup usable while other fields are mutably borrowed.
#[inline]
fn label_at(cell_region: &[Option<RegionId>], width: i32, cell: Cell) -> Option<RegionId> {
    if cell.x < 0 || cell.y < 0 || cell.x >= width {
        return None;
    }
    cell_region.get((cell.y * width + cell.x) as usize).copied().flatten()
}

impl RegionIndex {
    pub fn build(grid: &WalkabilityGrid, graph: &NavigationGraph) -> Self {
        let mut index = Self {
            width: grid.width(),
            height: grid.height(),
            cell_region: vec![None; grid.len()],
            regions: Vec::new(),
            free: Vec::new(),
            connector_links: FxHashMap::default(),
            island_count: 0,
            flood: FloodFill::new(grid.width(), grid.height()),
        };
        index.rebuild(grid, graph);
        index
    }

    /// Discard all state and label the whole map from scratch.
    #[profile(8)]
    pub fn rebuild(&mut self, grid: &WalkabilityGrid, graph: &NavigationGraph) {
        self.cell_region.iter_mut().for_each(|slot| *slot = None);
        self.regions.clear();
        self.free.clear();
        self.connector_links.clear();

        let mut connectors = BTreeSet::new();
        for cell in grid.cells() {
            let class = grid.classify(cell);
            if class.is_connector() {
                connectors.insert(cell);
            }
            if !class.is_region_member() || self.region_of(cell).is_some() {
                continue;
            }

            let id = self.alloc_region();
            let component = self
                .flood
                .grow(cell, |c, out| graph.neighbor_cells(c, out), |c| grid.classify(c).is_region_member())
                .to_vec();
            for member in component {
                self.assign(member, id);
            }
        }

        let affected = self.refresh_connectors(grid, graph, connectors);
        self.refresh_adjacency(affected);
        self.recompute_islands();

        info!(
            "[REGIONS] Rebuilt region index: {} regions, {} connectors, {} islands",
            self.region_count(),
            self.connector_links.len(),
            self.island_count
        );
    }

    #[inline]
    pub(super) fn index(&self, cell: Cell) -> Option<usize> {
        (cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height)
            .then(|| (cell.y * self.width + cell.x) as usize)
    }

    /// Region of a member cell. `None` for blocked cells and connectors.
    #[inline]
    pub fn region_of(&self, cell: Cell) -> Option<RegionId> {
        self.index(cell).and_then(|idx| self.cell_region[idx])
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub(super) fn region_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        self.regions.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter().flatten()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len() - self.free.len()
    }

    pub fn island_count(&self) -> usize {
        self.island_count
    }

    pub fn adjacent(&self, id: RegionId) -> Option<&BTreeSet<RegionId>> {
        self.region(id).map(|r| &r.adjacent)
    }

    /// Regions linked by a connector cell. Empty for non-connectors.
    pub fn connector_links(&self, cell: Cell) -> &[RegionId] {
        self.connector_links.get(&cell).map_or(&[], |links| links.as_slice())
    }

    /// Regions an endpoint resolves to: its own region, or the regions a
    /// connector links.
    fn endpoint_regions(&self, cell: Cell) -> ConnectorLinks {
        match self.region_of(cell) {
            Some(id) => std::iter::once(id).collect(),
            None => self.connector_links.get(&cell).cloned().unwrap_or_default(),
        }
    }

    /// Whether `b` is reachable from `a` at all, ignoring per-agent rules.
    ///
    /// Answered from cached islands; never touches the cell graph.
    pub fn connected(&self, a: Cell, b: Cell) -> bool {
        if a == b {
            return self.region_of(a).is_some() || self.connector_links.contains_key(&a);
        }

        let from = self.endpoint_regions(a);
        let to = self.endpoint_regions(b);
        let answer = from.iter().any(|&ra| {
            let island = self.region(ra).map(Region::island);
            to.iter().any(|&rb| island.is_some() && self.region(rb).map(Region::island) == island)
        });

        debug_assert_eq!(answer, self.connected_by_search(&from, &to), "island cache out of date");
        answer
    }

    /// BFS over region adjacency. Reference answer for the island cache.
    fn connected_by_search(&self, from: &[RegionId], to: &[RegionId]) -> bool {
        let mut seen: FxHashSet<RegionId> = from.iter().copied().collect();
        let mut queue: std::collections::VecDeque<RegionId> = from.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if to.contains(&id) {
                return true;
            }
            if let Some(region) = self.region(id) {
                for &next in &region.adjacent {
                    if seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        false
    }

    /// Canonical view of the partition: each region's cells sorted, regions
    /// sorted. Two indexes over the same grid compare equal regardless of ids.
    pub fn partition(&self) -> Vec<Vec<Cell>> {
        let mut parts: Vec<Vec<Cell>> = self
            .regions()
            .map(|r| {
                let mut cells: Vec<Cell> = r.cells().collect();
                cells.sort();
                cells
            })
            .collect();
        parts.sort();
        parts
    }

    /// Region adjacency keyed by each region's smallest cell, id independent.
    pub fn adjacency_pairs(&self) -> BTreeSet<(Cell, Cell)> {
        let key = |id: RegionId| self.region(id).and_then(|r| r.cells().min());
        let mut pairs = BTreeSet::new();
        for region in self.regions() {
            let Some(a) = key(region.id) else { continue };
            for &other in &region.adjacent {
                if let Some(b) = key(other) {
                    pairs.insert((a, b));
                }
            }
        }
        pairs
    }

    fn alloc_region(&mut self) -> RegionId {
        if let Some(slot) = self.free.pop() {
            let id = RegionId(slot);
            self.regions[slot as usize] = Some(Region::new(id));
            return id;
        }
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(Some(Region::new(id)));
        id
    }

    fn free_region(&mut self, id: RegionId) -> Option<Region> {
        let region = self.regions.get_mut(id.0 as usize)?.take()?;
        self.free.push(id.0);
        Some(region)
    }

    fn assign(&mut self, cell: Cell, id: RegionId) {
        let Some(idx) = self.index(cell) else { return };
        if let Some(old) = self.cell_region[idx].replace(id) {
            if let Some(region) = self.region_mut(old) {
                region.cells.remove(&cell);
            }
        }
        if let Some(region) = self.region_mut(id) {
            region.cells.insert(cell);
        }
    }

    fn unassign(&mut self, cell: Cell) -> Option<RegionId> {
        let idx = self.index(cell)?;
        let old = self.cell_region[idx].take()?;
        if let Some(region) = self.region_mut(old) {
            region.cells.remove(&cell);
        }
        Some(old)
    }

    /// Apply one batch of class changes. The grid and graph must already
    /// reflect the edit.
    #[profile(4)]
    pub fn apply_changes(
        &mut self,
        grid: &WalkabilityGrid,
        graph: &NavigationGraph,
        changes: &[ClassChange],
    ) -> RegionDelta {
        let mut delta = RegionDelta::default();
        if changes.is_empty() {
            return delta;
        }

        let mut ring_set = BTreeSet::new();
        for change in changes {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let cell = change.cell.offset(dx, dy);
                    if grid.in_bounds(cell) {
                        ring_set.insert(cell);
                    }
                }
            }
        }
        let ring: Vec<Cell> = ring_set.into_iter().collect();

        let mut split_candidates = BTreeSet::new();
        let mut dirty_connectors = BTreeSet::new();

        // 1. Leave
        for change in changes {
            if change.old.is_connector() && !change.new.is_connector() {
                dirty_connectors.insert(change.cell);
            }
            if change.old.is_region_member() && !change.new.is_region_member() {
                if let Some(id) = self.unassign(change.cell) {
                    split_candidates.insert(id);
                }
            }
            if change.is_degraded() {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        if let Some(id) = self.region_of(change.cell.offset(dx, dy)) {
                            split_candidates.insert(id);
                        }
                    }
                }
            }
        }

        // 2. Split
        for id in split_candidates {
            self.split_if_disconnected(graph, id, &ring, &mut delta, &mut dirty_connectors);
        }

        // 3. Join
        let mut buf = crate::structures::NeighborBuf::new();
        for change in changes {
            if !change.new.is_region_member() || change.old.is_region_member() {
                continue;
            }
            if self.region_of(change.cell).is_some() {
                continue;
            }
            buf.clear();
            graph.neighbor_cells(change.cell, &mut buf);
            let id = match buf.iter().find_map(|&n| self.region_of(n)) {
                Some(id) => id,
                None => {
                    let id = self.alloc_region();
                    delta.created.push(id);
                    id
                }
            };
            self.assign(change.cell, id);
        }

        // 4. Merge
        let mut survivors = BTreeSet::new();
        for &cell in &ring {
            buf.clear();
            graph.neighbor_cells(cell, &mut buf);
            for &next in &buf {
                let (Some(a), Some(b)) = (self.region_of(cell), self.region_of(next)) else {
                    continue;
                };
                if a == b {
                    continue;
                }
                let (survivor, loser) = self.merge(a, b, &mut dirty_connectors);
                survivors.remove(&loser);
                survivors.insert(survivor);
                delta.destroyed.push(loser);
                delta.merges += 1;
            }
        }
        for id in survivors {
            self.confirm_merge(grid, graph, id, &mut delta, &mut dirty_connectors);
        }

        // 5. Connectors and adjacency
        for &cell in &ring {
            if grid.classify(cell).is_connector() {
                dirty_connectors.insert(cell);
            }
        }
        let mut affected = self.refresh_connectors(grid, graph, dirty_connectors);
        affected.extend(delta.created.iter().copied());
        self.refresh_adjacency(affected);

        // 6. Islands
        self.recompute_islands();

        if !delta.is_empty() {
            debug!(
                "[REGIONS] {} changes: +{} -{} regions, {} merges, {} splits, {} regions in {} islands",
                changes.len(),
                delta.created.len(),
                delta.destroyed.len(),
                delta.merges,
                delta.splits,
                self.region_count(),
                self.island_count
            );
        }
        delta
    }

    /// Merge two regions. The larger one survives; ties keep the lower id.
    fn merge(&mut self, a: RegionId, b: RegionId, dirty_connectors: &mut BTreeSet<Cell>) -> (RegionId, RegionId) {
        let len_a = self.region(a).map_or(0, Region::len);
        let len_b = self.region(b).map_or(0, Region::len);
        let (survivor, loser) = if (len_a, Reverse(a)) >= (len_b, Reverse(b)) { (a, b) } else { (b, a) };

        let Some(lost) = self.free_region(loser) else {
            return (survivor, loser);
        };
        dirty_connectors.extend(lost.connectors.iter().copied());
        for &cell in &lost.cells {
            if let Some(idx) = self.index(cell) {
                self.cell_region[idx] = Some(survivor);
            }
        }
        if let Some(region) = self.region_mut(survivor) {
            region.cells.extend(lost.cells);
        }
        (survivor, loser)
    }

    /// Flood the merged region over member cells and relabel on mismatch.
    fn confirm_merge(
        &mut self,
        grid: &WalkabilityGrid,
        graph: &NavigationGraph,
        id: RegionId,
        delta: &mut RegionDelta,
        dirty_connectors: &mut BTreeSet<Cell>,
    ) {
        let Some(seed) = self.region(id).and_then(|r| r.cells().min()) else {
            return;
        };
        let component = self
            .flood
            .grow(seed, |c, out| graph.neighbor_cells(c, out), |c| grid.classify(c).is_region_member())
            .to_vec();

        let expected = self.region(id).map_or(0, Region::len);
        let foreign = component.iter().filter(|&&c| self.region_of(c) != Some(id)).count();
        if component.len() == expected && foreign == 0 {
            return;
        }

        warn!(
            "[REGIONS] Merge check for {:?}: flood reached {} cells ({} foreign), region holds {}. Relabelling",
            id,
            component.len(),
            foreign,
            expected
        );
        let mut losers = BTreeSet::new();
        for &cell in &component {
            match self.region_of(cell) {
                Some(old) if old == id => continue,
                Some(old) => {
                    losers.insert(old);
                }
                None => {}
            }
            self.assign(cell, id);
            delta.relabelled += 1;
        }
        for old in losers {
            if self.region(old).is_some_and(Region::is_empty) {
                if let Some(lost) = self.free_region(old) {
                    dirty_connectors.extend(lost.connectors);
                    delta.destroyed.push(old);
                }
            }
        }
        if component.len() < self.region(id).map_or(0, Region::len) {
            let seeds = [seed];
            self.split_if_disconnected(graph, id, &seeds, delta, dirty_connectors);
        }
    }

    /// Split a region into its connected components, or destroy it if empty.
    fn split_if_disconnected(
        &mut self,
        graph: &NavigationGraph,
        id: RegionId,
        seeds: &[Cell],
        delta: &mut RegionDelta,
        dirty_connectors: &mut BTreeSet<Cell>,
    ) {
        let Some(total) = self.region(id).map(Region::len) else {
            return;
        };
        if total == 0 {
            if let Some(lost) = self.free_region(id) {
                dirty_connectors.extend(lost.connectors);
                delta.destroyed.push(id);
            }
            return;
        }

        let mut components = self.components_of(graph, id, seeds, total);
        if components.len() <= 1 {
            return;
        }

        if let Some(region) = self.region(id) {
            dirty_connectors.extend(region.connectors.iter().copied());
        }
        // Stable: ties keep discovery order.
        components.sort_by_key(|c| Reverse(c.len()));
        for component in components.iter().skip(1) {
            let new_id = self.alloc_region();
            for &cell in component {
                self.assign(cell, new_id);
            }
            delta.created.push(new_id);
        }
        delta.splits += components.len() - 1;
    }

    /// Connected components of one region, restricted to its own cells.
    fn components_of(&mut self, graph: &NavigationGraph, id: RegionId, seeds: &[Cell], total: usize) -> Vec<Vec<Cell>> {
        let mut covered: FxHashSet<Cell> = FxHashSet::default();
        let mut components = Vec::new();

        let mut rest = Vec::new();
        let mut pass = 0;
        while covered.len() < total && pass < 2 {
            let candidates: &[Cell] = if pass == 0 { seeds } else { &rest };
            for &seed in candidates {
                if covered.len() == total {
                    break;
                }
                if covered.contains(&seed) || label_at(&self.cell_region, self.width, seed) != Some(id) {
                    continue;
                }
                let (flood, cell_region, width) = (&mut self.flood, &self.cell_region, self.width);
                let component = flood
                    .grow(seed, |c, out| graph.neighbor_cells(c, out), |c| label_at(cell_region, width, c) == Some(id))
                    .to_vec();
                covered.extend(component.iter().copied());
                components.push(component);
            }
            if pass == 0 && covered.len() < total {
                rest = self
                    .region(id)
                    .map(|r| r.cells().filter(|c| !covered.contains(c)).collect())
                    .unwrap_or_default();
                rest.sort();
            }
            pass += 1;
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_index(w: i32, h: i32) -> (WalkabilityGrid, NavigationGraph, RegionIndex) {
        let grid = WalkabilityGrid::new(w, h);
        let graph = NavigationGraph::build(&grid, true);
        let index = RegionIndex::build(&grid, &graph);
        (grid, graph, index)
    }

    #[test]
    fn test_merge_check_relabels_split_labels() {
        let (grid, graph, mut index) = open_index(6, 3);
        let main = index.region_of(Cell::new(0, 0)).unwrap();

        // East half carries its own label although it is connected to the west.
        let stray = index.alloc_region();
        let east: Vec<Cell> = (3..6).flat_map(|x| (0..3).map(move |y| Cell::new(x, y))).collect();
        for &cell in &east {
            index.assign(cell, stray);
        }
        assert_eq!(index.region_count(), 2);

        let mut delta = RegionDelta::default();
        let mut dirty = BTreeSet::new();
        index.confirm_merge(&grid, &graph, main, &mut delta, &mut dirty);

        assert_eq!(delta.relabelled, east.len());
        assert_eq!(delta.destroyed, vec![stray]);
        assert_eq!(index.region_count(), 1);
        assert!(east.iter().all(|&c| index.region_of(c) == Some(main)));
        assert_eq!(index.partition(), RegionIndex::build(&grid, &graph).partition());
    }

    #[test]
    fn test_merge_check_restores_missing_label() {
        let (grid, graph, mut index) = open_index(4, 4);
        let main = index.region_of(Cell::new(0, 0)).unwrap();
        let lost = Cell::new(2, 2);
        assert_eq!(index.unassign(lost), Some(main));
        assert_eq!(index.region_of(lost), None);

        let mut delta = RegionDelta::default();
        let mut dirty = BTreeSet::new();
        index.confirm_merge(&grid, &graph, main, &mut delta, &mut dirty);

        assert_eq!(delta.relabelled, 1);
        assert!(delta.destroyed.is_empty());
        assert_eq!(index.region_of(lost), Some(main));
        assert_eq!(index.region(main).map(Region::len), Some(16));
    }

    #[test]
    fn test_consistent_merge_relabels_nothing() {
        let (grid, graph, mut index) = open_index(5, 5);
        let main = index.region_of(Cell::new(0, 0)).unwrap();

        let mut delta = RegionDelta::default();
        let mut dirty = BTreeSet::new();
        index.confirm_merge(&grid, &graph, main, &mut delta, &mut dirty);

        assert!(delta.is_empty());
    }
}
