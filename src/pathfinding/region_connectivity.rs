//! Region adjacency through connector cells, and island detection.
//!
//! A connector (door) links the regions of its graph neighbours, which are
//! exactly its open sides: a door set into a horizontal wall has edges only
//! to the north and south, one in a vertical wall only east and west. Doors
//! standing next to each other are grouped and share one link set, so an
//! airlock of two doors still joins the rooms on either end.

use super::graph::NavigationGraph;
use super::region_index::{ConnectorLinks, RegionIndex};
use super::types::{Cell, IslandId, RegionId};
use crate::structures::{NeighborBuf, WalkabilityGrid};
use rustc_hash::FxHashSet;
use std::collections::{BTreeSet, VecDeque};

impl RegionIndex {
    /// Recompute the links of every connector group containing a dirty cell.
    /// Dirty cells that are no longer connectors have their links dropped.
    ///
    /// Returns every region that gained or lost a link.
    pub(super) fn refresh_connectors(
        &mut self,
        grid: &WalkabilityGrid,
        graph: &NavigationGraph,
        dirty: BTreeSet<Cell>,
    ) -> BTreeSet<RegionId> {
        let mut affected = BTreeSet::new();
        let mut done: FxHashSet<Cell> = FxHashSet::default();
        let mut buf = NeighborBuf::new();

        for cell in dirty {
            if !done.insert(cell) {
                continue;
            }

            if !grid.classify(cell).is_connector() {
                if let Some(old) = self.connector_links.remove(&cell) {
                    self.unlink(cell, &old, &mut affected);
                }
                continue;
            }

            let group = self
                .flood
                .grow(cell, |c, out| graph.neighbor_cells(c, out), |c| grid.classify(c).is_connector())
                .to_vec();

            let mut links = ConnectorLinks::new();
            for &member in &group {
                buf.clear();
                graph.neighbor_cells(member, &mut buf);
                for &next in &buf {
                    if let Some(id) = self.region_of(next) {
                        if !links.contains(&id) {
                            links.push(id);
                        }
                    }
                }
            }
            links.sort();

            for &member in &group {
                done.insert(member);
                if let Some(old) = self.connector_links.insert(member, links.clone()) {
                    self.unlink(member, &old, &mut affected);
                }
            }
            for &member in &group {
                for &id in &links {
                    if let Some(region) = self.region_mut(id) {
                        region.connectors.insert(member);
                    }
                    affected.insert(id);
                }
            }
        }

        affected
    }

    fn unlink(&mut self, cell: Cell, old: &[RegionId], affected: &mut BTreeSet<RegionId>) {
        for &id in old {
            if let Some(region) = self.region_mut(id) {
                region.connectors.remove(&cell);
            }
            affected.insert(id);
        }
    }

    /// Rebuild `adjacent` for the given regions from their connectors' links.
    ///
    /// Adjacency is symmetric because both sides of a link are always in the
    /// affected set together.
    pub(super) fn refresh_adjacency(&mut self, affected: impl IntoIterator<Item = RegionId>) {
        for id in affected {
            let Some(region) = self.region(id) else { continue };
            let adjacent: BTreeSet<RegionId> = region
                .connectors
                .iter()
                .filter_map(|conn| self.connector_links.get(conn))
                .flat_map(|links| links.iter().copied())
                .filter(|&other| other != id)
                .collect();
            if let Some(region) = self.region_mut(id) {
                region.adjacent = adjacent;
            }
        }
    }

    /// Label connected components of the region graph.
    ///
    /// Iterative BFS in slot order, so island ids are deterministic for a
    /// given partition.
    pub(super) fn recompute_islands(&mut self) {
        let mut labels: Vec<Option<IslandId>> = vec![None; self.regions.len()];
        let mut queue = VecDeque::new();
        let mut next = 0u32;

        for start in 0..self.regions.len() {
            if self.regions[start].is_none() || labels[start].is_some() {
                continue;
            }
            let island = IslandId(next);
            next += 1;
            labels[start] = Some(island);
            queue.push_back(start);

            while let Some(slot) = queue.pop_front() {
                let Some(region) = &self.regions[slot] else { continue };
                for other in &region.adjacent {
                    let other = other.0 as usize;
                    if other < labels.len() && labels[other].is_none() && self.regions[other].is_some() {
                        labels[other] = Some(island);
                        queue.push_back(other);
                    }
                }
            }
        }

        for (slot, label) in labels.into_iter().enumerate() {
            if let (Some(region), Some(island)) = (self.regions[slot].as_mut(), label) {
                region.island = island;
            }
        }
        self.island_count = next as usize;
    }
}
