/// Tests for incremental graph and region maintenance
///
/// The incremental update path is checked against a full rebuild after every
/// edit of long randomized edit sequences, plus targeted cases for the
/// merge/split id rules.

use super::*;
use crate::config::NavConfig;
use crate::structures::{Terrain, TileObject, WalkabilityGrid};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

fn inline_nav(grid: WalkabilityGrid, diagonal: bool) -> Navigator {
    let config = NavConfig {
        worker_count: 0,
        diagonal_movement: diagonal,
        ..Default::default()
    };
    Navigator::new(grid, config)
}

/// Compare the incrementally maintained state with a from-scratch build.
fn assert_matches_rebuild(nav: &Navigator, context: &str) {
    let grid = nav.grid();
    let fresh_graph = NavigationGraph::build(grid, nav.graph().diagonal_movement());
    for cell in grid.cells() {
        assert_eq!(
            nav.graph().edge_mask(cell),
            fresh_graph.edge_mask(cell),
            "{}: edge mask mismatch at {}",
            context,
            cell
        );
        assert_eq!(
            nav.regions().region_of(cell).is_some(),
            grid.classify(cell).is_region_member(),
            "{}: membership mismatch at {}",
            context,
            cell
        );
    }

    let fresh = RegionIndex::build(grid, &fresh_graph);
    assert_eq!(nav.regions().partition(), fresh.partition(), "{}: partition diverged", context);
    assert_eq!(nav.regions().adjacency_pairs(), fresh.adjacency_pairs(), "{}: adjacency diverged", context);
    assert_eq!(nav.regions().island_count(), fresh.island_count(), "{}: island count diverged", context);
    for cell in grid.cells() {
        assert_eq!(
            nav.regions().connector_links(cell).len(),
            fresh.connector_links(cell).len(),
            "{}: connector links diverged at {}",
            context,
            cell
        );
    }
}

/// Plain BFS over graph edges, ignoring regions entirely.
fn graph_reachable(graph: &NavigationGraph, a: Cell, b: Cell) -> bool {
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::from([a]);
    seen.insert(a);
    while let Some(cell) = queue.pop_front() {
        if cell == b {
            return true;
        }
        for (next, _) in graph.neighbors(cell) {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    false
}

fn random_edit(nav: &mut Navigator, rng: &mut fastrand::Rng) -> EditReport {
    let (w, h) = (nav.grid().width(), nav.grid().height());
    let anchor = Cell::new(rng.i32(0..w), rng.i32(0..h));
    let mut footprint = vec![anchor];
    if rng.u8(0..4) == 0 {
        let other = if rng.bool() { anchor.offset(1, 0) } else { anchor.offset(0, 1) };
        if nav.grid().in_bounds(other) {
            footprint.push(other);
        }
    }

    let result = match rng.u8(0..10) {
        0..=2 => nav.on_object_placed(anchor, TileObject::Wall, &footprint),
        3 => nav.on_object_placed(anchor, TileObject::Door, &footprint),
        4 => nav.on_object_placed(anchor, TileObject::Walkable, &footprint),
        5 => {
            let terrain = if rng.bool() { Terrain::Impassable } else { Terrain::Ground };
            nav.set_terrain(anchor, terrain)
        }
        _ => nav.on_object_removed(anchor, &footprint),
    };
    result.unwrap()
}

fn run_random_edits(seed: u64, diagonal: bool, steps: usize) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut nav = inline_nav(WalkabilityGrid::new(12, 12), diagonal);

    for step in 0..steps {
        random_edit(&mut nav, &mut rng);
        assert_matches_rebuild(&nav, &format!("seed {} step {}", seed, step));
    }
}

#[test]
fn test_random_edits_match_full_rebuild() {
    for seed in [1, 7, 42] {
        run_random_edits(seed, true, 300);
    }
}

#[test]
fn test_random_edits_match_full_rebuild_four_connected() {
    run_random_edits(99, false, 300);
}

#[test]
fn test_connected_matches_graph_reachability() {
    let mut rng = fastrand::Rng::with_seed(2024);
    let mut nav = inline_nav(WalkabilityGrid::new(10, 10), true);

    for step in 0..150 {
        random_edit(&mut nav, &mut rng);
        if step % 5 != 0 {
            continue;
        }
        for _ in 0..30 {
            let a = Cell::new(rng.i32(0..10), rng.i32(0..10));
            let b = Cell::new(rng.i32(0..10), rng.i32(0..10));
            let grid = nav.grid();
            if !grid.classify(a).is_passable() || !grid.classify(b).is_passable() {
                assert!(!nav.is_reachable(a, b));
                continue;
            }
            // A closet of doors with no floor around it links no region.
            let regions = nav.regions();
            let isolated = |c: Cell| regions.region_of(c).is_none() && regions.connector_links(c).is_empty();
            if a != b && isolated(a) && isolated(b) {
                continue;
            }
            assert_eq!(
                nav.is_reachable(a, b),
                graph_reachable(nav.graph(), a, b),
                "step {}: {} -> {}",
                step,
                a,
                b
            );
        }
    }
}

#[test]
fn test_place_remove_round_trip() {
    let grid = WalkabilityGrid::from_rows(&[
        "..........",
        ".####D###.",
        ".#......#.",
        ".#......#.",
        ".########.",
        "..........",
    ]);
    let mut nav = inline_nav(grid, true);
    let partition = nav.regions().partition();
    let adjacency = nav.regions().adjacency_pairs();
    let masks: Vec<u8> = nav.grid().cells().map(|c| nav.graph().edge_mask(c)).collect();

    let footprint = [Cell::new(4, 2), Cell::new(4, 3)];
    let placed = nav.on_object_placed(Cell::new(4, 2), TileObject::Wall, &footprint).unwrap();
    assert_eq!(placed.changes.len(), 2);
    assert_eq!(placed.regions.splits, 1, "the wall cuts the room in two");
    assert_ne!(nav.regions().partition(), partition);

    nav.on_object_removed(Cell::new(4, 2), &footprint).unwrap();
    assert_eq!(nav.regions().partition(), partition);
    assert_eq!(nav.regions().adjacency_pairs(), adjacency);
    let after: Vec<u8> = nav.grid().cells().map(|c| nav.graph().edge_mask(c)).collect();
    assert_eq!(after, masks);
}

#[test]
fn test_split_keeps_largest_id() {
    let mut nav = inline_nav(WalkabilityGrid::new(7, 3), true);
    let original = nav.regions().region_of(Cell::new(0, 0)).unwrap();

    let wall: Vec<Cell> = (0..3).map(|y| Cell::new(2, y)).collect();
    let report = nav.on_object_placed(Cell::new(2, 0), TileObject::Wall, &wall).unwrap();

    assert_eq!(report.regions.splits, 1);
    assert_eq!(nav.regions().region_count(), 2);
    assert_eq!(nav.regions().region_of(Cell::new(6, 0)), Some(original), "larger side keeps the id");
    let small = nav.regions().region_of(Cell::new(0, 0)).unwrap();
    assert_ne!(small, original);
    assert_eq!(nav.regions().region(small).unwrap().len(), 6);
    assert_eq!(report.regions.created, vec![small]);
}

#[test]
fn test_merge_keeps_larger_region_id() {
    let grid = WalkabilityGrid::from_rows(&[
        "..#....",
        "..#....",
        "..#....",
    ]);
    let mut nav = inline_nav(grid, true);
    let left = nav.regions().region_of(Cell::new(0, 0)).unwrap();
    let right = nav.regions().region_of(Cell::new(6, 0)).unwrap();
    assert_ne!(left, right);

    let wall: Vec<Cell> = (0..3).map(|y| Cell::new(2, y)).collect();
    let report = nav.on_object_removed(Cell::new(2, 0), &wall).unwrap();

    assert_eq!(report.regions.merges, 1);
    assert_eq!(report.regions.relabelled, 0, "confirmatory flood agrees");
    assert_eq!(nav.regions().region_count(), 1);
    assert_eq!(nav.regions().region_of(Cell::new(0, 0)), Some(right));
    assert_eq!(nav.regions().region(right).unwrap().len(), 21);
    assert!(nav.regions().region(left).is_none());
}

#[test]
fn test_unaffected_region_keeps_id() {
    let grid = WalkabilityGrid::from_rows(&[
        "....#....",
        "....#....",
        "....#....",
        "....#....",
    ]);
    let mut nav = inline_nav(grid, true);
    let east = nav.regions().region_of(Cell::new(8, 0)).unwrap();

    // Carve the west room in two.
    let wall: Vec<Cell> = (0..4).map(|y| Cell::new(1, y)).collect();
    nav.on_object_placed(Cell::new(1, 0), TileObject::Wall, &wall).unwrap();
    assert_eq!(nav.regions().region_of(Cell::new(8, 3)), Some(east));
    assert_eq!(nav.regions().region_count(), 3);
}

#[test]
fn test_new_floor_in_sealed_area_founds_region() {
    let grid = WalkabilityGrid::from_rows(&[
        "#####",
        "#####",
        "#####",
    ]);
    let mut nav = inline_nav(grid, true);
    assert_eq!(nav.regions().region_count(), 0);

    let report = nav.on_object_removed(Cell::new(2, 1), &[]).unwrap();
    assert_eq!(report.regions.created.len(), 1);
    assert_eq!(nav.regions().region_count(), 1);
    assert_eq!(nav.regions().island_count(), 1);
}

#[test]
fn test_door_replaced_by_wall_unlinks_rooms() {
    let grid = WalkabilityGrid::from_rows(&[
        "..#..",
        "..D..",
        "..#..",
    ]);
    let mut nav = inline_nav(grid, true);
    assert!(nav.is_reachable(Cell::new(0, 0), Cell::new(4, 2)));
    assert_eq!(nav.regions().island_count(), 1);

    nav.on_object_placed(Cell::new(2, 1), TileObject::Wall, &[]).unwrap();
    assert!(!nav.is_reachable(Cell::new(0, 0), Cell::new(4, 2)));
    assert_eq!(nav.regions().island_count(), 2);
    assert!(nav.regions().connector_links(Cell::new(2, 1)).is_empty());
    assert_matches_rebuild(&nav, "door walled up");
}

#[test]
fn test_no_region_link_through_solid_corner() {
    let grid = WalkabilityGrid::from_rows(&[
        ".#",
        "#.",
    ]);
    let nav = inline_nav(grid, true);
    assert_eq!(nav.regions().region_count(), 2);
    assert!(!nav.is_reachable(Cell::new(0, 1), Cell::new(1, 0)));
}

#[test]
fn test_out_of_bounds_edit_changes_nothing() {
    let mut nav = inline_nav(WalkabilityGrid::new(4, 4), true);
    let footprint = [Cell::new(3, 3), Cell::new(4, 3)];
    let result = nav.on_object_placed(Cell::new(3, 3), TileObject::Wall, &footprint);
    assert_eq!(result, Err(GridError::OutOfBounds(Cell::new(4, 3))));
    assert_eq!(nav.grid().classify(Cell::new(3, 3)), Enterability::Immediate);
    assert_eq!(nav.version(), 0);
}

#[test]
fn test_noop_edit_keeps_version() {
    let mut nav = inline_nav(WalkabilityGrid::new(4, 4), true);
    let report = nav.on_object_placed(Cell::new(1, 1), TileObject::Walkable, &[]).unwrap();
    assert!(report.is_noop());
    assert_eq!(nav.version(), 0);
    assert_eq!(nav.graph().version(), 0);
}

#[test]
fn test_enclosed_room() {
    let grid = WalkabilityGrid::from_rows(&[
        "........",
        ".######.",
        ".#....D.",
        ".#....#.",
        ".######.",
        "........",
    ]);
    let mut nav = inline_nav(grid, true);

    let room = nav.enclosed_room(Cell::new(3, 2)).expect("room is closed by walls and a door");
    assert_eq!(room.len(), 8);
    assert!(nav.enclosed_room(Cell::new(0, 0)).is_none(), "outside touches the map edge");

    // Knock a hole in the wall: the room leaks.
    nav.on_object_removed(Cell::new(1, 3), &[]).unwrap();
    assert!(nav.enclosed_room(Cell::new(3, 2)).is_none());
}
