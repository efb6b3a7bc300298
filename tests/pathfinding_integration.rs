/// Integration tests for the navigation facade: requests, edits and the
/// reachability scenarios an agent runs into on a small map.
use colony_nav::config::NavConfig;
use colony_nav::pathfinding::{Cell, Navigator, Path, PathError, PathStatus, RequestStatus, Walker};
use colony_nav::structures::{FloodFill, FloodOutcome, Neighborhood, TileObject, WalkabilityGrid};
use std::sync::{Arc, Mutex};

type Slot = Arc<Mutex<Option<Result<Path, PathError>>>>;

/// Inline navigator: searches run inside `pump`, so results are deterministic.
fn navigator(grid: WalkabilityGrid) -> Navigator {
    let config = NavConfig {
        worker_count: 0,
        ..Default::default()
    };
    Navigator::new(grid, config)
}

/// Request a path and pump once, returning what the callback received.
fn request_and_pump(nav: &mut Navigator, start: Cell, goal: Cell, walker: Walker) -> (RequestStatus, Result<Path, PathError>) {
    let slot: Slot = Arc::default();
    let sink = Arc::clone(&slot);
    let status = nav.request_path(start, goal, walker, move |result| {
        let mut guard = sink.lock().unwrap();
        assert!(guard.is_none(), "callback invoked twice");
        *guard = Some(result);
    });
    nav.pump();
    let result = slot.lock().unwrap().take().expect("callback not invoked");
    (status, result)
}

fn wall_column(x: i32, height: i32) -> Vec<Cell> {
    (0..height).map(|y| Cell::new(x, y)).collect()
}

#[test]
fn test_scenario_a_open_grid_straight_diagonal() {
    let mut nav = navigator(WalkabilityGrid::new(5, 5));
    let (status, result) = request_and_pump(&mut nav, Cell::new(0, 0), Cell::new(4, 4), Walker::default());

    assert!(status.is_queued());
    let path = result.unwrap();
    assert_eq!(path.smooth_len(), 2);
    assert_eq!(path.waypoints(), &[Cell::new(0, 0), Cell::new(4, 4)]);
    assert_eq!(path.cells().len(), 5);
    assert!(path.is_valid());
}

#[test]
fn test_scenario_b_wall_rejects_unreachable_without_queuing() {
    let mut nav = navigator(WalkabilityGrid::new(5, 5));
    nav.on_object_placed(Cell::new(2, 0), TileObject::Wall, &wall_column(2, 5)).unwrap();

    let (left, right) = (Cell::new(0, 2), Cell::new(4, 2));
    assert!(!nav.is_reachable(left, right));

    let slot: Slot = Arc::default();
    let sink = Arc::clone(&slot);
    let status = nav.request_path(left, right, Walker::default(), move |r| *sink.lock().unwrap() = Some(r));

    assert!(matches!(status, RequestStatus::Rejected(_, PathError::Unreachable)));
    assert_eq!(nav.pending_request_count(), 0, "rejected requests are never queued");
    assert!(slot.lock().unwrap().is_none(), "callback waits for pump");

    nav.pump();
    assert!(matches!(*slot.lock().unwrap(), Some(Err(PathError::Unreachable))));
    assert_eq!(nav.stats().rejected, 1);
}

#[test]
fn test_scenario_c_door_reconnects_halves() {
    let mut nav = navigator(WalkabilityGrid::new(5, 5));
    nav.on_object_placed(Cell::new(2, 0), TileObject::Wall, &wall_column(2, 5)).unwrap();
    let door = Cell::new(2, 2);
    nav.on_object_placed(door, TileObject::Door, &[]).unwrap();

    let (left, right) = (Cell::new(0, 0), Cell::new(4, 4));
    assert!(nav.is_reachable(left, right));

    let (status, result) = request_and_pump(&mut nav, left, right, Walker::default());
    assert!(status.is_queued());
    let path = result.unwrap();
    assert!(path.cells().contains(&door), "route must pass the door: {:?}", path.cells());
    assert!(path.remaining_footprint().contains(&door));

    // An agent that cannot open doors passes the region check but fails the search.
    let (status, result) = request_and_pump(&mut nav, left, right, Walker::without_doors());
    assert!(status.is_queued());
    assert_eq!(result.unwrap_err(), PathError::NoPath);
}

#[test]
fn test_scenario_d_blocking_remaining_waypoint_invalidates() {
    let mut nav = navigator(WalkabilityGrid::new(8, 3));
    let (_, result) = request_and_pump(&mut nav, Cell::new(0, 1), Cell::new(7, 1), Walker::default());
    let mut path = result.unwrap();
    assert_eq!(path.waypoints(), &[Cell::new(0, 1), Cell::new(7, 1)]);
    assert_eq!(path.status(), PathStatus::Following);

    let report = nav.on_object_placed(Cell::new(5, 1), TileObject::Wall, &[]).unwrap();
    assert_eq!(report.invalidated_paths, 1);
    assert!(!path.is_valid());
    assert_eq!(path.check(), Err(PathError::InvalidatedMidFlight));
    assert_eq!(path.status(), PathStatus::Invalid);

    // The owner can still read the path; the system only cleared the flag.
    assert_eq!(path.current(), Some(Cell::new(7, 1)));
    path.advance();
    assert!(path.is_at_end());
}

#[test]
fn test_scenario_d_walked_segments_do_not_invalidate() {
    let grid = WalkabilityGrid::from_rows(&[
        "......",
        "......",
        "#####.",
        "......",
    ]);
    let mut nav = navigator(grid);
    let (_, result) = request_and_pump(&mut nav, Cell::new(0, 0), Cell::new(0, 3), Walker::default());
    let mut path = result.unwrap();
    assert!(path.smooth_len() >= 3, "route bends around the wall: {:?}", path.waypoints());

    // Walk to the last waypoint, then block a cell only the first segment used.
    while path.remaining_length() > 1 {
        path.advance();
    }
    let behind = path.cells()[1];
    let report = nav.on_object_placed(behind, TileObject::Wall, &[]).unwrap();
    assert_eq!(report.invalidated_paths, 0);
    assert!(path.is_valid());
}

#[test]
fn test_scenario_e_flood_open_to_outside_never_completes() {
    let grid = WalkabilityGrid::from_rows(&[
        ".......",
        ".#####.",
        ".#...#.",
        ".#....",
        ".#####.",
        ".......",
    ]);
    let (w, h) = (grid.width(), grid.height());
    let mut flood = FloodFill::new(w, h);
    let mut completed = false;

    let outcome = flood.flood(
        Cell::new(3, 3),
        Neighborhood::Orthogonal,
        |c| grid.classify(c).is_region_member(),
        |c| c.x > 0 && c.y > 0 && c.x < w - 1 && c.y < h - 1,
        |_| completed = true,
    );

    assert!(matches!(outcome, FloodOutcome::Aborted { .. }));
    assert!(!completed);
}

#[test]
fn test_malformed_requests() {
    let grid = WalkabilityGrid::from_rows(&[
        "...",
        ".#.",
        "...",
    ]);
    let mut nav = navigator(grid);

    let (status, result) = request_and_pump(&mut nav, Cell::new(0, 0), Cell::new(9, 9), Walker::default());
    assert!(matches!(status, RequestStatus::Rejected(_, PathError::MalformedRequest)));
    assert_eq!(result.unwrap_err(), PathError::MalformedRequest);

    let (_, result) = request_and_pump(&mut nav, Cell::new(0, 0), Cell::new(1, 1), Walker::default());
    assert_eq!(result.unwrap_err(), PathError::MalformedRequest);
}

#[test]
fn test_start_equals_goal() {
    let mut nav = navigator(WalkabilityGrid::new(3, 3));
    let (_, result) = request_and_pump(&mut nav, Cell::new(1, 1), Cell::new(1, 1), Walker::default());
    let path = result.unwrap();
    assert_eq!(path.waypoints(), &[Cell::new(1, 1)]);
    assert!(path.is_at_end());
    assert_eq!(path.status(), PathStatus::Arrived);
}

#[test]
fn test_request_ids_are_unique() {
    let mut nav = navigator(WalkabilityGrid::new(4, 4));
    let a = nav.request_path(Cell::new(0, 0), Cell::new(3, 3), Walker::default(), |_| {});
    let b = nav.request_path(Cell::new(0, 0), Cell::new(9, 9), Walker::default(), |_| {});
    let c = nav.request_path(Cell::new(0, 0), Cell::new(3, 0), Walker::default(), |_| {});
    assert_ne!(a.id(), b.id());
    assert_ne!(b.id(), c.id());
    assert_eq!(nav.pending_request_count(), 2);
    assert_eq!(nav.pump(), 3);
    assert_eq!(nav.pending_request_count(), 0);
}
