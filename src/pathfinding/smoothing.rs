//! Waypoint smoothing for raw A* routes.
//!
//! Two passes: collinear runs collapse to their end points, then a greedy
//! line-of-sight pass jumps from each kept waypoint to the farthest later
//! waypoint it can see. Visibility is sampled with a supercover walk, which
//! visits every cell the segment touches; where the segment passes exactly
//! through a cell corner both flanking cells are visited, so a shortcut can
//! never squeeze between two diagonal walls.

use super::astar::SearchSnapshot;
use super::movement::MovementModifier;
use super::types::Cell;

/// Output of [`smooth`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SmoothedRoute {
    pub waypoints: Vec<Cell>,
    /// Supercover cells of every segment, in travel order.
    pub footprint: Vec<Cell>,
    /// Index in `footprint` where each segment starts.
    pub segment_starts: Vec<usize>,
}

/// Append every cell the segment between the centres of `a` and `b` touches,
/// both ends included.
pub fn supercover(a: Cell, b: Cell, out: &mut Vec<Cell>) {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let (nx, ny) = (dx.abs(), dy.abs());
    let (sx, sy) = (dx.signum(), dy.signum());
    let (mut x, mut y) = (a.x, a.y);
    let (mut ix, mut iy) = (0, 0);

    out.push(a);
    while ix < nx || iy < ny {
        // Sign of (0.5 + ix) / nx - (0.5 + iy) / ny: which grid line comes first.
        let decision = (1 + 2 * ix) * ny - (1 + 2 * iy) * nx;
        if decision == 0 {
            out.push(Cell::new(x + sx, y));
            out.push(Cell::new(x, y + sy));
            x += sx;
            y += sy;
            ix += 1;
            iy += 1;
        } else if decision < 0 {
            x += sx;
            ix += 1;
        } else {
            y += sy;
            iy += 1;
        }
        out.push(Cell::new(x, y));
    }
}

/// Whether an agent can walk the straight segment from `a` to `b`.
pub fn line_of_sight(snapshot: &SearchSnapshot, a: Cell, b: Cell, modifier: &dyn MovementModifier, scratch: &mut Vec<Cell>) -> bool {
    scratch.clear();
    supercover(a, b, scratch);
    scratch.iter().all(|&cell| snapshot.enterable(cell, modifier))
}

/// Drop intermediate cells that continue in the same direction.
pub fn collapse_collinear(raw: &[Cell]) -> Vec<Cell> {
    if raw.len() <= 2 {
        return raw.to_vec();
    }
    let step = |from: Cell, to: Cell| (to.x - from.x, to.y - from.y);

    let mut out = vec![raw[0]];
    for window in raw.windows(3) {
        if step(window[0], window[1]) != step(window[1], window[2]) {
            out.push(window[1]);
        }
    }
    out.extend(raw.last().copied());
    out
}

/// Smooth a raw route. With `shortcut` off only the collinear pass runs.
pub fn smooth(snapshot: &SearchSnapshot, raw: &[Cell], modifier: &dyn MovementModifier, shortcut: bool) -> SmoothedRoute {
    let points = collapse_collinear(raw);
    let mut scratch = Vec::new();

    let waypoints = if shortcut && points.len() > 2 {
        let mut kept = vec![points[0]];
        let mut i = 0;
        while i + 1 < points.len() {
            // The next collapsed point is always reachable: it came from the graph.
            let next = (i + 2..points.len())
                .rev()
                .find(|&k| line_of_sight(snapshot, points[i], points[k], modifier, &mut scratch))
                .unwrap_or(i + 1);
            kept.push(points[next]);
            i = next;
        }
        kept
    } else {
        points
    };

    let mut footprint = Vec::new();
    let mut segment_starts = Vec::with_capacity(waypoints.len().saturating_sub(1));
    for pair in waypoints.windows(2) {
        segment_starts.push(footprint.len());
        supercover(pair[0], pair[1], &mut footprint);
    }
    if footprint.is_empty() {
        footprint.extend(waypoints.first().copied());
    }

    SmoothedRoute {
        waypoints,
        footprint,
        segment_starts,
    }
}
