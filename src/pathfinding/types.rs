use serde::{Deserialize, Serialize};
use std::fmt;

/// One grid-addressable map location.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        Self::new(self.x + dx, self.y + dy)
    }

    #[inline]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev distance (king moves).
    pub fn chebyshev(self, other: Cell) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Cell {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// Directions for neighbor connectivity (cardinal + diagonal).
///
/// North is +y. The repr(u8) doubles as the bit index in a graph edge mask.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North = 0,
    South = 1,
    East = 2,
    West = 3,
    NorthEast = 4,
    NorthWest = 5,
    SouthEast = 6,
    SouthWest = 7,
}

impl Direction {
    /// All eight directions (cardinal + diagonal)
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::SouthEast,
        Direction::SouthWest,
    ];

    pub const CARDINAL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    #[inline]
    pub fn as_index(self) -> usize {
        self as usize
    }

    /// Bit for this direction in an edge mask.
    #[inline]
    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }

    #[inline]
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::South => (0, -1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
            Direction::NorthEast => (1, 1),
            Direction::NorthWest => (-1, 1),
            Direction::SouthEast => (1, -1),
            Direction::SouthWest => (-1, -1),
        }
    }

    #[inline]
    pub fn is_diagonal(self) -> bool {
        self as u8 >= 4
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::NorthEast => Direction::SouthWest,
            Direction::NorthWest => Direction::SouthEast,
            Direction::SouthEast => Direction::NorthWest,
            Direction::SouthWest => Direction::NorthEast,
        }
    }

    /// The two orthogonal directions flanking a diagonal move.
    /// A diagonal edge is only legal when both flank cells are passable.
    pub fn flanks(self) -> Option<(Direction, Direction)> {
        match self {
            Direction::NorthEast => Some((Direction::North, Direction::East)),
            Direction::NorthWest => Some((Direction::North, Direction::West)),
            Direction::SouthEast => Some((Direction::South, Direction::East)),
            Direction::SouthWest => Some((Direction::South, Direction::West)),
            _ => None,
        }
    }
}

/// How an agent may enter a cell.
///
/// Ordered from least to most passable, so `new < old` means an edit
/// degraded the cell.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Enterability {
    /// Solid wall, blocking object or impassable terrain.
    None = 0,
    /// Enterable after an agent-specific check (doors). Acts as a region connector.
    Conditional = 1,
    /// Open floor.
    Immediate = 2,
}

impl Enterability {
    #[inline]
    pub fn is_passable(self) -> bool {
        self != Enterability::None
    }

    /// Only immediately enterable cells belong to a region.
    #[inline]
    pub fn is_region_member(self) -> bool {
        self == Enterability::Immediate
    }

    #[inline]
    pub fn is_connector(self) -> bool {
        self == Enterability::Conditional
    }
}

/// Region identifier. Stable while the region exists; slots are reused after
/// the region is destroyed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u32);

/// Connected component of the region adjacency graph.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IslandId(pub u32);

/// Identifier handed out for every path request, rejected ones included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// A classification change produced by a tile edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassChange {
    pub cell: Cell,
    pub old: Enterability,
    pub new: Enterability,
}

impl ClassChange {
    /// The cell became harder to enter (lost edges or region membership).
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.new < self.old
    }
}
