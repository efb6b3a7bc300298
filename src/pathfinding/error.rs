use super::types::Cell;
use std::fmt;

/// Why a path request produced no usable path.
///
/// Every variant is recoverable: the usual policy is to re-request with the
/// same or an updated goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathError {
    /// The search exhausted its open set or node budget without reaching the
    /// goal. Happens when regions are connected only through cells this agent
    /// may not enter.
    NoPath,
    /// Rejected before searching: the region index reports no connection.
    Unreachable,
    /// The path crosses a cell that was blocked after it was computed.
    InvalidatedMidFlight,
    /// Start or goal is outside the grid or not enterable at all.
    MalformedRequest,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPath => write!(f, "no path found"),
            Self::Unreachable => write!(f, "goal is unreachable from start"),
            Self::InvalidatedMidFlight => write!(f, "path crosses a cell blocked after it was computed"),
            Self::MalformedRequest => write!(f, "start or goal is out of bounds or blocked"),
        }
    }
}

impl std::error::Error for PathError {}

/// Rejected tile edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridError {
    OutOfBounds(Cell),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds(cell) => write!(f, "cell {cell} is outside the grid"),
        }
    }
}

impl std::error::Error for GridError {}
