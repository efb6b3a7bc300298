//! Shared grid data structures used by the navigation modules.
//!
//! The walkability grid is the single source of truth for passability; the
//! flood fill is the region-growing primitive used by the region index and by
//! zone tooling.

mod flood_fill;
mod walkability;

pub use flood_fill::{FloodFill, FloodOutcome, NeighborBuf, Neighborhood};
pub use walkability::{classify_tile, Terrain, TileObject, WalkabilityGrid};
