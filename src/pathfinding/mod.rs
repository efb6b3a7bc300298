pub(crate) mod types;
mod error;
mod graph;
mod movement;
mod path;
mod navigator;

// Region index modules
mod region_index;
mod region_connectivity;

// Search modules
mod astar;
mod smoothing;
mod service;

#[cfg(test)]
mod tests;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use types::{Cell, ClassChange, Direction, Enterability, IslandId, RegionId, RequestId};
pub use error::{GridError, PathError};
pub use graph::{NavigationGraph, Neighbors};
pub use movement::{MovementModifier, Walker};
pub use path::{Path, PathStatus};
pub use region_index::{ConnectorLinks, Region, RegionDelta, RegionIndex};
pub use astar::{find_path, route_cost, SearchParams, SearchSnapshot};
pub use smoothing::{collapse_collinear, smooth, supercover, SmoothedRoute};
pub use service::{PathCallback, PathSearchService, RequestStatus, ServiceStats};
pub use navigator::{EditReport, Navigator};
