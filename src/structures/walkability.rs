use crate::pathfinding::types::{Cell, ClassChange, Enterability};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Base terrain of a tile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    #[default]
    Ground,
    /// Rock, deep water, chasm: nothing built on it makes it walkable.
    Impassable,
}

/// Object occupying a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileObject {
    /// Walls and other solid buildings.
    Wall,
    /// Enterable after an agent-specific check; joins the regions on its open sides.
    Door,
    /// Furniture or floor covering agents can walk over.
    Walkable,
}

/// Per-cell enterability derived from terrain and occupying object.
///
/// The class array is a pure projection: it is only written by
/// [`WalkabilityGrid::on_occupancy_changed`], which recomputes a cell from its
/// current facts. No search or iteration logic lives here.
///
/// The class array is `Arc`-shared so search workers can hold a snapshot
/// while the simulation thread keeps editing; the first write after a snapshot
/// was taken copies the array (`Arc::make_mut`).
///
/// # Example
///
/// ```rust
/// use colony_nav::structures::{WalkabilityGrid, TileObject};
/// use colony_nav::pathfinding::{Cell, Enterability};
///
/// let mut grid = WalkabilityGrid::new(4, 4);
/// grid.place_object(Cell::new(1, 1), TileObject::Wall);
/// assert!(grid.on_occupancy_changed(Cell::new(1, 1)));
/// assert_eq!(grid.classify(Cell::new(1, 1)), Enterability::None);
/// ```
#[derive(Clone, Debug)]
pub struct WalkabilityGrid {
    width: i32,
    height: i32,
    terrain: Vec<Terrain>,
    objects: Vec<Option<TileObject>>,
    classes: Arc<Vec<Enterability>>,
}

/// Classification rule: terrain first, then the occupying object.
pub fn classify_tile(terrain: Terrain, object: Option<TileObject>) -> Enterability {
    match (terrain, object) {
        (Terrain::Impassable, _) => Enterability::None,
        (Terrain::Ground, Some(TileObject::Wall)) => Enterability::None,
        (Terrain::Ground, Some(TileObject::Door)) => Enterability::Conditional,
        (Terrain::Ground, Some(TileObject::Walkable)) | (Terrain::Ground, None) => Enterability::Immediate,
    }
}

impl WalkabilityGrid {
    /// Open ground everywhere.
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        let size = (width * height) as usize;
        Self {
            width,
            height,
            terrain: vec![Terrain::Ground; size],
            objects: vec![None; size],
            classes: Arc::new(vec![Enterability::Immediate; size]),
        }
    }

    /// Build a grid from ASCII rows. Row 0 is the top of the map (highest y).
    ///
    /// `.` ground, `#` wall, `D` door, `~` walkable object, `X` impassable terrain.
    /// Any other character is treated as ground. Short rows are padded with ground.
    pub fn from_rows(rows: &[&str]) -> Self {
        let height = rows.len() as i32;
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0) as i32;
        let mut grid = Self::new(width, height);

        for (row_idx, row) in rows.iter().enumerate() {
            let y = height - 1 - row_idx as i32;
            for (x, ch) in row.chars().enumerate() {
                let cell = Cell::new(x as i32, y);
                match ch {
                    '#' => grid.place_object(cell, TileObject::Wall),
                    'D' => grid.place_object(cell, TileObject::Door),
                    '~' => grid.place_object(cell, TileObject::Walkable),
                    'X' => grid.set_terrain(cell, Terrain::Impassable),
                    _ => {}
                }
                grid.on_occupancy_changed(cell);
            }
        }

        grid
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    #[inline]
    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    #[inline]
    pub fn index_of(&self, cell: Cell) -> Option<usize> {
        self.in_bounds(cell).then(|| (cell.y * self.width + cell.x) as usize)
    }

    #[inline]
    pub fn cell_at(&self, index: usize) -> Cell {
        let w = self.width.max(1) as usize;
        Cell::new((index % w) as i32, (index / w) as i32)
    }

    /// Enterability of a cell. Out-of-bounds cells are `None`.
    #[inline]
    pub fn classify(&self, cell: Cell) -> Enterability {
        match self.index_of(cell) {
            Some(idx) => self.classes[idx],
            None => Enterability::None,
        }
    }

    pub fn terrain(&self, cell: Cell) -> Option<Terrain> {
        self.index_of(cell).map(|idx| self.terrain[idx])
    }

    pub fn object(&self, cell: Cell) -> Option<TileObject> {
        self.index_of(cell).and_then(|idx| self.objects[idx])
    }

    /// Record new terrain. Call [`Self::on_occupancy_changed`] afterwards.
    pub fn set_terrain(&mut self, cell: Cell, terrain: Terrain) {
        if let Some(idx) = self.index_of(cell) {
            self.terrain[idx] = terrain;
        }
    }

    /// Record a placed object, replacing any previous one.
    /// Call [`Self::on_occupancy_changed`] afterwards.
    pub fn place_object(&mut self, cell: Cell, object: TileObject) {
        if let Some(idx) = self.index_of(cell) {
            self.objects[idx] = Some(object);
        }
    }

    /// Record a removed object. Call [`Self::on_occupancy_changed`] afterwards.
    pub fn remove_object(&mut self, cell: Cell) -> Option<TileObject> {
        self.index_of(cell).and_then(|idx| self.objects[idx].take())
    }

    /// Recompute a cell's class from its current facts.
    /// Returns whether the classification changed.
    pub fn on_occupancy_changed(&mut self, cell: Cell) -> bool {
        self.reclassify(cell).is_some()
    }

    /// Like [`Self::on_occupancy_changed`] but reports the old and new class.
    pub fn reclassify(&mut self, cell: Cell) -> Option<ClassChange> {
        let idx = self.index_of(cell)?;
        let new = classify_tile(self.terrain[idx], self.objects[idx]);
        let old = self.classes[idx];
        if old == new {
            return None;
        }
        Arc::make_mut(&mut self.classes)[idx] = new;
        Some(ClassChange { cell, old, new })
    }

    /// Shared handle to the current class array.
    pub fn snapshot(&self) -> Arc<Vec<Enterability>> {
        Arc::clone(&self.classes)
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Cell::new(x, y)))
    }

    pub fn count(&self, class: Enterability) -> usize {
        self.classes.iter().filter(|&&c| c == class).count()
    }
}
