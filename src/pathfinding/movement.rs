use super::types::Cell;
use crate::fixed_math::FixedNum;

/// Per-agent movement profile applied at search time.
///
/// The navigation graph stores base costs only; a modifier scales the cost of
/// entering each cell and decides whether the agent may pass conditional
/// cells. Implementations must be cheap and `Send + Sync`: they run on the
/// search workers.
///
/// # Heuristic admissibility
///
/// The search scales its heuristic by [`MovementModifier::min_cell_cost`].
/// Returning a value larger than the true minimum of `cell_cost` makes the
/// search inadmissible (routes may no longer be optimal).
pub trait MovementModifier: Send + Sync {
    /// Multiplier on the base step cost for entering `cell`.
    fn cell_cost(&self, _cell: Cell) -> FixedNum {
        FixedNum::ONE
    }

    /// Whether the agent may enter a conditional cell (door).
    fn can_enter_conditional(&self, _cell: Cell) -> bool {
        true
    }

    /// Lower bound of [`MovementModifier::cell_cost`] over the whole map.
    fn min_cell_cost(&self) -> FixedNum {
        FixedNum::ONE
    }
}

/// The common case: a uniform speed factor and a door permission.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Walker {
    /// Relative speed. Step costs are divided by it.
    pub speed: FixedNum,
    pub opens_doors: bool,
}

impl Default for Walker {
    fn default() -> Self {
        Self {
            speed: FixedNum::ONE,
            opens_doors: true,
        }
    }
}

impl Walker {
    /// Animals and locked-out agents.
    pub fn without_doors() -> Self {
        Self {
            opens_doors: false,
            ..Self::default()
        }
    }

    fn factor(&self) -> FixedNum {
        let min_speed = FixedNum::from_num(0.01);
        FixedNum::ONE / self.speed.max(min_speed)
    }
}

impl MovementModifier for Walker {
    fn cell_cost(&self, _cell: Cell) -> FixedNum {
        self.factor()
    }

    fn can_enter_conditional(&self, _cell: Cell) -> bool {
        self.opens_doors
    }

    fn min_cell_cost(&self) -> FixedNum {
        self.factor()
    }
}

/// Any `Fn(Cell) -> FixedNum` is a modifier that may open doors.
///
/// Closures cannot report their minimum, so the heuristic assumes nothing
/// costs less than the base cost.
impl<F> MovementModifier for F
where
    F: Fn(Cell) -> FixedNum + Send + Sync,
{
    fn cell_cost(&self, cell: Cell) -> FixedNum {
        self(cell)
    }
}
