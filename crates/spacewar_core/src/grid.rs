//! Battle grid geometry.
//!
//! Converts between continuous battle-space coordinates and the fixed-size
//! cell grid the layout engine and the grid movement strategy work on.
//! Everything here is a pure function of the grid dimensions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Integer grid cell (column, row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Location {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Location {
    /// Create a new location.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Offset this location by `(dx, dy)`.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev distance between two cells.
    #[must_use]
    pub fn chebyshev(self, other: Self) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Direction offsets for 8-directional neighbours.
pub const NEIGHBORS_8: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Fixed-size cell grid covering the battle rectangle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleGrid {
    cols: u32,
    rows: u32,
    #[serde(with = "fixed_serde")]
    cell_size: Fixed,
    /// Battle-space position of the top-left corner of cell (0, 0).
    origin: Vec2Fixed,
}

impl BattleGrid {
    /// Create a grid with its top-left corner at the battle-space origin.
    ///
    /// # Panics
    ///
    /// Panics if `cols` or `rows` is zero, or if `cell_size` is not positive.
    #[must_use]
    pub fn new(cols: u32, rows: u32, cell_size: Fixed) -> Self {
        Self::with_origin(cols, rows, cell_size, Vec2Fixed::ZERO)
    }

    /// Create a grid whose cell (0, 0) starts at `origin`.
    ///
    /// # Panics
    ///
    /// Panics if `cols` or `rows` is zero, or if `cell_size` is not positive.
    #[must_use]
    pub fn with_origin(cols: u32, rows: u32, cell_size: Fixed, origin: Vec2Fixed) -> Self {
        assert!(cols > 0, "BattleGrid cols must be positive");
        assert!(rows > 0, "BattleGrid rows must be positive");
        assert!(
            cell_size > Fixed::ZERO,
            "BattleGrid cell_size must be positive"
        );
        Self {
            cols,
            rows,
            cell_size,
            origin,
        }
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn cols(&self) -> u32 {
        self.cols
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Cell size in battle-space units.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    /// Top-left corner of the battle rectangle.
    #[must_use]
    pub const fn origin(&self) -> Vec2Fixed {
        self.origin
    }

    /// Width of the battle rectangle in battle-space units.
    #[must_use]
    pub fn width(&self) -> Fixed {
        Fixed::from_num(self.cols) * self.cell_size
    }

    /// Height of the battle rectangle in battle-space units.
    #[must_use]
    pub fn height(&self) -> Fixed {
        Fixed::from_num(self.rows) * self.cell_size
    }

    /// Check if a cell lies on the grid.
    #[must_use]
    pub fn in_bounds(&self, loc: Location) -> bool {
        loc.x >= 0 && loc.y >= 0 && (loc.x as u32) < self.cols && (loc.y as u32) < self.rows
    }

    /// Check if a battle-space point lies inside the battle rectangle.
    #[must_use]
    pub fn contains_point(&self, pos: Vec2Fixed) -> bool {
        let rel = pos - self.origin;
        rel.x >= Fixed::ZERO && rel.y >= Fixed::ZERO && rel.x < self.width() && rel.y < self.height()
    }

    /// Check if a point is farther than `margin` outside the battle rectangle.
    #[must_use]
    pub fn is_beyond(&self, pos: Vec2Fixed, margin: Fixed) -> bool {
        let rel = pos - self.origin;
        rel.x < -margin
            || rel.y < -margin
            || rel.x > self.width() + margin
            || rel.y > self.height() + margin
    }

    /// Battle-space center of a cell.
    #[must_use]
    pub fn cell_center(&self, loc: Location) -> Vec2Fixed {
        let half = self.cell_size / Fixed::from_num(2);
        Vec2Fixed::new(
            self.origin.x + Fixed::from_num(loc.x) * self.cell_size + half,
            self.origin.y + Fixed::from_num(loc.y) * self.cell_size + half,
        )
    }

    /// Grid-fractional coordinates of a battle-space point.
    ///
    /// Cell centers map to `x + 0.5`; values outside the grid are not clamped.
    #[must_use]
    pub fn grid_position(&self, pos: Vec2Fixed) -> (Fixed, Fixed) {
        let rel = pos - self.origin;
        (rel.x / self.cell_size, rel.y / self.cell_size)
    }

    /// Convert a battle-space point to the cell containing it.
    ///
    /// Returns `None` if the point is outside the grid.
    #[must_use]
    pub fn world_to_cell(&self, pos: Vec2Fixed) -> Option<Location> {
        let (gx, gy) = self.grid_position(pos);
        if gx < Fixed::ZERO || gy < Fixed::ZERO {
            return None;
        }
        let loc = Location::new(gx.to_num::<i32>(), gy.to_num::<i32>());
        self.in_bounds(loc).then_some(loc)
    }

    /// Cell containing a point, clamped onto the grid.
    #[must_use]
    pub fn nearest_cell(&self, pos: Vec2Fixed) -> Location {
        let (gx, gy) = self.grid_position(pos);
        let x = gx.floor().to_num::<i64>().clamp(0, i64::from(self.cols) - 1);
        let y = gy.floor().to_num::<i64>().clamp(0, i64::from(self.rows) - 1);
        Location::new(x as i32, y as i32)
    }

    /// All cells of the square of the given `radius` around `center`,
    /// in row-major order. Cells may be out of bounds.
    #[must_use]
    pub fn footprint(center: Location, radius: i32) -> Vec<Location> {
        let mut cells = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                cells.push(center.offset(dx, dy));
            }
        }
        cells
    }

    /// In-bounds 8-neighbours of a cell.
    pub fn neighbors(&self, loc: Location) -> impl Iterator<Item = Location> + '_ {
        NEIGHBORS_8
            .iter()
            .map(move |&(dx, dy)| loc.offset(dx, dy))
            .filter(move |n| self.in_bounds(*n))
    }
}

impl Default for BattleGrid {
    /// 40x24 cells of 24 units.
    fn default() -> Self {
        Self::new(40, 24, Fixed::from_num(24))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_cell_center_and_back() {
        let grid = BattleGrid::new(10, 8, fixed(20));
        let center = grid.cell_center(Location::new(2, 3));
        assert_eq!(center, Vec2Fixed::from_ints(50, 70));
        assert_eq!(grid.world_to_cell(center), Some(Location::new(2, 3)));
    }

    #[test]
    fn test_origin_offset() {
        let grid = BattleGrid::with_origin(4, 4, fixed(10), Vec2Fixed::from_ints(100, 50));
        assert_eq!(grid.cell_center(Location::new(0, 0)), Vec2Fixed::from_ints(105, 55));
        assert_eq!(grid.world_to_cell(Vec2Fixed::from_ints(99, 60)), None);
        assert_eq!(
            grid.world_to_cell(Vec2Fixed::from_ints(139, 89)),
            Some(Location::new(3, 3))
        );
    }

    #[test]
    fn test_grid_position_is_fractional() {
        let grid = BattleGrid::new(10, 10, fixed(4));
        let (gx, gy) = grid.grid_position(Vec2Fixed::from_ints(6, 2));
        assert_eq!(gx, Fixed::from_num(1.5));
        assert_eq!(gy, Fixed::from_num(0.5));
    }

    #[test]
    fn test_out_of_bounds() {
        let grid = BattleGrid::new(10, 10, fixed(2));
        assert_eq!(grid.world_to_cell(Vec2Fixed::from_ints(20, 20)), None);
        assert_eq!(grid.world_to_cell(Vec2Fixed::from_ints(-1, 0)), None);
        assert!(!grid.in_bounds(Location::new(10, 0)));
        assert!(!grid.in_bounds(Location::new(0, -1)));
    }

    #[test]
    fn test_nearest_cell_clamps() {
        let grid = BattleGrid::new(10, 10, fixed(2));
        assert_eq!(
            grid.nearest_cell(Vec2Fixed::from_ints(-30, 500)),
            Location::new(0, 9)
        );
    }

    #[test]
    fn test_is_beyond_margin() {
        let grid = BattleGrid::new(10, 10, fixed(10));
        assert!(!grid.is_beyond(Vec2Fixed::from_ints(-5, 50), fixed(10)));
        assert!(grid.is_beyond(Vec2Fixed::from_ints(-11, 50), fixed(10)));
        assert!(grid.is_beyond(Vec2Fixed::from_ints(50, 111), fixed(10)));
    }

    #[test]
    fn test_footprint_is_row_major() {
        let cells = BattleGrid::footprint(Location::new(5, 5), 1);
        assert_eq!(cells.len(), 9);
        assert_eq!(cells[0], Location::new(4, 4));
        assert_eq!(cells[4], Location::new(5, 5));
        assert_eq!(cells[8], Location::new(6, 6));
    }

    #[test]
    fn test_neighbors_skip_edges() {
        let grid = BattleGrid::new(3, 3, fixed(1));
        assert_eq!(grid.neighbors(Location::new(0, 0)).count(), 3);
        assert_eq!(grid.neighbors(Location::new(1, 1)).count(), 8);
    }
}
