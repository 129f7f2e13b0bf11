//! Battle-start placement of fleets and defenses on the grid.
//!
//! Each side is laid out from its own edge: the attacker from the left,
//! the defender from the right with templates mirrored. Large units are
//! placed first (exclusive ones, then cruisers), fighters last.
//!
//! Footprint rules:
//!
//! | category | footprint | may overlap |
//! |----------|-----------|-------------|
//! | fighter | 1 cell | nothing |
//! | cruiser | 3x3 | edge cells of other cruisers |
//! | battleship, station, projector, shield | 3x3 | nothing |
//!
//! When a wanted cell does not fit, a spiral search walks rings of growing
//! radius around it (north edge, east edge, south edge, west edge) and takes
//! the first cell that fits. Units that fit nowhere are reported as unplaced.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grid::{BattleGrid, Location};
use crate::structure::{Category, Side};

/// A named formation.
///
/// Slots are `(column, row)` pairs counted from the side's own edge; rows
/// are centered vertically on the grid.
///
/// # Example RON
///
/// ```ron
/// LayoutTemplate(
///     name: "wedge",
///     large_slots: [(4, 2), (2, 0), (2, 4)],
///     fighter_slots: [(7, 1), (7, 3), (8, 2)],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutTemplate {
    /// Name referenced by battle setups.
    pub name: String,
    /// Centers for battleships, stations and cruisers, in priority order.
    #[serde(default)]
    pub large_slots: Vec<(i32, i32)>,
    /// Cells for fighter squadrons.
    #[serde(default)]
    pub fighter_slots: Vec<(i32, i32)>,
}

impl LayoutTemplate {
    /// Rows spanned by the template's slots.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.large_slots
            .iter()
            .map(|&(_, y)| y + 1)
            .chain(self.fighter_slots.iter().map(|&(_, y)| y))
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Grid cell of a template slot for `side`.
    #[must_use]
    pub fn slot_cell(&self, grid: &BattleGrid, side: Side, slot: (i32, i32)) -> Location {
        let top = (grid.rows() as i32 - self.height()) / 2;
        let x = match side {
            Side::Attacker => slot.0,
            Side::Defender => grid.cols() as i32 - 1 - slot.0,
        };
        Location::new(x, top.max(0) + slot.1)
    }
}

/// Kind of claim on a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Claim {
    /// A fighter squadron.
    Fighter,
    /// Center of a cruiser.
    CruiserCenter,
    /// Outer ring of one or more cruisers.
    CruiserEdge,
    /// Any cell of a battleship, station or planet defense.
    Exclusive,
}

/// Cell claims of all placed units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Occupancy {
    cells: BTreeMap<Location, (Side, Claim)>,
}

impl Occupancy {
    /// Create an empty occupancy map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim on a cell.
    #[must_use]
    pub fn claim(&self, cell: Location) -> Option<Claim> {
        self.cells.get(&cell).map(|(_, c)| *c)
    }

    /// Whether a unit of `category` centered on `center` fits.
    #[must_use]
    pub fn fits(&self, grid: &BattleGrid, category: Category, center: Location) -> bool {
        let radius = category.footprint_radius();
        let footprint = BattleGrid::footprint(center, radius);
        if !footprint.iter().all(|c| grid.in_bounds(*c)) {
            return false;
        }
        match category {
            Category::Cruiser => footprint.iter().all(|c| {
                if *c == center {
                    self.claim(*c).is_none()
                } else {
                    matches!(self.claim(*c), None | Some(Claim::CruiserEdge))
                }
            }),
            _ => footprint.iter().all(|c| self.claim(*c).is_none()),
        }
    }

    /// Claim the footprint of a unit. Callers check [`Self::fits`] first.
    pub fn occupy(&mut self, side: Side, category: Category, center: Location) {
        let radius = category.footprint_radius();
        for cell in BattleGrid::footprint(center, radius) {
            let claim = match category {
                Category::Fighter | Category::Missile => Claim::Fighter,
                Category::Cruiser if cell == center => Claim::CruiserCenter,
                Category::Cruiser => Claim::CruiserEdge,
                _ => Claim::Exclusive,
            };
            self.cells.insert(cell, (side, claim));
        }
    }

    /// Drop every claim made by a side.
    pub fn clear_side(&mut self, side: Side) {
        self.cells.retain(|_, (s, _)| *s != side);
    }

    /// Number of claimed cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether nothing is claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// ASCII picture of the grid, one line per row.
    ///
    /// `.` free, `f` fighter, `C` cruiser center, `c` cruiser edge,
    /// `#` exclusive.
    #[must_use]
    pub fn render(&self, grid: &BattleGrid) -> String {
        let mut out = String::with_capacity(((grid.cols() + 1) * grid.rows()) as usize);
        for y in 0..grid.rows() as i32 {
            for x in 0..grid.cols() as i32 {
                out.push(match self.claim(Location::new(x, y)) {
                    None => '.',
                    Some(Claim::Fighter) => 'f',
                    Some(Claim::CruiserCenter) => 'C',
                    Some(Claim::CruiserEdge) => 'c',
                    Some(Claim::Exclusive) => '#',
                });
            }
            out.push('\n');
        }
        out
    }
}

/// One group handed to the layout engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutUnit {
    /// Technology id, for diagnostics.
    pub tech_id: String,
    /// Footprint category.
    pub category: Category,
    /// Units in the group.
    pub count: u32,
}

/// A group placed on the grid. Fighter groups may be split across several
/// placements sharing the same `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Index into the input slice.
    pub source: usize,
    /// Center cell.
    pub cell: Location,
    /// Units in this placement.
    pub count: u32,
}

/// A group (or split part of one) that could not be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unplaced {
    /// Index into the input slice.
    pub source: usize,
    /// Units left off the grid.
    pub count: u32,
}

/// Result of laying out one side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutReport {
    /// Placed groups in placement order.
    pub placed: Vec<Placement>,
    /// Groups that did not fit anywhere.
    pub unplaced: Vec<Unplaced>,
}

/// Split groups by repeatedly halving the largest one until there are
/// `slots` groups or nothing can be split further.
///
/// Returns `(source index, count)` pairs. The largest group is found in the
/// current order, ties going to the earliest; the larger half stays in
/// place and the smaller half is inserted right after it.
#[must_use]
pub fn split_groups(counts: &[u32], slots: usize) -> Vec<(usize, u32)> {
    let mut groups: Vec<(usize, u32)> = counts
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, c)| *c > 0)
        .collect();
    while groups.len() < slots {
        let mut largest: Option<usize> = None;
        for (i, (_, count)) in groups.iter().enumerate() {
            if *count >= 2 && largest.map_or(true, |l| *count > groups[l].1) {
                largest = Some(i);
            }
        }
        let Some(i) = largest else {
            break;
        };
        let (source, count) = groups[i];
        let half = count / 2;
        groups[i] = (source, count - half);
        groups.insert(i + 1, (source, half));
    }
    groups
}

/// Cells around `center` in spiral order: the center, then each ring of
/// growing radius walked north edge, east edge, south edge, west edge.
pub fn spiral(center: Location, max_radius: i32) -> impl Iterator<Item = Location> {
    std::iter::once(center).chain((1..=max_radius).flat_map(move |r| {
        let (cx, cy) = (center.x, center.y);
        let north = (cx - r..=cx + r).map(move |x| Location::new(x, cy - r));
        let east = (cy - r + 1..=cy + r).map(move |y| Location::new(cx + r, y));
        let south = (cx - r..cx + r).rev().map(move |x| Location::new(x, cy + r));
        let west = (cy - r + 1..cy + r).rev().map(move |y| Location::new(cx - r, y));
        north.chain(east).chain(south).chain(west)
    }))
}

/// Placement priority: exclusive large units, then cruisers, then fighters.
const fn placement_rank(category: Category) -> u8 {
    match category {
        Category::Battleship => 0,
        Category::Station | Category::Projector | Category::Shield => 1,
        Category::Cruiser => 2,
        Category::Fighter => 3,
        Category::Missile => 4,
    }
}

/// Default anchor of a side: middle row, a few columns in from its edge.
#[must_use]
pub fn side_anchor(grid: &BattleGrid, side: Side) -> Location {
    let y = grid.rows() as i32 / 2;
    let x = match side {
        Side::Attacker => 1.min(grid.cols() as i32 - 1),
        Side::Defender => (grid.cols() as i32 - 2).max(0),
    };
    Location::new(x, y)
}

/// Lays out one side at a time onto a shared occupancy map.
#[derive(Debug)]
pub struct LayoutEngine<'a> {
    grid: &'a BattleGrid,
    occupancy: &'a mut Occupancy,
}

impl<'a> LayoutEngine<'a> {
    /// Create an engine writing into `occupancy`.
    pub fn new(grid: &'a BattleGrid, occupancy: &'a mut Occupancy) -> Self {
        Self { grid, occupancy }
    }

    fn max_radius(&self) -> i32 {
        self.grid.cols().max(self.grid.rows()) as i32
    }

    /// First cell at or around `wanted` where `category` fits.
    fn find_spot(&self, category: Category, wanted: Location) -> Option<Location> {
        spiral(wanted, self.max_radius()).find(|c| self.occupancy.fits(self.grid, category, *c))
    }

    fn place(
        &mut self,
        side: Side,
        category: Category,
        wanted: Location,
        source: usize,
        count: u32,
        report: &mut LayoutReport,
    ) {
        match self.find_spot(category, wanted) {
            Some(cell) => {
                self.occupancy.occupy(side, category, cell);
                report.placed.push(Placement {
                    source,
                    cell,
                    count,
                });
            }
            None => report.unplaced.push(Unplaced { source, count }),
        }
    }

    /// Place every group of `units` for `side`.
    pub fn layout_side(
        &mut self,
        side: Side,
        units: &[LayoutUnit],
        template: Option<&LayoutTemplate>,
    ) -> LayoutReport {
        let mut report = LayoutReport::default();
        let anchor = side_anchor(self.grid, side);

        let mut order: Vec<usize> = (0..units.len())
            .filter(|&i| units[i].count > 0 && units[i].category != Category::Missile)
            .collect();
        order.sort_by_key(|&i| placement_rank(units[i].category));

        let mut large_slots = template
            .map(|t| {
                t.large_slots
                    .iter()
                    .map(|s| t.slot_cell(self.grid, side, *s))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
            .into_iter();

        let (large, fighters): (Vec<usize>, Vec<usize>) = order
            .into_iter()
            .partition(|&i| units[i].category != Category::Fighter);

        for i in large {
            let wanted = large_slots.next().unwrap_or(anchor);
            self.place(side, units[i].category, wanted, i, units[i].count, &mut report);
        }

        let fighter_slots: Vec<Location> = template
            .map(|t| {
                t.fighter_slots
                    .iter()
                    .map(|s| t.slot_cell(self.grid, side, *s))
                    .collect()
            })
            .unwrap_or_default();
        let counts: Vec<u32> = fighters.iter().map(|&i| units[i].count).collect();
        let groups = if fighter_slots.is_empty() {
            counts.iter().copied().enumerate().collect()
        } else {
            split_groups(&counts, fighter_slots.len())
        };
        for (n, (local, count)) in groups.into_iter().enumerate() {
            let wanted = fighter_slots.get(n).copied().unwrap_or(anchor);
            self.place(side, Category::Fighter, wanted, fighters[local], count, &mut report);
        }

        if !report.unplaced.is_empty() {
            tracing::warn!(?side, unplaced = report.unplaced.len(), "layout left units off the grid");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fixed;

    fn grid(cols: u32, rows: u32) -> BattleGrid {
        BattleGrid::new(cols, rows, Fixed::from_num(10))
    }

    fn unit(category: Category, count: u32) -> LayoutUnit {
        LayoutUnit {
            tech_id: format!("{category:?}"),
            category,
            count,
        }
    }

    #[test]
    fn test_split_halves_largest_first() {
        assert_eq!(split_groups(&[8], 3), vec![(0, 2), (0, 2), (0, 4)]);
        assert_eq!(split_groups(&[3, 5], 3), vec![(0, 3), (1, 3), (1, 2)]);
        // Ties go to the earliest group
        assert_eq!(split_groups(&[4, 4], 3), vec![(0, 2), (0, 2), (1, 4)]);
        // Cannot split below one unit per group
        assert_eq!(split_groups(&[2], 5), vec![(0, 1), (0, 1)]);
    }

    #[test]
    fn test_spiral_ring_order() {
        let cells: Vec<_> = spiral(Location::new(5, 5), 1).collect();
        assert_eq!(cells.len(), 9);
        assert_eq!(cells[0], Location::new(5, 5));
        // North edge west to east
        assert_eq!(&cells[1..4], &[Location::new(4, 4), Location::new(5, 4), Location::new(6, 4)]);
        // East edge
        assert_eq!(&cells[4..6], &[Location::new(6, 5), Location::new(6, 6)]);
        // South edge east to west
        assert_eq!(&cells[6..8], &[Location::new(5, 6), Location::new(4, 6)]);
        // West edge
        assert_eq!(cells[8], Location::new(4, 5));
    }

    #[test]
    fn test_cruisers_share_edges_only() {
        let g = grid(10, 10);
        let mut occ = Occupancy::new();
        occ.occupy(Side::Attacker, Category::Cruiser, Location::new(2, 2));
        // Edge on edge: allowed
        assert!(occ.fits(&g, Category::Cruiser, Location::new(4, 2)));
        // Center on edge: refused
        assert!(!occ.fits(&g, Category::Cruiser, Location::new(3, 2)));
        // Battleships and fighters never overlap a cruiser
        assert!(!occ.fits(&g, Category::Battleship, Location::new(4, 2)));
        assert!(!occ.fits(&g, Category::Fighter, Location::new(3, 3)));
        assert!(occ.fits(&g, Category::Fighter, Location::new(4, 4)));
        // Footprints must stay on the grid
        assert!(!occ.fits(&g, Category::Cruiser, Location::new(0, 5)));
    }

    #[test]
    fn test_large_units_before_fighters() {
        let g = grid(20, 10);
        let mut occ = Occupancy::new();
        let mut engine = LayoutEngine::new(&g, &mut occ);
        let units = vec![
            unit(Category::Fighter, 6),
            unit(Category::Cruiser, 1),
            unit(Category::Battleship, 1),
        ];
        let report = engine.layout_side(Side::Attacker, &units, None);
        assert!(report.unplaced.is_empty());
        let sources: Vec<usize> = report.placed.iter().map(|p| p.source).collect();
        assert_eq!(sources, vec![2, 1, 0]);
        // Battleship got the anchor
        assert_eq!(report.placed[0].cell, side_anchor(&g, Side::Attacker));
    }

    #[test]
    fn test_template_is_mirrored_for_defender() {
        let g = grid(20, 10);
        let template = LayoutTemplate {
            name: "line".into(),
            large_slots: vec![(2, 1)],
            fighter_slots: vec![(5, 0), (5, 2)],
        };
        assert_eq!(template.height(), 3);
        let att = template.slot_cell(&g, Side::Attacker, (2, 1));
        let def = template.slot_cell(&g, Side::Defender, (2, 1));
        assert_eq!(att, Location::new(2, 4));
        assert_eq!(def, Location::new(17, 4));

        let mut occ = Occupancy::new();
        let mut engine = LayoutEngine::new(&g, &mut occ);
        let units = vec![unit(Category::Fighter, 9), unit(Category::Battleship, 1)];
        let report = engine.layout_side(Side::Defender, &units, Some(&template));
        assert_eq!(report.placed[0].cell, Location::new(17, 4));
        let fighter_total: u32 = report.placed[1..].iter().map(|p| p.count).sum();
        assert_eq!(fighter_total, 9);
        assert_eq!(report.placed[1].cell, Location::new(14, 3));
        assert_eq!(report.placed[2].cell, Location::new(14, 5));
    }

    #[test]
    fn test_occupied_slot_falls_back_to_spiral() {
        let g = grid(20, 10);
        let mut occ = Occupancy::new();
        let mut engine = LayoutEngine::new(&g, &mut occ);
        let units = vec![unit(Category::Battleship, 1), unit(Category::Battleship, 1)];
        let report = engine.layout_side(Side::Attacker, &units, None);
        assert_eq!(report.placed.len(), 2);
        let (a, b) = (report.placed[0].cell, report.placed[1].cell);
        assert!(a.chebyshev(b) >= 3);
    }

    #[test]
    fn test_full_grid_reports_unplaced() {
        let g = grid(3, 3);
        let mut occ = Occupancy::new();
        let mut engine = LayoutEngine::new(&g, &mut occ);
        let units = vec![unit(Category::Battleship, 1), unit(Category::Fighter, 2)];
        let report = engine.layout_side(Side::Attacker, &units, None);
        assert_eq!(report.placed.len(), 1);
        assert_eq!(report.unplaced, vec![Unplaced { source: 1, count: 2 }]);
    }

    #[test]
    fn test_clear_side_keeps_other_side() {
        let g = grid(20, 10);
        let mut occ = Occupancy::new();
        occ.occupy(Side::Attacker, Category::Fighter, Location::new(1, 1));
        occ.occupy(Side::Defender, Category::Battleship, Location::new(15, 5));
        occ.clear_side(Side::Attacker);
        assert_eq!(occ.len(), 9);
        assert!(occ.render(&g).contains('#'));
        assert!(!occ.render(&g).contains('f'));
    }
}
