//! Grid pathfinding using the A* algorithm.
//!
//! Works on [`Location`]s of a [`BattleGrid`] with a caller-supplied
//! passability test, so the same search serves the live reservation map
//! and the frozen copy used by batched planning. Ties are broken on cell
//! coordinates, which keeps results identical across runs and threads.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::grid::{BattleGrid, Location, NEIGHBORS_8};

/// Upper bound on expanded nodes for one search.
pub const DEFAULT_SEARCH_LIMIT: usize = 4096;

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    loc: Location,
    f_score: u32,
    /// Lower coordinates first when f_scores are equal.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for min-heap behaviour
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn tie_breaker(loc: Location) -> u64 {
    ((loc.y as u32 as u64) << 32) | u64::from(loc.x as u32)
}

/// Diagonal moves may not cut the corner of an impassable cell.
#[inline]
fn is_diagonal_valid<F>(passable: &F, from: Location, dx: i32, dy: i32) -> bool
where
    F: Fn(Location) -> bool,
{
    if dx != 0 && dy != 0 {
        passable(from.offset(dx, 0)) && passable(from.offset(0, dy))
    } else {
        true
    }
}

/// Find a path from `start` to `goal`.
///
/// `passable` decides which in-bounds cells may be entered; the start cell
/// is never tested. Returns the cells to walk through, excluding `start`
/// and ending at `goal`. An empty path means `start == goal`. Returns `None`
/// if the goal is impassable, off the grid, or unreachable within `limit`
/// expanded nodes.
#[must_use]
pub fn find_path<F>(
    grid: &BattleGrid,
    start: Location,
    goal: Location,
    passable: F,
    limit: usize,
) -> Option<Vec<Location>>
where
    F: Fn(Location) -> bool,
{
    if start == goal {
        return Some(Vec::new());
    }
    if !grid.in_bounds(goal) || !passable(goal) {
        return None;
    }

    let in_grid = |loc: Location| grid.in_bounds(loc) && passable(loc);
    let mut open_set = BinaryHeap::new();
    let mut came_from: HashMap<Location, Location> = HashMap::new();
    let mut g_score: HashMap<Location, u32> = HashMap::new();

    g_score.insert(start, 0);
    open_set.push(AStarNode {
        loc: start,
        f_score: start.chebyshev(goal),
        tie_breaker: tie_breaker(start),
    });

    let mut expanded = 0;
    while let Some(current) = open_set.pop() {
        if current.loc == goal {
            return Some(reconstruct_path(&came_from, start, goal));
        }
        expanded += 1;
        if expanded > limit {
            tracing::debug!(%start, %goal, limit, "path search limit reached");
            return None;
        }

        let current_g = g_score.get(&current.loc).copied().unwrap_or(u32::MAX);
        if current.f_score > current_g.saturating_add(current.loc.chebyshev(goal)) {
            // Stale heap entry
            continue;
        }

        for &(dx, dy) in &NEIGHBORS_8 {
            let next = current.loc.offset(dx, dy);
            if !in_grid(next) || !is_diagonal_valid(&in_grid, current.loc, dx, dy) {
                continue;
            }
            let tentative_g = current_g + 1;
            if tentative_g < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                came_from.insert(next, current.loc);
                g_score.insert(next, tentative_g);
                open_set.push(AStarNode {
                    loc: next,
                    f_score: tentative_g + next.chebyshev(goal),
                    tie_breaker: tie_breaker(next),
                });
            }
        }
    }

    None
}

fn reconstruct_path(
    came_from: &HashMap<Location, Location>,
    start: Location,
    goal: Location,
) -> Vec<Location> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        if prev == start {
            break;
        }
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

/// Passable cell closest to `target` (Chebyshev rings, scanned row-major).
///
/// Used to turn "get close to that ship" into a concrete goal cell.
#[must_use]
pub fn nearest_passable<F>(grid: &BattleGrid, target: Location, passable: F) -> Option<Location>
where
    F: Fn(Location) -> bool,
{
    let max_radius = grid.cols().max(grid.rows()) as i32;
    for radius in 0..=max_radius {
        for cell in BattleGrid::footprint(target, radius) {
            if cell.chebyshev(target) == radius as u32 && grid.in_bounds(cell) && passable(cell) {
                return Some(cell);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fixed;
    use std::collections::HashSet;

    fn grid() -> BattleGrid {
        BattleGrid::new(10, 10, Fixed::from_num(10))
    }

    #[test]
    fn test_straight_path() {
        let path = find_path(
            &grid(),
            Location::new(0, 0),
            Location::new(4, 0),
            |_| true,
            DEFAULT_SEARCH_LIMIT,
        )
        .unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.last(), Some(&Location::new(4, 0)));
        assert!(!path.contains(&Location::new(0, 0)));
    }

    #[test]
    fn test_path_around_wall() {
        let wall: HashSet<Location> = (0..9).map(|y| Location::new(5, y)).collect();
        let path = find_path(
            &grid(),
            Location::new(2, 2),
            Location::new(8, 2),
            |l| !wall.contains(&l),
            DEFAULT_SEARCH_LIMIT,
        )
        .unwrap();
        assert!(path.iter().all(|l| !wall.contains(l)));
        assert!(path.contains(&Location::new(5, 9)));
        // Consecutive cells are neighbours
        let mut prev = Location::new(2, 2);
        for cell in &path {
            assert_eq!(prev.chebyshev(*cell), 1);
            prev = *cell;
        }
    }

    #[test]
    fn test_no_path() {
        let wall: HashSet<Location> = (0..10).map(|y| Location::new(5, y)).collect();
        let path = find_path(
            &grid(),
            Location::new(2, 2),
            Location::new(8, 2),
            |l| !wall.contains(&l),
            DEFAULT_SEARCH_LIMIT,
        );
        assert!(path.is_none());
    }

    #[test]
    fn test_same_cell_and_blocked_goal() {
        let g = grid();
        let here = Location::new(3, 3);
        assert_eq!(find_path(&g, here, here, |_| false, 10), Some(Vec::new()));
        assert!(find_path(&g, here, Location::new(4, 4), |_| false, 10).is_none());
        assert!(find_path(&g, here, Location::new(40, 4), |_| true, 10).is_none());
    }

    #[test]
    fn test_search_limit() {
        let path = find_path(
            &grid(),
            Location::new(0, 0),
            Location::new(9, 9),
            |_| true,
            2,
        );
        assert!(path.is_none());
    }

    #[test]
    fn test_deterministic() {
        let g = grid();
        let a = find_path(&g, Location::new(0, 5), Location::new(9, 1), |_| true, 1000);
        let b = find_path(&g, Location::new(0, 5), Location::new(9, 1), |_| true, 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_nearest_passable() {
        let g = grid();
        let taken = Location::new(5, 5);
        assert_eq!(nearest_passable(&g, taken, |_| true), Some(taken));
        let found = nearest_passable(&g, taken, |l| l != taken).unwrap();
        assert_eq!(found.chebyshev(taken), 1);
        assert_eq!(found, Location::new(4, 4));
    }
}
