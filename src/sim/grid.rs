use std::collections::HashMap;

use super::vector::Vec2;

/// Integer cell coordinate `(floor(x / cell_size), floor(y / cell_size))`.
pub type Cell = (i32, i32);

/// Per-episode visit counter over a discretised arena.
///
/// Counts only grow within an episode; [`ExplorationGrid::reset`] clears them
/// at episode start.
#[derive(Debug, Clone)]
pub struct ExplorationGrid {
    cell_size: f32,
    visits: HashMap<Cell, u32>,
}

impl ExplorationGrid {
    pub fn new(cell_size: f32) -> Self {
        debug_assert!(cell_size > 0.0, "cell size must be positive");
        ExplorationGrid {
            cell_size,
            visits: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn cell_of(&self, pos: Vec2) -> Cell {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
        )
    }

    pub fn visit_count(&self, pos: Vec2) -> u32 {
        self.visits.get(&self.cell_of(pos)).copied().unwrap_or(0)
    }

    pub fn mark_visited(&mut self, pos: Vec2) {
        *self.visits.entry(self.cell_of(pos)).or_insert(0) += 1;
    }

    /// Number of distinct cells visited at least once.
    pub fn visited_cells(&self) -> usize {
        self.visits.len()
    }

    /// Visited cells over `total_cells`; 0 for an empty arena.
    pub fn explored_fraction(&self, total_cells: usize) -> f32 {
        if total_cells == 0 {
            return 0.0;
        }
        self.visited_cells() as f32 / total_cells as f32
    }

    pub fn reset(&mut self) {
        self.visits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_counts_accumulate() {
        let mut grid = ExplorationGrid::new(30.0);
        let p = Vec2::new(45.0, 10.0);
        for n in 1..=5 {
            grid.mark_visited(p);
            assert_eq!(grid.visit_count(p), n);
        }
    }

    #[test]
    fn test_same_cell_shares_count() {
        let mut grid = ExplorationGrid::new(30.0);
        grid.mark_visited(Vec2::new(31.0, 59.0));
        assert_eq!(grid.visit_count(Vec2::new(59.9, 30.0)), 1);
        assert_eq!(grid.visit_count(Vec2::new(60.0, 30.0)), 0);
    }

    #[test]
    fn test_negative_coordinates_floor() {
        let grid = ExplorationGrid::new(30.0);
        assert_eq!(grid.cell_of(Vec2::new(-1.0, -31.0)), (-1, -2));
    }

    #[test]
    fn test_reset_clears_counts() {
        let mut grid = ExplorationGrid::new(30.0);
        let p = Vec2::new(100.0, 100.0);
        grid.mark_visited(p);
        grid.mark_visited(p);
        grid.reset();
        assert_eq!(grid.visit_count(p), 0);
        assert_eq!(grid.visited_cells(), 0);

        grid.mark_visited(p);
        assert_eq!(grid.visit_count(p), 1);
    }

    #[test]
    fn test_explored_fraction() {
        let mut grid = ExplorationGrid::new(10.0);
        grid.mark_visited(Vec2::new(5.0, 5.0));
        grid.mark_visited(Vec2::new(15.0, 5.0));
        grid.mark_visited(Vec2::new(15.0, 5.0));
        // 100x100 arena with 10-unit cells -> 100 cells, 2 visited
        assert!((grid.explored_fraction(100) - 0.02).abs() < 1e-6);
        assert_eq!(grid.explored_fraction(0), 0.0);
    }
}
