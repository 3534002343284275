pub mod board;
pub mod error;
pub mod game;
pub mod knowledge;
pub mod oracle;
pub mod policy;
pub mod sentence;

use std::fmt;

pub use board::Board;
pub use error::{EngineError, Inconsistency, Result};
pub use game::{BotConfig, Game, GameState, OracleChoice};
pub use knowledge::{CellStatus, KnowledgeBase};
pub use oracle::{Oracle, OracleError, Problem, Verdict};
pub use policy::Move;
pub use sentence::Sentence;

/// A (row, column) coordinate on the minesweeper board.
///
/// Ordering is row-major, which is the canonical order used wherever output
/// has to be deterministic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
}

impl Cell {
    pub const fn new(row: usize, col: usize) -> Self {
        Cell { row, col }
    }

    /// All in-bounds cells adjacent to this one, excluding the cell itself.
    /// Yields at most 8 cells in row-major order and handles edges and corners.
    pub fn neighbors(self, height: usize, width: usize) -> impl Iterator<Item = Cell> {
        (-1..=1).flat_map(move |dr| {
            (-1..=1).filter_map(move |dc| {
                if dr == 0 && dc == 0 {
                    return None;
                }

                let r = self.row as isize + dr;
                let c = self.col as isize + dc;

                if r >= 0 && r < height as isize && c >= 0 && c < width as isize {
                    Some(Cell::new(r as usize, c as usize))
                } else {
                    None
                }
            })
        })
    }

    pub fn in_bounds(self, height: usize, width: usize) -> bool {
        self.row < height && self.col < width
    }
}

impl From<(usize, usize)> for Cell {
    fn from((row, col): (usize, usize)) -> Self {
        Cell::new(row, col)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// Every cell of a `height` x `width` board in row-major order.
pub fn all_cells(height: usize, width: usize) -> impl Iterator<Item = Cell> {
    (0..height).flat_map(move |row| (0..width).map(move |col| Cell::new(row, col)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbors() {
        // Corner, edge and centre cells on a 3x3 board
        assert_eq!(Cell::new(0, 0).neighbors(3, 3).count(), 3);
        assert_eq!(Cell::new(0, 1).neighbors(3, 3).count(), 5);
        assert_eq!(Cell::new(1, 1).neighbors(3, 3).count(), 8);
    }

    #[test]
    fn test_neighbors_are_row_major() {
        let neighbors: Vec<Cell> = Cell::new(1, 1).neighbors(2, 3).collect();
        assert_eq!(
            neighbors,
            vec![
                Cell::new(0, 0),
                Cell::new(0, 1),
                Cell::new(0, 2),
                Cell::new(1, 0),
                Cell::new(1, 2),
            ]
        );
    }

    #[test]
    fn test_cell_ordering() {
        let mut cells = vec![Cell::new(1, 0), Cell::new(0, 2), Cell::new(0, 1)];
        cells.sort();
        assert_eq!(cells, vec![Cell::new(0, 1), Cell::new(0, 2), Cell::new(1, 0)]);
        assert_eq!(Cell::new(2, 3).to_string(), "(2,3)");
    }

    #[test]
    fn test_all_cells() {
        let cells: Vec<Cell> = all_cells(2, 2).collect();
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[1], Cell::new(0, 1));
        assert!(cells.iter().all(|c| c.in_bounds(2, 2)));
    }
}
