use std::collections::BTreeSet;

use rand::Rng;
use rand::prelude::IndexedRandom;

use crate::{Cell, all_cells};

/// The ground truth the engine is playing against.
///
/// Only the environment looks at where the mines are; the knowledge base
/// only ever sees clues produced by `nearby_mine_count`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Board {
    height: usize,
    width: usize,
    mines: BTreeSet<Cell>,
}

impl Board {
    /// Places `mines` mines uniformly at random.
    pub fn random<R: Rng + ?Sized>(
        height: usize,
        width: usize,
        mines: usize,
        rng: &mut R,
    ) -> anyhow::Result<Self> {
        if mines >= height * width {
            anyhow::bail!("Total mines must be less than the number of cells on the board.");
        }

        let cells: Vec<Cell> = all_cells(height, width).collect();
        let mines = cells.choose_multiple(rng, mines).copied().collect();

        Ok(Board {
            height,
            width,
            mines,
        })
    }

    /// A board with mines at exactly the given cells.
    pub fn with_mines(
        height: usize,
        width: usize,
        mines: impl IntoIterator<Item = Cell>,
    ) -> anyhow::Result<Self> {
        let mines: BTreeSet<Cell> = mines.into_iter().collect();
        if let Some(cell) = mines.iter().find(|c| !c.in_bounds(height, width)) {
            anyhow::bail!("mine {cell} is outside the {height}x{width} board");
        }

        Ok(Board {
            height,
            width,
            mines,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn mines(&self) -> &BTreeSet<Cell> {
        &self.mines
    }

    pub fn is_mine(&self, cell: Cell) -> bool {
        self.mines.contains(&cell)
    }

    /// Number of mines among the (up to 8) cells adjacent to `cell`.
    pub fn nearby_mine_count(&self, cell: Cell) -> usize {
        cell.neighbors(self.height, self.width)
            .filter(|&neighbor| self.is_mine(neighbor))
            .count()
    }

    /// Won when the flagged cells are exactly the mines.
    pub fn is_won(&self, flagged: &BTreeSet<Cell>) -> bool {
        *flagged == self.mines
    }

    /// Whether every cell without a mine has been probed.
    pub fn is_cleared(&self, probed: &BTreeSet<Cell>) -> bool {
        let safe_cells = self.height * self.width - self.mines.len();
        probed.iter().filter(|c| !self.is_mine(**c)).count() == safe_cells
    }
}
