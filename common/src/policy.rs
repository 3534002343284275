use rand::Rng;
use rand::prelude::IndexedRandom;

use crate::error::{EngineError, Result};
use crate::{Cell, KnowledgeBase};

/// A probe chosen by the move policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// Proven safe by the knowledge base.
    Safe(Cell),
    /// No certain move existed, so this is an unbiased guess.
    Guess(Cell),
}

impl Move {
    pub fn cell(self) -> Cell {
        match self {
            Move::Safe(cell) | Move::Guess(cell) => cell,
        }
    }

    pub fn is_guess(self) -> bool {
        matches!(self, Move::Guess(_))
    }
}

impl KnowledgeBase {
    /// The lowest (row, then column) cell that is known safe but not yet probed.
    pub fn choose_safe_move(&self) -> Option<Cell> {
        self.safes().difference(self.moves_made()).next().copied()
    }

    /// A uniformly random cell that is neither probed nor a known mine.
    pub fn choose_random_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Cell> {
        let candidates: Vec<Cell> = self
            .cells()
            .filter(|cell| !self.moves_made().contains(cell) && !self.mines().contains(cell))
            .collect();

        candidates
            .choose(rng)
            .copied()
            .ok_or(EngineError::NoMovesAvailable)
    }

    /// Prefers a proven-safe cell and only guesses when there is none.
    pub fn choose_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Move> {
        match self.choose_safe_move() {
            Some(cell) => Ok(Move::Safe(cell)),
            None => self.choose_random_move(rng).map(Move::Guess),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_safe_move_tie_break() {
        let mut kb = KnowledgeBase::new(4, 4);
        kb.add_clue(Cell::new(0, 0), 0).unwrap();

        // (0,1), (1,0) and (1,1) are safe; (0,1) comes first in row-major order
        assert_eq!(kb.choose_safe_move(), Some(Cell::new(0, 1)));

        kb.add_clue(Cell::new(0, 1), 0).unwrap();
        assert_eq!(kb.choose_safe_move(), Some(Cell::new(0, 2)));
    }

    #[test]
    fn test_no_safe_move_on_fresh_board() {
        let kb = KnowledgeBase::new(3, 3);
        assert_eq!(kb.choose_safe_move(), None);
    }

    #[test]
    fn test_random_move_skips_probed_and_mines() {
        let mut kb = KnowledgeBase::new(2, 2);
        kb.add_clue(Cell::new(0, 0), 1).unwrap();
        kb.mark_mine(Cell::new(1, 1)).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let cell = kb.choose_random_move(&mut rng).unwrap();
            assert_ne!(cell, Cell::new(0, 0));
            assert_ne!(cell, Cell::new(1, 1));
        }
    }

    #[test]
    fn test_random_move_is_reproducible() {
        let kb = KnowledgeBase::new(8, 8);
        let picks = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..10)
                .map(|_| kb.choose_random_move(&mut rng).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(42), picks(42));
    }

    #[test]
    fn test_no_moves_available() {
        let mut kb = KnowledgeBase::new(1, 2);
        kb.add_clue(Cell::new(0, 0), 1).unwrap();
        assert_eq!(kb.mines().len(), 1);

        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(kb.choose_random_move(&mut rng), Err(EngineError::NoMovesAvailable));
        assert_eq!(kb.choose_move(&mut rng), Err(EngineError::NoMovesAvailable));
    }

    #[test]
    fn test_choose_move_prefers_safe() {
        let mut kb = KnowledgeBase::new(3, 3);
        let mut rng = StdRng::seed_from_u64(1);

        assert!(kb.choose_move(&mut rng).unwrap().is_guess());

        kb.add_clue(Cell::new(1, 1), 0).unwrap();
        assert_eq!(kb.choose_move(&mut rng).unwrap(), Move::Safe(Cell::new(0, 0)));
    }
}
