use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Inconsistency, Result};
use crate::Cell;

/// A logical statement about the board: exactly `count` of `cells` are mines.
///
/// `0 <= count <= cells.len()` holds after every successful operation. An
/// operation that would break it fails with `InconsistentKnowledge`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Sentence {
    cells: BTreeSet<Cell>,
    count: usize,
}

impl Sentence {
    pub fn new(cells: impl IntoIterator<Item = Cell>, count: usize) -> Result<Self> {
        let sentence = Sentence {
            cells: cells.into_iter().collect(),
            count,
        };
        sentence.check()?;
        Ok(sentence)
    }

    pub fn cells(&self) -> &BTreeSet<Cell> {
        &self.cells
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    /// Every cell, when the count equals the number of cells.
    /// An empty sentence carries no information and reports nothing.
    pub fn known_mines(&self) -> BTreeSet<Cell> {
        if self.count == self.cells.len() && self.count != 0 {
            self.cells.clone()
        } else {
            BTreeSet::new()
        }
    }

    /// Every cell, when the count is zero.
    pub fn known_safes(&self) -> BTreeSet<Cell> {
        if self.count == 0 {
            self.cells.clone()
        } else {
            BTreeSet::new()
        }
    }

    /// Removes a cell known to be a mine, taking its mine out of the count.
    /// Returns whether the sentence changed.
    pub fn mark_mine(&mut self, cell: Cell) -> Result<bool> {
        if !self.cells.remove(&cell) {
            return Ok(false);
        }
        self.count = self
            .count
            .checked_sub(1)
            .ok_or(Inconsistency::CountOutOfRange {
                cells: self.cells.len(),
                count: -1,
            })?;
        self.check()?;
        Ok(true)
    }

    /// Removes a cell known to be safe. The count is unchanged.
    /// Returns whether the sentence changed.
    pub fn mark_safe(&mut self, cell: Cell) -> Result<bool> {
        if !self.cells.remove(&cell) {
            return Ok(false);
        }
        self.check()?;
        Ok(true)
    }

    /// Subset elimination: if `subset`'s cells are a non-empty subset of ours,
    /// the remaining cells hold exactly `self.count - subset.count` mines.
    /// Returns whether the sentence changed.
    pub fn eliminate(&mut self, subset: &Sentence) -> Result<bool> {
        if subset.cells.is_empty() || !subset.cells.is_subset(&self.cells) {
            return Ok(false);
        }

        let remaining: BTreeSet<Cell> = self.cells.difference(&subset.cells).copied().collect();
        let count = self
            .count
            .checked_sub(subset.count)
            .ok_or(Inconsistency::CountOutOfRange {
                cells: remaining.len(),
                count: self.count as isize - subset.count as isize,
            })?;

        self.cells = remaining;
        self.count = count;
        self.check()?;
        Ok(true)
    }

    fn check(&self) -> Result<()> {
        if self.count > self.cells.len() {
            return Err(Inconsistency::CountOutOfRange {
                cells: self.cells.len(),
                count: self.count as isize,
            }
            .into());
        }
        Ok(())
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{cell}")?;
        }
        write!(f, "}} = {}", self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineError;

    fn cells(list: &[(usize, usize)]) -> Vec<Cell> {
        list.iter().copied().map(Cell::from).collect()
    }

    fn set(list: &[(usize, usize)]) -> BTreeSet<Cell> {
        list.iter().copied().map(Cell::from).collect()
    }

    #[test]
    fn test_known_safes_and_mines() {
        let safe = Sentence::new(cells(&[(1, 1), (1, 2), (1, 3)]), 0).unwrap();
        assert_eq!(safe.known_safes().len(), 3);
        assert!(safe.known_mines().is_empty());

        let mines = Sentence::new(cells(&[(2, 2), (2, 3)]), 2).unwrap();
        assert_eq!(mines.known_mines(), set(&[(2, 2), (2, 3)]));
        assert!(mines.known_safes().is_empty());

        let unknown = Sentence::new(cells(&[(0, 0), (0, 1)]), 1).unwrap();
        assert!(unknown.known_mines().is_empty());
        assert!(unknown.known_safes().is_empty());
    }

    #[test]
    fn test_empty_sentence_is_not_all_mines() {
        let empty = Sentence::new(Vec::new(), 0).unwrap();
        assert!(empty.known_mines().is_empty());
        assert!(empty.known_safes().is_empty());
    }

    #[test]
    fn test_count_out_of_range_rejected() {
        let result = Sentence::new(cells(&[(0, 0)]), 2);
        assert!(matches!(
            result,
            Err(EngineError::InconsistentKnowledge(
                Inconsistency::CountOutOfRange { cells: 1, count: 2 }
            ))
        ));
    }

    #[test]
    fn test_mark_mine_is_idempotent() {
        let mut once = Sentence::new(cells(&[(0, 0), (0, 1), (0, 2)]), 2).unwrap();
        let mut twice = once.clone();

        assert!(once.mark_mine(Cell::new(0, 1)).unwrap());
        assert!(twice.mark_mine(Cell::new(0, 1)).unwrap());
        assert!(!twice.mark_mine(Cell::new(0, 1)).unwrap());

        assert_eq!(once, twice);
        assert_eq!(once.count(), 1);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_mark_safe_keeps_count() {
        let mut sentence = Sentence::new(cells(&[(0, 0), (0, 1), (0, 2)]), 1).unwrap();
        assert!(sentence.mark_safe(Cell::new(0, 0)).unwrap());
        assert!(!sentence.mark_safe(Cell::new(0, 0)).unwrap());
        assert!(!sentence.mark_safe(Cell::new(5, 5)).unwrap());
        assert_eq!(sentence.count(), 1);
        assert_eq!(sentence.cells(), &set(&[(0, 1), (0, 2)]));
    }

    #[test]
    fn test_mark_mine_below_zero_is_inconsistent() {
        let mut sentence = Sentence::new(cells(&[(0, 0), (0, 1)]), 0).unwrap();
        let err = sentence.mark_mine(Cell::new(0, 0)).unwrap_err();
        assert!(err.is_inconsistent());
    }

    #[test]
    fn test_mark_safe_overfull_is_inconsistent() {
        let mut sentence = Sentence::new(cells(&[(0, 0), (0, 1)]), 2).unwrap();
        let err = sentence.mark_safe(Cell::new(0, 0)).unwrap_err();
        assert!(err.is_inconsistent());
    }

    #[test]
    fn test_subset_elimination() {
        let a = Sentence::new(cells(&[(0, 0), (0, 1)]), 1).unwrap();
        let mut b = Sentence::new(cells(&[(0, 0), (0, 1), (0, 2)]), 2).unwrap();

        assert!(b.eliminate(&a).unwrap());
        assert_eq!(b, Sentence::new(cells(&[(0, 2)]), 1).unwrap());

        // Not a subset any more
        assert!(!b.eliminate(&a).unwrap());
    }

    #[test]
    fn test_subset_elimination_ignores_empty_and_overlapping() {
        let empty = Sentence::new(Vec::new(), 0).unwrap();
        let overlap = Sentence::new(cells(&[(0, 1), (0, 3)]), 1).unwrap();
        let mut b = Sentence::new(cells(&[(0, 0), (0, 1), (0, 2)]), 2).unwrap();
        let before = b.clone();

        assert!(!b.eliminate(&empty).unwrap());
        assert!(!b.eliminate(&overlap).unwrap());
        assert_eq!(b, before);
    }

    #[test]
    fn test_subset_elimination_negative_count() {
        let a = Sentence::new(cells(&[(0, 0), (0, 1)]), 2).unwrap();
        let mut b = Sentence::new(cells(&[(0, 0), (0, 1), (0, 2)]), 1).unwrap();
        let err = b.eliminate(&a).unwrap_err();
        assert_eq!(
            err,
            EngineError::InconsistentKnowledge(Inconsistency::CountOutOfRange {
                cells: 1,
                count: -1
            })
        );
    }

    #[test]
    fn test_display() {
        let sentence = Sentence::new(cells(&[(0, 1), (0, 0)]), 1).unwrap();
        assert_eq!(sentence.to_string(), "{(0,0), (0,1)} = 1");
    }
}
