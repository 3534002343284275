use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::error::{EngineError, Inconsistency, Result};
use crate::{Cell, Sentence, all_cells};

/// What the knowledge base currently knows about a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    Unknown,
    Safe,
    Mine,
    /// Probed by a move. Probed cells are also safe.
    Probed,
}

/// The set of facts deduced from the clues seen so far.
///
/// Invariants, kept by every public operation:
/// - `safes` and `mines` are disjoint.
/// - No sentence mentions a cell whose status is known.
/// - `moves_made` is a subset of `safes`.
/// - `safes`, `mines` and `moves_made` only grow until `reset`.
///
/// Mutations are transactional: an operation failing with
/// `InconsistentKnowledge` leaves the knowledge base untouched.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KnowledgeBase {
    height: usize,
    width: usize,
    moves_made: BTreeSet<Cell>,
    safes: BTreeSet<Cell>,
    mines: BTreeSet<Cell>,
    /// In insertion order, which keeps propagation deterministic.
    sentences: Vec<Sentence>,
    /// Bumped on every change so oracle answers can be checked for staleness.
    revision: u64,
    /// Bumped by `reset`; knowledge from another game never carries over.
    epoch: u64,
}

impl KnowledgeBase {
    pub fn new(height: usize, width: usize) -> Self {
        KnowledgeBase {
            height,
            width,
            moves_made: BTreeSet::new(),
            safes: BTreeSet::new(),
            mines: BTreeSet::new(),
            sentences: Vec::new(),
            revision: 0,
            epoch: 0,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn moves_made(&self) -> &BTreeSet<Cell> {
        &self.moves_made
    }

    pub fn safes(&self) -> &BTreeSet<Cell> {
        &self.safes
    }

    pub fn mines(&self) -> &BTreeSet<Cell> {
        &self.mines
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Which game this knowledge belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + use<> {
        all_cells(self.height, self.width)
    }

    pub fn status(&self, cell: Cell) -> CellStatus {
        if self.moves_made.contains(&cell) {
            CellStatus::Probed
        } else if self.safes.contains(&cell) {
            CellStatus::Safe
        } else if self.mines.contains(&cell) {
            CellStatus::Mine
        } else {
            CellStatus::Unknown
        }
    }

    /// Forgets everything, for a new game on a board of the same size.
    pub fn reset(&mut self) {
        let (revision, epoch) = (self.revision + 1, self.epoch + 1);
        *self = KnowledgeBase::new(self.height, self.width);
        self.revision = revision;
        self.epoch = epoch;
    }

    /// Records that `cell` was probed and has `count` mines around it,
    /// then propagates to a fixpoint.
    pub fn add_clue(&mut self, cell: Cell, count: usize) -> Result<()> {
        self.check_bounds(cell)?;
        debug!(%cell, count, "adding clue");

        self.transaction(|kb| {
            kb.moves_made.insert(cell);
            kb.record_safe(cell)?;

            let mut remaining = count;
            let mut cells = BTreeSet::new();
            for neighbor in cell.neighbors(kb.height, kb.width) {
                if kb.mines.contains(&neighbor) {
                    remaining = remaining.checked_sub(1).ok_or(Inconsistency::CountOutOfRange {
                        cells: 0,
                        count: remaining as isize - 1,
                    })?;
                } else if !kb.safes.contains(&neighbor) {
                    cells.insert(neighbor);
                }
            }

            kb.sentences.push(Sentence::new(cells, remaining)?);
            kb.run_fixpoint()?;
            Ok(())
        })
    }

    /// Adds a constraint from outside the clue flow: exactly `count` of
    /// `cells` are mines. Known cells are stripped before it is stored.
    pub fn add_sentence(&mut self, cells: impl IntoIterator<Item = Cell>, count: usize) -> Result<()> {
        let cells: BTreeSet<Cell> = cells.into_iter().collect();
        for &cell in &cells {
            self.check_bounds(cell)?;
        }

        self.transaction(|kb| {
            let known_mines = cells.intersection(&kb.mines).count();
            let remaining = count.checked_sub(known_mines).ok_or(Inconsistency::CountOutOfRange {
                cells: 0,
                count: count as isize - known_mines as isize,
            })?;
            let unknown = cells
                .iter()
                .filter(|&c| !kb.mines.contains(c) && !kb.safes.contains(c))
                .copied();
            let sentence = Sentence::new(unknown, remaining)?;

            kb.sentences.push(sentence);
            kb.run_fixpoint()?;
            Ok(())
        })
    }

    /// Records `cell` as safe and removes it from every sentence.
    /// Does not propagate.
    pub fn mark_safe(&mut self, cell: Cell) -> Result<()> {
        self.check_bounds(cell)?;
        self.transaction(|kb| kb.record_safe(cell).map(|_| ()))
    }

    /// Records `cell` as a mine and removes it from every sentence.
    /// Does not propagate.
    pub fn mark_mine(&mut self, cell: Cell) -> Result<()> {
        self.check_bounds(cell)?;
        self.transaction(|kb| kb.record_mine(cell).map(|_| ()))
    }

    /// Runs trivial extraction and subset elimination until neither
    /// changes anything. Returns whether anything changed.
    pub fn propagate(&mut self) -> Result<bool> {
        self.transaction(|kb| kb.run_fixpoint())
    }

    fn run_fixpoint(&mut self) -> Result<bool> {
        let mut changed_any = false;
        let mut passes = 0;

        loop {
            passes += 1;
            let mut changed = self.extract_known()?;
            changed |= self.eliminate_subsets()?;

            // Empty sentences carry no information
            self.sentences.retain(|s| !s.is_empty());

            if !changed {
                break;
            }
            changed_any = true;
        }

        debug!(
            passes,
            sentences = self.sentences.len(),
            safes = self.safes.len(),
            mines = self.mines.len(),
            "propagation reached fixpoint"
        );
        Ok(changed_any)
    }

    /// Applies `f` to a copy and commits only if it succeeds.
    /// The revision moves only when the committed state differs.
    pub(crate) fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mut candidate = self.clone();
        let value = f(&mut candidate)?;
        if candidate != *self {
            candidate.revision = self.revision + 1;
            *self = candidate;
        }
        Ok(value)
    }

    fn check_bounds(&self, cell: Cell) -> Result<()> {
        if cell.in_bounds(self.height, self.width) {
            Ok(())
        } else {
            Err(EngineError::OutOfBounds {
                cell,
                height: self.height,
                width: self.width,
            })
        }
    }

    fn record_safe(&mut self, cell: Cell) -> Result<bool> {
        if self.mines.contains(&cell) {
            return Err(Inconsistency::SafeAndMine(cell).into());
        }
        let mut changed = self.safes.insert(cell);
        for sentence in &mut self.sentences {
            changed |= sentence.mark_safe(cell)?;
        }
        if changed {
            trace!(%cell, "safe");
        }
        Ok(changed)
    }

    fn record_mine(&mut self, cell: Cell) -> Result<bool> {
        if self.safes.contains(&cell) {
            return Err(Inconsistency::SafeAndMine(cell).into());
        }
        let mut changed = self.mines.insert(cell);
        for sentence in &mut self.sentences {
            changed |= sentence.mark_mine(cell)?;
        }
        if changed {
            trace!(%cell, "mine");
        }
        Ok(changed)
    }

    fn extract_known(&mut self) -> Result<bool> {
        let mut safes = BTreeSet::new();
        let mut mines = BTreeSet::new();
        for sentence in &self.sentences {
            safes.extend(sentence.known_safes());
            mines.extend(sentence.known_mines());
        }

        let mut changed = false;
        for cell in safes {
            changed |= self.record_safe(cell)?;
        }
        for cell in mines {
            changed |= self.record_mine(cell)?;
        }
        Ok(changed)
    }

    fn eliminate_subsets(&mut self) -> Result<bool> {
        let mut changed = false;
        for i in 0..self.sentences.len() {
            // Sentence `i` is never modified in its own row of the sweep
            let subset = self.sentences[i].clone();
            if subset.is_empty() {
                continue;
            }
            for j in 0..self.sentences.len() {
                if i != j && self.sentences[j].eliminate(&subset)? {
                    trace!(subset = %subset, superset = %self.sentences[j], "subset eliminated");
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(bcs::to_bytes(self)?)
    }

    pub fn from_bytes(bts: &[u8]) -> anyhow::Result<Self> {
        Ok(bcs::from_bytes(bts)?)
    }
}
