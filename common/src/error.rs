use crate::Cell;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Failures surfaced by the knowledge base and the move policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The clues contradict each other, or the engine has a logic defect.
    /// Never recovered from by clamping.
    #[error("inconsistent knowledge: {0}")]
    InconsistentKnowledge(#[from] Inconsistency),
    #[error("cell {cell} is outside the {height}x{width} board")]
    OutOfBounds {
        cell: Cell,
        height: usize,
        width: usize,
    },
    /// Every cell has either been probed or is a known mine.
    #[error("no moves available")]
    NoMovesAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Inconsistency {
    #[error("cell {0} is both safe and a mine")]
    SafeAndMine(Cell),
    #[error("{count} mines cannot be placed among {cells} cells")]
    CountOutOfRange { cells: usize, count: isize },
}

impl EngineError {
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, EngineError::InconsistentKnowledge(_))
    }
}
