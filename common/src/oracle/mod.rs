//! Optional second opinion from a constraint solver.
//!
//! The knowledge base is encoded into a [`Problem`], an [`Oracle`] answers
//! with lines of `mine(r,c).` / `-mine(r,c).`, and [`fold`] applies those
//! verdicts back through `mark_mine` / `mark_safe` in one transaction.

mod process;
mod sat;

use std::fmt::Write;
use std::time::Duration;

use itertools::Itertools;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::{Cell, KnowledgeBase, Sentence};

pub use process::{CancelToken, ProcessConfig, ProcessOracle};
pub use sat::SatOracle;

/// Anything that can answer a [`Problem`] with solver result text.
pub trait Oracle {
    fn invoke(&mut self, problem: &Problem) -> Result<String, OracleError>;
}

/// Oracle failures. None of them are fatal to the knowledge base; callers
/// fall back to pure propagation.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle call was cancelled")]
    Cancelled,
    #[error("oracle exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("oracle produced malformed output: {0}")]
    MalformedOutput(String),
    #[error("oracle found the constraints unsatisfiable")]
    Unsatisfiable,
    #[error("solver error: {0}")]
    Solver(String),
    /// The knowledge base moved on while the oracle was running and the
    /// verdicts no longer fit it, or it was reset for another game.
    #[error("stale oracle verdicts")]
    Stale(#[source] Option<EngineError>),
    #[error("oracle verdicts contradict the knowledge base: {0}")]
    Rejected(#[source] EngineError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One fact reported by an oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Verdict {
    pub cell: Cell,
    pub is_mine: bool,
}

/// A snapshot of the knowledge base in the shape solvers want.
///
/// Cells are in canonical order so the rendered text is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// Game of the knowledge base this was encoded from.
    pub epoch: u64,
    /// Revision of the knowledge base this was encoded from.
    pub revision: u64,
    pub safes: Vec<Cell>,
    pub mines: Vec<Cell>,
    pub sentences: Vec<Sentence>,
}

impl Problem {
    pub fn encode(kb: &KnowledgeBase) -> Self {
        Problem {
            epoch: kb.epoch(),
            revision: kb.revision(),
            safes: kb.safes().iter().copied().collect(),
            mines: kb.mines().iter().copied().collect(),
            sentences: kb.sentences().to_vec(),
        }
    }

    /// Every cell some sentence still talks about, in canonical order.
    pub fn unknown_cells(&self) -> Vec<Cell> {
        self.sentences
            .iter()
            .flat_map(|s| s.cells().iter().copied())
            .sorted()
            .dedup()
            .collect()
    }

    /// Renders the problem in the first-order syntax of the mace4 family
    /// of solvers.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "% Minesweeper knowledge at revision {}", self.revision);
        out.push_str("formulas(assumptions).\n");

        out.push_str("% Known safe cells\n");
        for &cell in &self.safes {
            let _ = writeln!(out, "-{}.", atom(cell));
        }

        out.push_str("% Known mines\n");
        for &cell in &self.mines {
            let _ = writeln!(out, "{}.", atom(cell));
        }

        for sentence in &self.sentences {
            render_sentence(&mut out, sentence);
        }

        out.push_str("end_of_list.\n\n");

        out.push_str("formulas(goals).\n");
        for sentence in &self.sentences {
            render_goal(&mut out, sentence);
        }
        out.push_str("end_of_list.\n");
        out
    }
}

fn atom(cell: Cell) -> String {
    format!("mine({},{})", cell.row, cell.col)
}

fn render_sentence(out: &mut String, sentence: &Sentence) {
    let cells: Vec<Cell> = sentence.cells().iter().copied().collect();
    let count = sentence.count();

    if cells.is_empty() {
        return;
    }
    if count == 0 {
        for &cell in &cells {
            let _ = writeln!(out, "-{}.", atom(cell));
        }
        return;
    }
    if count == cells.len() {
        for &cell in &cells {
            let _ = writeln!(out, "{}.", atom(cell));
        }
        return;
    }

    // Some `count` of the cells are all mines...
    let _ = writeln!(out, "% At least {count} mines");
    let _ = writeln!(out, "{}.", at_least(&cells, count));

    // ...and no `count + 1` of them are.
    let _ = writeln!(out, "% At most {count} mines");
    for combo in cells.iter().combinations(count + 1) {
        let _ = writeln!(out, "-({}).", combo.into_iter().map(|&c| atom(c)).join(" & "));
    }
}

fn at_least(cells: &[Cell], count: usize) -> String {
    cells
        .iter()
        .combinations(count)
        .map(|combo| format!("({})", combo.into_iter().map(|&c| atom(c)).join(" & ")))
        .join(" | ")
}

/// The weaker form of a sentence: a safe region, a mined region, or at
/// least `count` mines.
fn render_goal(out: &mut String, sentence: &Sentence) {
    let cells: Vec<Cell> = sentence.cells().iter().copied().collect();
    let count = sentence.count();

    if cells.is_empty() {
        return;
    }
    if count == 0 {
        let _ = writeln!(out, "{}.", cells.iter().map(|&c| format!("-{}", atom(c))).join(" & "));
    } else if count == cells.len() {
        for &cell in &cells {
            let _ = writeln!(out, "{}.", atom(cell));
        }
    } else {
        let _ = writeln!(out, "% At least {count} mines");
        let _ = writeln!(out, "{}.", at_least(&cells, count));
    }
}

/// Parses solver output. Only `mine(r,c).` and `-mine(r,c).` lines are
/// understood; everything else is skipped.
pub fn decode(text: &str) -> Vec<Verdict> {
    text.lines()
        .filter_map(|line| {
            let verdict = parse_line(line.trim());
            if verdict.is_none() && !line.trim().is_empty() {
                debug!(line, "skipping unrecognised oracle output");
            }
            verdict
        })
        .collect()
}

fn parse_line(line: &str) -> Option<Verdict> {
    let (is_mine, rest) = match line.strip_prefix('-') {
        Some(rest) => (false, rest),
        None => (true, line),
    };
    let inner = rest.strip_prefix("mine(")?.strip_suffix(").")?;
    let (row, col) = inner.split_once(',')?;
    let cell = Cell::new(row.trim().parse().ok()?, col.trim().parse().ok()?);
    Some(Verdict { cell, is_mine })
}

/// Applies `verdicts` answering `problem` to `kb`.
///
/// Everything is applied in one transaction followed by propagation, so on
/// any error the knowledge base is exactly as it was. Verdicts from another
/// game are refused outright. Verdicts about cells outside the board are
/// skipped. Returns how many verdicts were new information.
pub fn apply_verdicts(
    kb: &mut KnowledgeBase,
    problem: &Problem,
    verdicts: &[Verdict],
) -> Result<usize, OracleError> {
    if kb.epoch() != problem.epoch {
        debug!(
            epoch = problem.epoch,
            current = kb.epoch(),
            "dropping verdicts from an earlier game"
        );
        return Err(OracleError::Stale(None));
    }
    let stale = kb.revision() != problem.revision;

    let result = kb.transaction(|kb| {
        let mut fresh = 0;
        for verdict in verdicts {
            if !verdict.cell.in_bounds(kb.height(), kb.width()) {
                debug!(cell = %verdict.cell, "skipping verdict outside the board");
                continue;
            }
            let known = if verdict.is_mine {
                kb.mines().contains(&verdict.cell)
            } else {
                kb.safes().contains(&verdict.cell)
            };
            if !known {
                fresh += 1;
            }
            if verdict.is_mine {
                kb.mark_mine(verdict.cell)?;
            } else {
                kb.mark_safe(verdict.cell)?;
            }
        }
        kb.propagate()?;
        Ok(fresh)
    });

    match result {
        Ok(fresh) => Ok(fresh),
        Err(err) if stale => Err(OracleError::Stale(Some(err))),
        Err(err) => Err(OracleError::Rejected(err)),
    }
}

/// Decodes `output` and applies it; see [`apply_verdicts`].
pub fn fold(kb: &mut KnowledgeBase, problem: &Problem, output: &str) -> Result<usize, OracleError> {
    let verdicts = decode(output);
    apply_verdicts(kb, problem, &verdicts)
}

/// Encodes `kb`, asks `oracle`, and folds the answer back in.
pub fn consult<O: Oracle + ?Sized>(
    kb: &mut KnowledgeBase,
    oracle: &mut O,
) -> Result<usize, OracleError> {
    let problem = Problem::encode(kb);
    let output = oracle.invoke(&problem)?;
    let fresh = fold(kb, &problem, &output)?;
    info!(fresh, revision = kb.revision(), "oracle verdicts applied");
    Ok(fresh)
}
