use std::collections::BTreeMap;
use std::fmt::Write;

use itertools::Itertools;
use tracing::debug;
use varisat::{CnfFormula, ExtendFormula, Lit, Solver, Var};

use super::{Oracle, OracleError, Problem};
use crate::Cell;

/// Above this many variables the combinatorial encodings blow up and the
/// sequential counter takes over.
const NAIVE_LIMIT: usize = 10;

/// In-process oracle backed by a SAT solver.
///
/// Every sentence becomes an exactly-k constraint; each cell is then tested
/// with both polarities under assumptions. Cells where only one polarity is
/// satisfiable are reported in the usual `mine(r,c).` / `-mine(r,c).` form.
#[derive(Debug, Default)]
pub struct SatOracle;

impl SatOracle {
    pub fn new() -> Self {
        SatOracle
    }
}

impl Oracle for SatOracle {
    fn invoke(&mut self, problem: &Problem) -> Result<String, OracleError> {
        let mut solver = Solver::new();
        let mut var_map: BTreeMap<Cell, Var> = BTreeMap::new();

        for cell in problem.unknown_cells() {
            var_map.insert(cell, solver.new_var());
        }

        let mut formula = CnfFormula::new();
        for sentence in &problem.sentences {
            let lits: Vec<Lit> = sentence
                .cells()
                .iter()
                .filter_map(|c| var_map.get(c).map(|&v| Lit::from_var(v, true)))
                .collect();
            encode_exactly_k(&mut formula, &mut solver, &lits, sentence.count());
        }
        solver.add_formula(&formula);

        if !solver.solve().map_err(|e| OracleError::Solver(e.to_string()))? {
            return Err(OracleError::Unsatisfiable);
        }

        let mut out = String::new();
        for (&cell, &var) in &var_map {
            let mine_possible = satisfiable_with(&mut solver, Lit::from_var(var, true))?;
            let safe_possible = satisfiable_with(&mut solver, Lit::from_var(var, false))?;

            match (mine_possible, safe_possible) {
                (true, false) => {
                    let _ = writeln!(out, "mine({},{}).", cell.row, cell.col);
                }
                (false, true) => {
                    let _ = writeln!(out, "-mine({},{}).", cell.row, cell.col);
                }
                (true, true) => {}
                (false, false) => return Err(OracleError::Unsatisfiable),
            }
        }

        debug!(
            variables = var_map.len(),
            forced = out.lines().count(),
            "sat oracle finished"
        );
        Ok(out)
    }
}

fn satisfiable_with(solver: &mut Solver, lit: Lit) -> Result<bool, OracleError> {
    solver.assume(&[lit]);
    let result = solver.solve().map_err(|e| OracleError::Solver(e.to_string()));
    solver.assume(&[]);
    result
}

/// Encodes "exactly k of `vars` are true".
fn encode_exactly_k(formula: &mut CnfFormula, solver: &mut Solver, vars: &[Lit], k: usize) {
    encode_at_most_k(formula, solver, vars, k);
    encode_at_least_k(formula, solver, vars, k);
}

/// No k + 1 of the variables are true together.
fn encode_at_most_k(formula: &mut CnfFormula, solver: &mut Solver, vars: &[Lit], k: usize) {
    if k >= vars.len() {
        return;
    }
    if k == 0 {
        for &lit in vars {
            formula.add_clause(&[!lit]);
        }
        return;
    }

    if vars.len() <= NAIVE_LIMIT {
        for combo in vars.iter().copied().combinations(k + 1) {
            let clause: Vec<Lit> = combo.iter().map(|&lit| !lit).collect();
            formula.add_clause(&clause);
        }
    } else {
        encode_sequential_counter_at_most_k(formula, solver, vars, k);
    }
}

/// Every group of n - k + 1 variables has at least one true.
fn encode_at_least_k(formula: &mut CnfFormula, solver: &mut Solver, vars: &[Lit], k: usize) {
    if k == 0 {
        return;
    }
    if k > vars.len() {
        formula.add_clause(&[]);
        return;
    }

    if vars.len() <= NAIVE_LIMIT {
        for combo in vars.iter().copied().combinations(vars.len() - k + 1) {
            formula.add_clause(&combo);
        }
    } else {
        // At least k true is at most n - k false
        let negated: Vec<Lit> = vars.iter().map(|&lit| !lit).collect();
        encode_at_most_k(formula, solver, &negated, vars.len() - k);
    }
}

/// Sequential counter for "at most k", linear in `n * k`.
///
/// `s[i][j]` is implied when at least `j + 1` of `vars[..=i]` are true; a
/// variable that would push the count past `k` is forbidden.
fn encode_sequential_counter_at_most_k(
    formula: &mut CnfFormula,
    solver: &mut Solver,
    vars: &[Lit],
    k: usize,
) {
    let n = vars.len();
    if k == 0 || k >= n {
        return;
    }

    let s: Vec<Vec<Lit>> = (0..n - 1)
        .map(|_| (0..k).map(|_| solver.new_lit()).collect())
        .collect();

    formula.add_clause(&[!vars[0], s[0][0]]);
    for j in 1..k {
        formula.add_clause(&[!s[0][j]]);
    }

    for i in 1..n - 1 {
        formula.add_clause(&[!vars[i], s[i][0]]);
        formula.add_clause(&[!s[i - 1][0], s[i][0]]);
        for j in 1..k {
            formula.add_clause(&[!vars[i], !s[i - 1][j - 1], s[i][j]]);
            formula.add_clause(&[!s[i - 1][j], s[i][j]]);
        }
        formula.add_clause(&[!vars[i], !s[i - 1][k - 1]]);
    }

    formula.add_clause(&[!vars[n - 1], !s[n - 2][k - 1]]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KnowledgeBase;
    use crate::oracle::{consult, decode, Verdict};

    fn cell(row: usize, col: usize) -> Cell {
        Cell::new(row, col)
    }

    #[test]
    fn test_sat_oracle_beyond_propagation() {
        // {a,b,c} = 1 and {b,c,d} = 2 overlap without either being a subset,
        // yet d must be a mine and a must be safe
        let mut kb = KnowledgeBase::new(1, 4);
        kb.add_sentence([cell(0, 0), cell(0, 1), cell(0, 2)], 1).unwrap();
        kb.add_sentence([cell(0, 1), cell(0, 2), cell(0, 3)], 2).unwrap();
        assert!(kb.safes().is_empty() && kb.mines().is_empty());

        let output = SatOracle::new().invoke(&Problem::encode(&kb)).unwrap();
        assert_eq!(
            decode(&output),
            vec![
                Verdict { cell: cell(0, 0), is_mine: false },
                Verdict { cell: cell(0, 3), is_mine: true },
            ]
        );

        let fresh = consult(&mut kb, &mut SatOracle::new()).unwrap();
        assert_eq!(fresh, 2);
        assert!(kb.safes().contains(&cell(0, 0)));
        assert!(kb.mines().contains(&cell(0, 3)));
    }

    #[test]
    fn test_sat_oracle_undetermined() {
        let mut kb = KnowledgeBase::new(1, 2);
        kb.add_sentence([cell(0, 0), cell(0, 1)], 1).unwrap();

        let output = SatOracle::new().invoke(&Problem::encode(&kb)).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_sat_oracle_unsatisfiable() {
        // Not reachable through the knowledge base, which rejects it itself
        let problem = Problem {
            epoch: 0,
            revision: 0,
            safes: vec![],
            mines: vec![],
            sentences: vec![
                crate::Sentence::new([cell(0, 0), cell(0, 1)], 2).unwrap(),
                crate::Sentence::new([cell(0, 1), cell(0, 2)], 0).unwrap(),
            ],
        };
        assert!(matches!(
            SatOracle::new().invoke(&problem),
            Err(OracleError::Unsatisfiable)
        ));
    }

    #[test]
    fn test_encodings() {
        let mut solver = Solver::new();
        let vars: Vec<Lit> = (0..4).map(|_| Lit::from_var(solver.new_var(), true)).collect();
        let mut formula = CnfFormula::new();
        encode_exactly_k(&mut formula, &mut solver, &vars, 2);
        solver.add_formula(&formula);

        assert!(solver.solve().unwrap());
        let model = solver.model().unwrap();
        let mines = vars.iter().filter(|lit| model.contains(lit)).count();
        assert_eq!(mines, 2);
    }

    #[test]
    fn test_sequential_counter_exactly_k() {
        for k in [1, 3, 9] {
            let mut solver = Solver::new();
            let vars: Vec<Lit> = (0..12).map(|_| solver.new_lit()).collect();
            let mut formula = CnfFormula::new();
            encode_exactly_k(&mut formula, &mut solver, &vars, k);
            solver.add_formula(&formula);

            // Pin every variable and compare against the popcount
            for mask in 0u32..1 << vars.len() {
                let assumptions: Vec<Lit> = vars
                    .iter()
                    .enumerate()
                    .map(|(i, &lit)| if mask & (1 << i) != 0 { lit } else { !lit })
                    .collect();
                solver.assume(&assumptions);
                let sat = solver.solve().unwrap();
                assert_eq!(sat, mask.count_ones() as usize == k, "k {k} mask {mask:b}");
            }
        }
    }

    #[test]
    fn test_sat_oracle_large_sentence() {
        // {(0,0)..(0,11)} = 1 and {(0,10),(0,11),(0,12)} = 2: the one mine of
        // the long sentence sits in (0,10) or (0,11), so (0,12) is a mine and
        // the rest of the row is safe
        let mut kb = KnowledgeBase::new(1, 13);
        kb.add_sentence((0..12).map(|col| cell(0, col)), 1).unwrap();
        kb.add_sentence([cell(0, 10), cell(0, 11), cell(0, 12)], 2).unwrap();
        assert!(kb.safes().is_empty() && kb.mines().is_empty());

        let verdicts = decode(&SatOracle::new().invoke(&Problem::encode(&kb)).unwrap());
        let mut expected: Vec<Verdict> = (0..10)
            .map(|col| Verdict { cell: cell(0, col), is_mine: false })
            .collect();
        expected.push(Verdict { cell: cell(0, 12), is_mine: true });
        assert_eq!(verdicts, expected);
    }

    #[test]
    fn test_sat_oracle_board_wide_mine_count() {
        // A global mine count over a whole 10x10 board stays tractable
        let mut kb = KnowledgeBase::new(10, 10);
        let all: Vec<Cell> = kb.cells().collect();
        kb.add_sentence(all, 10).unwrap();
        kb.add_clue(cell(0, 0), 0).unwrap();
        assert_eq!(kb.sentences()[0].len(), 96);

        let output = SatOracle::new().invoke(&Problem::encode(&kb)).unwrap();
        assert!(decode(&output).is_empty());
    }
}
