// SPDX-License-Identifier: Apache-2.0

//! Satisfiability queries and projected model enumeration on top of varisat.
//!
//! Formulas are converted once into a `varisat::CnfFormula` snapshot that can
//! be shared read-only between worker threads; each query builds its own
//! solver from the snapshot, so queries never observe each other's blocking
//! clauses.

use varisat::{CnfFormula, ExtendFormula, Lit as SatLit};

use crate::cnf::{Clause, Lit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatError {
    Solver(String),
}

impl std::fmt::Display for SatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SatError::Solver(msg) => write!(f, "SAT solver error: {}", msg),
        }
    }
}

impl std::error::Error for SatError {}

impl From<varisat::solver::SolverError> for SatError {
    fn from(e: varisat::solver::SolverError) -> Self {
        SatError::Solver(format!("{:?}", e))
    }
}

#[inline]
fn to_sat_lit(lit: Lit) -> SatLit {
    debug_assert!(lit != 0);
    SatLit::from_dimacs(lit as isize)
}

fn to_sat_lits(lits: &[Lit]) -> Vec<SatLit> {
    lits.iter().map(|&l| to_sat_lit(l)).collect()
}

/// Builds a solver-side snapshot of `clauses`.
pub fn to_formula(clauses: &[Clause]) -> CnfFormula {
    let mut formula = CnfFormula::new();
    for clause in clauses {
        formula.add_clause(&to_sat_lits(clause));
    }
    formula
}

fn new_solver<'a>(formula: &CnfFormula, extra: &[Clause]) -> varisat::Solver<'a> {
    let mut solver = varisat::Solver::new();
    solver.add_formula(formula);
    for clause in extra {
        solver.add_clause(&to_sat_lits(clause));
    }
    solver
}

/// Returns whether `formula ∧ extra` is satisfiable under `assumptions`.
pub fn is_satisfiable(
    formula: &CnfFormula,
    extra: &[Clause],
    assumptions: &[Lit],
) -> Result<bool, SatError> {
    let mut solver = new_solver(formula, extra);
    solver.assume(&to_sat_lits(assumptions));
    Ok(solver.solve()?)
}

/// A satisfying assignment restricted to a projection; `values[i]` is the
/// value of the `i`-th projected variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectedModel {
    pub values: Vec<bool>,
}

fn read_projection(model: &[SatLit], projection: &[Lit]) -> Vec<bool> {
    let mut assignment: Vec<bool> = Vec::new();
    for lit in model {
        let idx = lit.var().index();
        if assignment.len() <= idx {
            assignment.resize(idx + 1, false);
        }
        assignment[idx] = lit.is_positive();
    }
    projection
        .iter()
        .map(|&v| assignment.get((v - 1) as usize).copied().unwrap_or(false))
        .collect()
}

/// Returns one model of `formula ∧ extra` under `assumptions`, restricted to
/// `projection`, or `None` if there is none.
pub fn find_model(
    formula: &CnfFormula,
    extra: &[Clause],
    assumptions: &[Lit],
    projection: &[Lit],
) -> Result<Option<ProjectedModel>, SatError> {
    let mut solver = new_solver(formula, extra);
    solver.assume(&to_sat_lits(assumptions));
    if !solver.solve()? {
        return Ok(None);
    }
    Ok(solver.model().map(|model| ProjectedModel {
        values: read_projection(&model, projection),
    }))
}

/// Enumerates every distinct assignment of `projection` that extends to a
/// model of `formula ∧ extra` under `assumptions`.
///
/// Each found projection is excluded by a blocking clause before the next
/// solve; enumeration runs to exhaustion. Variables the solver never saw
/// read as false.
pub fn enumerate_projected_models(
    formula: &CnfFormula,
    extra: &[Clause],
    assumptions: &[Lit],
    projection: &[Lit],
) -> Result<Vec<ProjectedModel>, SatError> {
    let mut solver = new_solver(formula, extra);
    let sat_assumptions = to_sat_lits(assumptions);
    let mut models = Vec::new();
    loop {
        solver.assume(&sat_assumptions);
        if !solver.solve()? {
            break;
        }
        let model = match solver.model() {
            Some(m) => m,
            None => break,
        };
        let values = read_projection(&model, projection);
        let blocking: Vec<SatLit> = projection
            .iter()
            .zip(values.iter())
            .map(|(&v, &value)| if value { to_sat_lit(-v) } else { to_sat_lit(v) })
            .collect();
        models.push(ProjectedModel { values });
        solver.add_clause(&blocking);
    }
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnf::{at_most, VarPool};

    #[test]
    fn test_enumerates_all_projections_once() {
        // (a ∨ b) with a free c: projecting on (a, b) gives three models.
        let formula = to_formula(&[vec![1, 2], vec![3, -3]]);
        let mut got = enumerate_projected_models(&formula, &[], &[], &[1, 2]).unwrap();
        got.sort();
        let want: Vec<ProjectedModel> = [[false, true], [true, false], [true, true]]
            .iter()
            .map(|v| ProjectedModel { values: v.to_vec() })
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_assumptions_restrict_enumeration() {
        let formula = to_formula(&[vec![1, 2]]);
        let got = enumerate_projected_models(&formula, &[], &[-1], &[1, 2]).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].values, vec![false, true]);
    }

    #[test]
    fn test_unsatisfiable_assumptions_yield_no_models() {
        let formula = to_formula(&[vec![1], vec![-1, 2]]);
        assert!(!is_satisfiable(&formula, &[], &[-2]).unwrap());
        assert!(enumerate_projected_models(&formula, &[], &[-2], &[1, 2])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_extra_cardinality_clauses_prune_models() {
        let mut pool = VarPool::new();
        let xs = pool.fresh_n(4);
        let card = at_most(&xs, 1, &mut pool);
        let formula = to_formula(&[]);
        let got = enumerate_projected_models(&formula, &card, &[], &xs).unwrap();
        // The empty assignment plus the four singletons.
        assert_eq!(got.len(), 5);
    }
}
