// SPDX-License-Identifier: Apache-2.0

//! Minimum-cardinality set cover.
//!
//! A greedy pass gives a first feasible cover; it is then tightened with
//! SAT queries of the form "is there a cover with at most `best - 1` sets?"
//! until one comes back UNSAT (the cover is optimal) or the time budget runs
//! out (the best cover so far is returned).

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::cnf::{at_most, Clause, VarPool};
use crate::sat::{find_model, to_formula, SatError};

#[derive(Debug, Clone, Copy)]
pub struct SetCoverOptions {
    /// Wall-clock budget for the improvement phase; `None` runs to
    /// optimality. Checked between solver calls only, so a single call
    /// that is already running may overshoot it.
    pub time_budget: Option<Duration>,

    /// When false only the greedy cover is computed.
    pub exact: bool,
}

impl Default for SetCoverOptions {
    fn default() -> Self {
        Self {
            time_budget: Some(Duration::from_secs(60)),
            exact: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverOutcome {
    /// Indices of the chosen candidates, ascending.
    Optimal(Vec<usize>),
    /// The budget ran out before optimality was shown.
    BestFound(Vec<usize>),
    /// Some element has no candidate covering it.
    Infeasible,
}

/// Solves a set cover instance given, for every element that must be
/// covered, the list of candidate indices (`< candidate_count`) covering it.
pub fn solve_set_cover(
    candidate_count: usize,
    covering: &[Vec<usize>],
    options: &SetCoverOptions,
) -> Result<CoverOutcome, SatError> {
    if covering.iter().any(|c| c.is_empty()) {
        return Ok(CoverOutcome::Infeasible);
    }
    let start = Instant::now();
    let mut best = greedy_cover(candidate_count, covering);
    log::debug!(
        "solve_set_cover: {} elements, {} candidates, greedy cover size {}",
        covering.len(),
        candidate_count,
        best.len()
    );
    if !options.exact {
        return Ok(CoverOutcome::BestFound(best));
    }

    // Candidate `i` is variable `i + 1`.
    let element_clauses: Vec<Clause> = covering
        .iter()
        .map(|c| c.iter().map(|&i| (i + 1) as i32).collect())
        .collect();
    let formula = to_formula(&element_clauses);
    // Candidates covering nothing never improve a cover; keep them out of the counter.
    let candidate_vars: Vec<i32> = covering
        .iter()
        .flatten()
        .map(|&i| (i + 1) as i32)
        .collect::<BTreeSet<i32>>()
        .into_iter()
        .collect();

    while !best.is_empty() {
        if let Some(budget) = options.time_budget {
            if start.elapsed() >= budget {
                log::warn!(
                    "solve_set_cover: time budget of {:?} exhausted; keeping cover of size {}",
                    budget,
                    best.len()
                );
                return Ok(CoverOutcome::BestFound(best));
            }
        }
        let mut pool = VarPool::starting_after(candidate_count as i32);
        let bound = at_most(&candidate_vars, best.len() - 1, &mut pool);
        match find_model(&formula, &bound, &[], &candidate_vars)? {
            None => break,
            Some(model) => {
                best = model
                    .values
                    .iter()
                    .zip(&candidate_vars)
                    .filter(|(&chosen, _)| chosen)
                    .map(|(_, &var)| (var - 1) as usize)
                    .collect();
            }
        }
    }
    Ok(CoverOutcome::Optimal(best))
}

/// Repeatedly takes the candidate covering the most uncovered elements;
/// ties go to the lowest index.
fn greedy_cover(candidate_count: usize, covering: &[Vec<usize>]) -> Vec<usize> {
    let mut covers_elements: Vec<Vec<usize>> = vec![Vec::new(); candidate_count];
    for (element, candidates) in covering.iter().enumerate() {
        for &c in candidates {
            covers_elements[c].push(element);
        }
    }
    let mut covered = vec![false; covering.len()];
    let mut remaining = covering.len();
    let mut chosen = Vec::new();
    while remaining > 0 {
        let (best_candidate, gain) = covers_elements
            .iter()
            .enumerate()
            .map(|(i, elements)| (i, elements.iter().filter(|&&e| !covered[e]).count()))
            .fold((0, 0), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
        debug_assert!(gain > 0);
        for &e in &covers_elements[best_candidate] {
            if !covered[e] {
                covered[e] = true;
                remaining -= 1;
            }
        }
        chosen.push(best_candidate);
    }
    chosen.sort_unstable();
    chosen
}
