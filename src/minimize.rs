// SPDX-License-Identifier: Apache-2.0

//! Two-level CNF minimization of a truth table.
//!
//! The set positions of the table are the allowed assignments. Every maximal
//! cube of disallowed positions becomes a candidate clause, and a minimum
//! number of candidates covering all disallowed positions is selected with
//! the set cover solver.

use std::time::Duration;

use rayon::prelude::*;

use crate::bitset::{maximal_zero_cubes_at, BitSet};
use crate::cnf::{Clause, Cnf};
use crate::set_cover::{solve_set_cover, CoverOutcome, SetCoverOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimizeOptions {
    /// Wall-clock budget for the exact cover improvement. It is checked
    /// between solver calls, so one long call can run past it.
    pub time_budget: Option<Duration>,

    /// When false the greedy cover is used as-is.
    pub exact_cover: bool,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            time_budget: Some(Duration::from_secs(60)),
            exact_cover: true,
        }
    }
}

impl MinimizeOptions {
    fn cover_options(&self) -> SetCoverOptions {
        SetCoverOptions {
            time_budget: self.time_budget,
            exact: self.exact_cover,
        }
    }
}

/// A cube `{base ^ s : s ⊆ free}` of table positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cube {
    pub base: usize,
    pub free: usize,
}

impl Cube {
    pub fn contains(&self, point: usize) -> bool {
        (self.base ^ point) & !self.free == 0
    }

    /// The clause excluding exactly this cube: variable `j + 1` stands for
    /// coordinate `j`.
    pub fn to_clause(&self, dimension: usize) -> Clause {
        (0..dimension)
            .filter(|j| (self.free >> j) & 1 == 0)
            .map(|j| {
                let var = (j + 1) as i32;
                if (self.base >> j) & 1 == 0 {
                    var
                } else {
                    -var
                }
            })
            .collect()
    }
}

/// Enumerates every maximal cube of zero positions of `table`.
///
/// Candidate points are processed in parallel; the result is ordered by base
/// point, then by free mask.
pub fn prime_cubes(table: &BitSet) -> Vec<Cube> {
    (0..table.size())
        .into_par_iter()
        .filter(|&point| !table.test(point))
        .flat_map_iter(|point| {
            maximal_zero_cubes_at(table, point)
                .into_iter()
                .map(|(base, free)| Cube { base, free })
        })
        .collect()
}

/// Returns a CNF over `table.dimension()` variables whose models are the set
/// positions of `table`, up to the positions marked in `dont_care`, which
/// may go either way.
///
/// If no cover can be found the result is the single empty clause.
pub fn minimize_cnf(table: &BitSet, dont_care: Option<&BitSet>, options: &MinimizeOptions) -> Cnf {
    let dimension = table.dimension();
    let mut relaxed = table.clone();
    if let Some(dc) = dont_care {
        assert_eq!(
            dc.size(),
            table.size(),
            "minimize_cnf: don't-care set has size {} but table has size {}",
            dc.size(),
            table.size()
        );
        for p in dc.iter_ones() {
            relaxed.unset(p);
        }
    }

    let cubes = prime_cubes(&relaxed);
    let must_exclude: Vec<usize> = (0..table.size())
        .filter(|&p| !table.test(p) && !dont_care.is_some_and(|dc| dc.test(p)))
        .collect();
    let covering: Vec<Vec<usize>> = must_exclude
        .par_iter()
        .map(|&p| {
            cubes
                .iter()
                .enumerate()
                .filter(|(_, c)| c.contains(p))
                .map(|(i, _)| i)
                .collect()
        })
        .collect();
    log::debug!(
        "minimize_cnf: dimension {}, {} excluded points, {} prime cubes",
        dimension,
        must_exclude.len(),
        cubes.len()
    );

    let chosen = match solve_set_cover(cubes.len(), &covering, &options.cover_options()) {
        Ok(CoverOutcome::Optimal(chosen)) | Ok(CoverOutcome::BestFound(chosen)) => chosen,
        Ok(CoverOutcome::Infeasible) => {
            log::warn!("minimize_cnf: no cover exists; emitting the empty clause");
            return vec![vec![]];
        }
        Err(e) => {
            log::warn!("minimize_cnf: set cover failed ({}); emitting the empty clause", e);
            return vec![vec![]];
        }
    };
    chosen.iter().map(|&i| cubes[i].to_clause(dimension)).collect()
}
