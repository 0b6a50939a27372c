// SPDX-License-Identifier: Apache-2.0

//! Clause sets in DIMACS convention plus the variable bookkeeping used to
//! splice locally-numbered models into a shared numbering.

/// A literal: `v` asserts variable `v`, `-v` its negation. Never zero.
pub type Lit = i32;

/// A disjunction of literals. The empty clause is unsatisfiable.
pub type Clause = Vec<Lit>;

/// A conjunction of clauses.
pub type Cnf = Vec<Clause>;

/// Wire / key values, one bit per variable, least-significant variable first.
pub type Mask = u128;

/// Hands out fresh variables `1, 2, ...` in allocation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarPool {
    top: i32,
}

impl VarPool {
    pub fn new() -> Self {
        Self { top: 0 }
    }

    /// A pool whose next variable is `top + 1`.
    pub fn starting_after(top: i32) -> Self {
        Self { top }
    }

    pub fn fresh(&mut self) -> Lit {
        self.top += 1;
        self.top
    }

    pub fn fresh_n(&mut self, n: usize) -> Vec<Lit> {
        (0..n).map(|_| self.fresh()).collect()
    }

    /// The highest variable allocated so far (0 if none).
    pub fn top(&self) -> i32 {
        self.top
    }
}

/// An explicit substitution from a local numbering `1..=len` into a global
/// one. Negative literals map to the negation of their variable's target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarMap {
    targets: Vec<Option<Lit>>,
}

impl VarMap {
    pub fn new(local_var_count: usize) -> Self {
        Self {
            targets: vec![None; local_var_count + 1],
        }
    }

    pub fn local_var_count(&self) -> usize {
        self.targets.len() - 1
    }

    /// Extends the local numbering to `local_var_count` variables; the new
    /// ones start unbound.
    pub fn grow(&mut self, local_var_count: usize) {
        if local_var_count + 1 > self.targets.len() {
            self.targets.resize(local_var_count + 1, None);
        }
    }

    pub fn get(&self, local: Lit) -> Option<Lit> {
        debug_assert!(local > 0);
        self.targets[local as usize]
    }

    /// Binds `local` to `global`. If `local` already has a different target,
    /// the existing target is kept and the pair of clauses tying the two
    /// globals together is returned.
    pub fn bind(&mut self, local: Lit, global: Lit) -> Option<[Clause; 2]> {
        debug_assert!(local > 0 && global > 0);
        match self.targets[local as usize] {
            None => {
                self.targets[local as usize] = Some(global);
                None
            }
            Some(existing) if existing == global => None,
            Some(existing) => Some([vec![-existing, global], vec![existing, -global]]),
        }
    }

    /// Gives every still-unbound local variable a fresh global variable.
    pub fn fill_fresh(&mut self, pool: &mut VarPool) {
        for t in self.targets.iter_mut().skip(1) {
            if t.is_none() {
                *t = Some(pool.fresh());
            }
        }
    }

    /// Returns the global variable of `local`, allocating one if unbound.
    pub fn get_or_fresh(&mut self, local: Lit, pool: &mut VarPool) -> Lit {
        match self.targets[local as usize] {
            Some(t) => t,
            None => {
                let t = pool.fresh();
                self.targets[local as usize] = Some(t);
                t
            }
        }
    }

    pub fn map_lit(&self, lit: Lit) -> Lit {
        let target = self.targets[lit.unsigned_abs() as usize]
            .unwrap_or_else(|| panic!("VarMap::map_lit: local variable {} is unbound", lit.abs()));
        if lit > 0 {
            target
        } else {
            -target
        }
    }

    pub fn map_clause(&self, clause: &[Lit]) -> Clause {
        clause.iter().map(|&l| self.map_lit(l)).collect()
    }
}

/// Unit literals fixing `vars` to the bits of `value` (bit `i` of `value`
/// drives `vars[i]`).
pub fn assumptions_for(vars: &[Lit], value: Mask) -> Vec<Lit> {
    assert!(
        vars.len() <= Mask::BITS as usize,
        "assumptions_for: {} variables exceed the mask width",
        vars.len()
    );
    vars.iter()
        .enumerate()
        .map(|(i, &v)| if (value >> i) & 1 == 1 { v } else { -v })
        .collect()
}

/// Reads the value of `vars` out of an assignment lookup.
pub fn read_mask(vars: &[Lit], value_of: impl Fn(Lit) -> bool) -> Mask {
    vars.iter()
        .enumerate()
        .fold(0, |acc, (i, &v)| if value_of(v) { acc | (1 << i) } else { acc })
}

/// Sequential-counter encoding (Sinz 2005) of `sum(lits) <= bound`.
///
/// Register variable `s[i][j]` means "at least `j + 1` of `lits[0..=i]` are
/// true"; registers are drawn from `pool`.
pub fn at_most(lits: &[Lit], bound: usize, pool: &mut VarPool) -> Cnf {
    let n = lits.len();
    let mut cnf = Cnf::new();
    if bound >= n {
        return cnf;
    }
    if bound == 0 {
        for &x in lits {
            cnf.push(vec![-x]);
        }
        return cnf;
    }
    let k = bound;
    let registers: Vec<Vec<Lit>> = (0..n - 1).map(|_| pool.fresh_n(k)).collect();

    cnf.push(vec![-lits[0], registers[0][0]]);
    for j in 1..k {
        cnf.push(vec![-registers[0][j]]);
    }
    for i in 1..n - 1 {
        let x = lits[i];
        let prev = &registers[i - 1];
        let cur = &registers[i];
        cnf.push(vec![-x, cur[0]]);
        cnf.push(vec![-prev[0], cur[0]]);
        for j in 1..k {
            cnf.push(vec![-x, -prev[j - 1], cur[j]]);
            cnf.push(vec![-prev[j], cur[j]]);
        }
        cnf.push(vec![-x, -prev[k - 1]]);
    }
    cnf.push(vec![-lits[n - 1], -registers[n - 2][k - 1]]);
    cnf
}
