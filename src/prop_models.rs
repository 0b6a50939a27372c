// SPDX-License-Identifier: Apache-2.0

//! Truth-table derived propagation models.
//!
//! Both models use the variable order `inputs, outputs[, aux]`: variable
//! `j + 1` is input bit `j`, variable `input_size + j + 1` is output bit `j`
//! and the auxiliary weight bits follow.
//!
//! - The parity model accepts the mask pairs `(u, v)` for which the monomial
//!   `x^u` occurs in the algebraic normal form of `F(x)^v`.
//! - The weight model annotates every pair with a nonzero integer ANF
//!   coefficient `U[v][u]` with its 2-adic valuation, written in unary over
//!   the auxiliary bits.

use crate::bitset::{BitArray, BitSet, ALL_COORDINATES};
use crate::cnf::{Cnf, Mask};
use crate::function::Function;
use crate::minimize::{minimize_cnf, MinimizeOptions};

/// Largest combined input, output and auxiliary width a truth table may
/// span.
pub const MAX_TABLE_WIDTH: usize = 24;

fn check_width<F: Function + ?Sized>(f: &F, extra: usize) {
    let width = f.input_size() + f.output_size() + extra;
    assert!(
        width <= MAX_TABLE_WIDTH,
        "truth table over {} variables exceeds the supported {}",
        width,
        MAX_TABLE_WIDTH
    );
}

/// The 0/1 matrix `T[y][x] = [F(x) == y]`, shape `[2^out, 2^in]`.
pub fn transition_matrix<F: Function + ?Sized>(f: &F) -> BitArray {
    check_width(f, 0);
    let mut t = BitArray::new(&[1 << f.output_size(), 1 << f.input_size()]);
    for x in 0..(1usize << f.input_size()) {
        let y = f.evaluate(x as Mask) as usize;
        t.set(&[y, x]);
    }
    t
}

/// `A[v][u] = 1` iff `x^u` occurs in the ANF of `F(x)^v`.
pub fn anf_matrix<F: Function + ?Sized>(f: &F) -> BitArray {
    let mut a = transition_matrix(f);
    let rows = a.axis_mask(0, ALL_COORDINATES);
    let cols = a.axis_mask(1, ALL_COORDINATES);
    a.bits.xor_down(rows);
    a.bits.xor_up(cols);
    a
}

/// The ANF indicator widened by the activation masks: an output bit in
/// `output_mask` may be switched on, an input bit in `input_mask` may be
/// switched off.
pub fn anf_prop_table<F: Function + ?Sized>(f: &F, input_mask: Mask, output_mask: Mask) -> BitArray {
    let mut a = anf_matrix(f);
    let out = a.axis_mask(0, output_mask as usize);
    let inp = a.axis_mask(1, input_mask as usize);
    a.bits.or_up(out);
    a.bits.or_down(inp);
    a
}

pub fn compute_parity_model<F: Function + ?Sized>(
    f: &F,
    input_mask: Mask,
    output_mask: Mask,
    options: &MinimizeOptions,
) -> Cnf {
    let table = anf_prop_table(f, input_mask, output_mask);
    minimize_cnf(&table.bits, None, options)
}

/// Integer transform matrix, row-major with shape `[2^out, 2^in]`:
/// `U[v][u] = Σ_{x ⊆ u} (-1)^{|u \ x|} [F(x) ⊇ v]`.
pub fn ut_matrix<F: Function + ?Sized>(f: &F) -> Vec<i64> {
    check_width(f, 0);
    let in_size = f.input_size();
    let out_size = f.output_size();
    let cols = 1usize << in_size;
    let mut m = vec![0i64; cols << out_size];
    for x in 0..cols {
        let y = f.evaluate(x as Mask) as usize;
        m[y * cols + x] = 1;
    }
    // Output axis: accumulate supersets.
    for b in 0..out_size {
        let step = cols << b;
        for row in 0..(1usize << out_size) {
            if (row >> b) & 1 == 0 {
                let lo = row * cols;
                let hi = lo + step;
                for c in 0..cols {
                    m[lo + c] += m[hi + c];
                }
            }
        }
    }
    // Input axis: Möbius difference.
    for b in 0..in_size {
        let bit = 1usize << b;
        for row in m.chunks_mut(cols) {
            for c in 0..cols {
                if c & bit != 0 {
                    row[c] -= row[c ^ bit];
                }
            }
        }
    }
    m
}

/// Exponent of the largest power of two dividing `value`; `None` for zero.
pub fn two_adic_valuation(value: i64) -> Option<u32> {
    if value == 0 {
        None
    } else {
        Some(value.unsigned_abs().trailing_zeros())
    }
}

/// A weight model: clauses over `inputs, outputs, aux` and the number of
/// auxiliary bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightCnf {
    pub clauses: Cnf,
    pub aux_count: usize,
}

/// Builds the weight model of `f`.
///
/// The accepted assignments are exactly the cells `(u, v)` with a nonzero
/// coefficient, each with its aux bits set to `1..1 0..0` where the number of
/// ones is the valuation of the coefficient. Zero cells are excluded.
pub fn compute_weight_model<F: Function + ?Sized>(f: &F, options: &MinimizeOptions) -> WeightCnf {
    let in_size = f.input_size();
    let out_size = f.output_size();
    let m = ut_matrix(f);
    let valuations: Vec<Option<u32>> = m.iter().map(|&c| two_adic_valuation(c)).collect();
    let aux_count = valuations.iter().flatten().copied().max().unwrap_or(0) as usize;
    check_width(f, aux_count);

    let io_width = in_size + out_size;
    let mut table = BitSet::new(1 << (io_width + aux_count));
    for (cell, valuation) in valuations.iter().enumerate() {
        if let Some(w) = valuation {
            let thermometer = (1usize << w) - 1;
            table.set((thermometer << io_width) | cell);
        }
    }
    log::debug!(
        "compute_weight_model: {}x{} function, {} aux bits",
        in_size,
        out_size,
        aux_count
    );
    WeightCnf {
        clauses: minimize_cnf(&table, None, options),
        aux_count,
    }
}
