// SPDX-License-Identifier: Apache-2.0

//! Brute-force reference computations the model tests compare against.
//!
//! Everything here works on plain closures over `u128` values so that it
//! does not depend on the crate under test.

use std::collections::BTreeMap;

/// Initializes test logging once per test binary.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// All submasks of `mask`, in increasing order.
pub fn submasks(mask: u128) -> Vec<u128> {
    let mut out = Vec::new();
    let mut s = 0u128;
    loop {
        out.push(s);
        if s == mask {
            break;
        }
        s = (s.wrapping_sub(mask)) & mask;
    }
    out
}

fn covers(y: u128, v: u128) -> bool {
    y & v == v
}

/// `Σ_{x ⊆ u} [f(x) ⊇ v]`.
pub fn subcube_integral(f: impl Fn(u128) -> u128, u: u128, v: u128) -> i64 {
    submasks(u).into_iter().filter(|&x| covers(f(x), v)).count() as i64
}

/// Integer ANF coefficient of the monomial `x^u` in `f(x)^v`:
/// `Σ_{x ⊆ u} (-1)^{|u \ x|} [f(x) ⊇ v]`.
pub fn naive_ut_coefficient(f: impl Fn(u128) -> u128, u: u128, v: u128) -> i64 {
    submasks(u)
        .into_iter()
        .filter(|&x| covers(f(x), v))
        .map(|x| if (u ^ x).count_ones() % 2 == 0 { 1 } else { -1 })
        .sum()
}

/// Whether `x^u` occurs in the GF(2) ANF of `f(x)^v`.
pub fn naive_anf_contains(f: impl Fn(u128) -> u128, u: u128, v: u128) -> bool {
    subcube_integral(f, u, v) % 2 == 1
}

/// Evaluates a key polynomial `Σ c · Π_i [κ_i ⊆ keys[i]]` modulo
/// `2^modulus_bits`.
pub fn evaluate_key_polynomial(
    polynomial: &BTreeMap<Vec<u128>, u64>,
    keys: &[u128],
    modulus_bits: u32,
) -> u64 {
    let mask = if modulus_bits == 64 {
        u64::MAX
    } else {
        (1u64 << modulus_bits) - 1
    };
    let mut total = 0u64;
    for (monomial, c) in polynomial {
        assert_eq!(
            monomial.len(),
            keys.len(),
            "key tuple {:?} does not match {} key slots",
            monomial,
            keys.len()
        );
        if monomial.iter().zip(keys).all(|(m, k)| m & k == *m) {
            total = total.wrapping_add(*c);
        }
    }
    log::trace!("evaluate_key_polynomial; keys={:?} total={}", keys, total & mask);
    total & mask
}

/// Reduces a signed value modulo `2^modulus_bits`.
pub fn reduce_mod(value: i64, modulus_bits: u32) -> u64 {
    let mask = if modulus_bits == 64 {
        u64::MAX
    } else {
        (1u64 << modulus_bits) - 1
    };
    (value as u64) & mask
}
