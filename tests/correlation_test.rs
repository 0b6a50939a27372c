// SPDX-License-Identifier: Apache-2.0

//! The correlation engine against brute-force evaluation of the keyed
//! cipher.

use std::sync::Arc;

use maskprop::cnf::Mask;
use maskprop::compound::{CompoundFunction, Element, INPUT, OUTPUT};
use maskprop::correlation::{
    CorrelationEngine, CorrelationOptions, Direction, FixedDirection, KeyTuple, ResidueMap, Stage,
};
use maskprop::function::{width_mask, Function};
use maskprop::iterated::construct_iterated_cipher;
use maskprop::library::ComponentLibrary;
use maskprop_test_helpers::{
    evaluate_key_polynomial, init_logger, naive_ut_coefficient, reduce_mod, subcube_integral,
};
use pretty_assertions::assert_eq;
use test_case::test_case;

/// `(x0, x1) -> (x0, x0 ^ x1 ^ k)`.
fn mixing_stage(lib: &ComponentLibrary) -> CompoundFunction {
    let mut f = CompoundFunction::new(2, 2);
    let dup = f.add_component(lib.duplicate_xor());
    let add = f.add_component(lib.xor(2));
    f.connect_components(INPUT, 0, dup, 0);
    f.connect_components(INPUT, 1, dup, 1);
    f.connect_components(dup, 0, OUTPUT, 0);
    f.connect_components(dup, 1, add, 0);
    f.connect_to_key(add, 1);
    f.connect_components(add, 0, OUTPUT, 1);
    f
}

fn keyed_sbox_stage(lib: &ComponentLibrary, table: &[Mask], key_mask: Mask) -> CompoundFunction {
    let sbox: Element = lib.lookup("s3", 3, 3, table.to_vec()).into();
    construct_iterated_cipher(lib, &[sbox], &[key_mask, 0])
}

/// A stage whose contribution is the integer ANF coefficient of its joint
/// function `G(x, k)` at the monomial `x^u k^κ`.
fn exact_stage(function: CompoundFunction) -> Stage {
    let function = Arc::new(function);
    let g = function.clone();
    Stage::new(function, move |u: Mask, v: Mask, k: Mask| {
        let width = g.input_size();
        let joint = |w: Mask| g.simulate(w & width_mask(width), w >> width);
        naive_ut_coefficient(joint, u | (k << width), v) as i128
    })
}

fn options(modulus_bits: u32, precursor: bool, workers: usize) -> CorrelationOptions {
    CorrelationOptions {
        modulus_bits,
        precursor,
        workers,
        shards_per_worker: 3,
    }
}

/// All key assignments of the given per-stage widths.
fn key_space(widths: &[usize]) -> Vec<Vec<Mask>> {
    widths.iter().fold(vec![Vec::new()], |acc, &w| {
        acc.into_iter()
            .flat_map(|prefix| {
                (0..(1u128 << w)).map(move |k| {
                    let mut keys = prefix.clone();
                    keys.push(k);
                    keys
                })
            })
            .collect()
    })
}

/// Checks `polynomial` against the brute-force value for every key.
fn assert_matches_brute_force(
    stages: &[Arc<CompoundFunction>],
    polynomial: &ResidueMap<KeyTuple>,
    u: Mask,
    v: Mask,
    modulus_bits: u32,
    precursor: bool,
) {
    let widths: Vec<usize> = stages.iter().map(|s| s.key_bit_count()).collect();
    for keys in key_space(&widths) {
        let cipher = |x: Mask| {
            stages
                .iter()
                .zip(&keys)
                .fold(x, |acc, (stage, &k)| stage.simulate(acc, k))
        };
        let (want, slots) = if precursor {
            let mut slots = vec![0];
            slots.extend(keys.iter().copied());
            (subcube_integral(cipher, u, v), slots)
        } else {
            (naive_ut_coefficient(cipher, u, v), keys.clone())
        };
        assert_eq!(
            evaluate_key_polynomial(polynomial, &slots, modulus_bits),
            reduce_mod(want, modulus_bits),
            "keys={:?}",
            keys
        );
    }
}

#[test_case(false; "integer transform coefficient")]
#[test_case(true; "subcube count with precursor")]
fn test_two_round_mixing_matches_brute_force(precursor: bool) {
    init_logger();
    let lib = ComponentLibrary::new();
    let functions = vec![Arc::new(mixing_stage(&lib)), Arc::new(mixing_stage(&lib))];
    let stages: Vec<Stage> = functions
        .iter()
        .map(|f| {
            let g = f.clone();
            Stage::new(f.clone(), move |u: Mask, v: Mask, k: Mask| {
                naive_ut_coefficient(|w| g.simulate(w & 0b11, w >> 2), u | (k << 2), v) as i128
            })
        })
        .collect();
    let engine = CorrelationEngine::new(stages, options(2, precursor, 2));
    let got = engine.compute(0b11, 0b11).unwrap();
    assert_matches_brute_force(&functions, &got, 0b11, 0b11, 2, precursor);
}

#[test_case(0b111, 0b011, 4, false; "full input, two output bits")]
#[test_case(0b101, 0b100, 6, true; "precursor, wider modulus")]
#[test_case(0b011, 0b111, 3, true; "precursor, full output")]
fn test_keyed_sboxes_match_brute_force(u: Mask, v: Mask, modulus_bits: u32, precursor: bool) {
    init_logger();
    let lib = ComponentLibrary::new();
    let functions = vec![
        Arc::new(keyed_sbox_stage(&lib, &[6, 4, 0, 3, 5, 1, 7, 2], 0b111)),
        Arc::new(keyed_sbox_stage(&lib, &[0, 5, 3, 2, 6, 1, 4, 7], 0b101)),
    ];
    let stages: Vec<Stage> = functions
        .iter()
        .map(|f| {
            let g = f.clone();
            Stage::new(f.clone(), move |u: Mask, v: Mask, k: Mask| {
                naive_ut_coefficient(|w| g.simulate(w & 0b111, w >> 3), u | (k << 3), v) as i128
            })
        })
        .collect();
    let engine = CorrelationEngine::new(stages, options(modulus_bits, precursor, 3));
    let got = engine.compute(u, v).unwrap();
    assert_matches_brute_force(&functions, &got, u, v, modulus_bits, precursor);
}

#[test]
fn test_worker_count_does_not_change_result() {
    init_logger();
    let lib = ComponentLibrary::new();
    let build = |workers: usize| {
        let stages = vec![
            exact_stage(keyed_sbox_stage(&lib, &[6, 4, 0, 3, 5, 1, 7, 2], 0b011)),
            exact_stage(mixing_stage_wide(&lib)),
        ];
        CorrelationEngine::new(stages, options(8, true, workers))
    };
    let reference = build(1).compute(0b111, 0b101).unwrap();
    for workers in [2, 5] {
        assert_eq!(build(workers).compute(0b111, 0b101).unwrap(), reference);
        assert_eq!(build(workers).compute_pairwise(0b111, 0b101).unwrap(), reference);
    }
}

/// A 3-bit variant of the mixing stage: `(x0, x0 ^ x1 ^ k, x2)`.
fn mixing_stage_wide(lib: &ComponentLibrary) -> CompoundFunction {
    let mut f = CompoundFunction::new(3, 3);
    let dup = f.add_component(lib.duplicate_xor());
    let add = f.add_component(lib.xor(2));
    let pass = f.add_component(lib.identity(1));
    f.connect_components(INPUT, 0, dup, 0);
    f.connect_components(INPUT, 1, dup, 1);
    f.connect_components(INPUT, 2, pass, 0);
    f.connect_components(dup, 0, OUTPUT, 0);
    f.connect_components(dup, 1, add, 0);
    f.connect_to_key(add, 1);
    f.connect_components(add, 0, OUTPUT, 1);
    f.connect_components(pass, 0, OUTPUT, 2);
    f
}

#[test_case(false; "without precursor")]
#[test_case(true; "with precursor")]
fn test_pairwise_agrees_with_meet_in_the_middle(precursor: bool) {
    init_logger();
    let lib = ComponentLibrary::new();
    let stages = vec![
        exact_stage(mixing_stage(&lib)),
        exact_stage(mixing_stage(&lib)),
        exact_stage(mixing_stage(&lib)),
    ];
    let engine = CorrelationEngine::new(stages, options(4, precursor, 2));
    for u in 0..4 {
        for v in 0..4 {
            assert_eq!(
                engine.compute_pairwise(u, v).unwrap(),
                engine.compute(u, v).unwrap(),
                "u={:#b} v={:#b}",
                u,
                v
            );
        }
    }
}

#[test]
fn test_direction_policy_does_not_change_result() {
    init_logger();
    let lib = ComponentLibrary::new();
    let make = || {
        let stages = vec![
            exact_stage(mixing_stage_wide(&lib)),
            exact_stage(keyed_sbox_stage(&lib, &[0, 5, 3, 2, 6, 1, 4, 7], 0b100)),
            exact_stage(mixing_stage_wide(&lib)),
        ];
        CorrelationEngine::new(stages, options(5, true, 2))
    };
    let reference = make().compute(0b110, 0b011).unwrap();
    for direction in [Direction::Forward, Direction::Backward] {
        let engine = make().with_policy(FixedDirection(direction));
        assert_eq!(engine.compute(0b110, 0b011).unwrap(), reference, "{:?}", direction);
        assert_eq!(engine.compute_pairwise(0b110, 0b011).unwrap(), reference, "{:?}", direction);
    }
}

#[test]
fn test_zero_correlation_gives_empty_result() {
    init_logger();
    let lib = ComponentLibrary::new();
    let mut f = CompoundFunction::new(2, 2);
    let id = f.add_component(lib.identity(2));
    f.connect_components(INPUT, 0, id, 0);
    f.connect_components(INPUT, 1, id, 1);
    f.connect_components(id, 0, OUTPUT, 0);
    f.connect_components(id, 1, OUTPUT, 1);
    let f = Arc::new(f);
    let stages = vec![
        Stage::new(f.clone(), |u: Mask, v: Mask, _k: Mask| (u == v) as i128),
        Stage::new(f, |u: Mask, v: Mask, _k: Mask| (u == v) as i128),
    ];
    let engine = CorrelationEngine::new(stages, options(8, false, 1));
    assert!(engine.compute(0b01, 0b10).unwrap().is_empty());
    assert!(engine.compute_pairwise(0b01, 0b10).unwrap().is_empty());
    assert_eq!(
        engine.compute(0b11, 0b11).unwrap(),
        ResidueMap::from([(vec![0, 0], 1)])
    );
}

#[test]
#[should_panic(expected = "wider than")]
fn test_rejects_wide_input_mask() {
    let lib = ComponentLibrary::new();
    let engine = CorrelationEngine::new(vec![exact_stage(mixing_stage(&lib))], options(4, false, 1));
    let _ = engine.compute(0b100, 0);
}

#[test]
#[should_panic(expected = "produces 2 bits")]
fn test_rejects_mismatched_stage_widths() {
    let lib = ComponentLibrary::new();
    CorrelationEngine::new(
        vec![exact_stage(mixing_stage(&lib)), exact_stage(mixing_stage_wide(&lib))],
        options(4, false, 1),
    );
}
