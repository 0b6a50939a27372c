// SPDX-License-Identifier: Apache-2.0

//! Iterated ciphers: rounds chained with key additions between them.

use crate::cnf::Mask;
use crate::compound::{CompoundFunction, ComponentId, Element, INPUT, OUTPUT};
use crate::library::ComponentLibrary;

/// Chains `rounds` into one circuit with key additions between them.
///
/// `key_masks[i]` selects the wires that receive a fresh key bit before round
/// `i`; the last mask applies to the outputs of the final round. Each
/// selected wire passes through a 2-way xor whose second input is the key.
/// Key bits are numbered boundary by boundary, low wire first.
pub fn construct_iterated_cipher(
    library: &ComponentLibrary,
    rounds: &[Element],
    key_masks: &[Mask],
) -> CompoundFunction {
    assert!(!rounds.is_empty(), "an iterated cipher needs at least one round");
    assert_eq!(
        rounds.len() + 1,
        key_masks.len(),
        "{} rounds need {} key masks; got {}",
        rounds.len(),
        rounds.len() + 1,
        key_masks.len()
    );
    for (i, pair) in rounds.windows(2).enumerate() {
        assert_eq!(
            pair[0].output_size(),
            pair[1].input_size(),
            "round {} produces {} bits but round {} takes {}",
            i,
            pair[0].output_size(),
            i + 1,
            pair[1].input_size()
        );
    }

    let widths: Vec<usize> = rounds
        .iter()
        .map(|r| r.input_size())
        .chain(rounds.last().map(|r| r.output_size()))
        .collect();
    let mut f = CompoundFunction::new(widths[0], widths[widths.len() - 1]);
    let mut previous: ComponentId = INPUT;
    for (i, (&width, &key_mask)) in widths.iter().zip(key_masks).enumerate() {
        let xors: Vec<Option<ComponentId>> = (0..width)
            .map(|j| {
                if (key_mask >> j) & 1 == 1 {
                    Some(f.add_component(library.xor(2)))
                } else {
                    None
                }
            })
            .collect();
        let next = match rounds.get(i) {
            Some(round) => f.add_component(round.clone()),
            None => OUTPUT,
        };
        for (j, xor) in xors.iter().enumerate() {
            match xor {
                None => f.connect_components(previous, j, next, j),
                Some(x) => {
                    f.connect_components(previous, j, *x, 0);
                    f.connect_to_key(*x, 1);
                    f.connect_components(*x, 0, next, j);
                }
            }
        }
        previous = next;
    }
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;

    #[test]
    fn test_key_bits_follow_mask_order() {
        let lib = ComponentLibrary::new();
        let round: Element = lib.duplicate_xor().into();
        let f = construct_iterated_cipher(&lib, &[round], &[0b01, 0b10]);
        assert_eq!(f.key_bit_count(), 2);
        // Key 0 flips x0 before the round, key 1 flips output 1 after it.
        for x in 0..4u128 {
            for k in 0..4u128 {
                let x0 = (x & 1) ^ (k & 1);
                let x1 = x >> 1;
                let y = ((x0 ^ x1) << 1) | x0;
                assert_eq!(f.simulate(x, k), y ^ ((k >> 1) << 1), "x={} k={}", x, k);
            }
        }
    }

    #[test]
    fn test_keyless_chain_is_composition() {
        let lib = ComponentLibrary::new();
        let sbox: Element = lib.lookup("s", 2, 2, vec![2, 0, 3, 1]).into();
        let f = construct_iterated_cipher(&lib, &[sbox.clone(), sbox.clone()], &[0, 0, 0]);
        assert_eq!(f.key_bit_count(), 0);
        for x in 0..4 {
            assert_eq!(f.evaluate(x), sbox.evaluate(sbox.evaluate(x)));
        }
    }

    #[test]
    #[should_panic(expected = "key masks")]
    fn test_key_mask_count_is_checked() {
        let lib = ComponentLibrary::new();
        let round: Element = lib.identity(2).into();
        construct_iterated_cipher(&lib, &[round], &[0]);
    }
}
