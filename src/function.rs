// SPDX-License-Identifier: Apache-2.0

use crate::cnf::Mask;

/// A total map from `input_size`-bit values to `output_size`-bit values.
///
/// Bit `i` of the argument is input wire `i`; bit `j` of the result is output
/// wire `j`.
pub trait Function {
    fn input_size(&self) -> usize;
    fn output_size(&self) -> usize;
    fn evaluate(&self, x: Mask) -> Mask;
}

/// All-ones value of the given width.
pub fn width_mask(width: usize) -> Mask {
    if width >= Mask::BITS as usize {
        Mask::MAX
    } else {
        (1 << width) - 1
    }
}
