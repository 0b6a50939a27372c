// SPDX-License-Identifier: Apache-2.0

//! Dense bit vectors over the boolean hypercube.
//!
//! A `BitSet` of size `2^n` is viewed as an indicator function on subsets of
//! `{0, .., n-1}`: bit `i` is the membership of the subset whose elements are
//! the set bits of `i`. Every transform below acts on the pairs `(lo, hi)` of
//! indices that differ only in one selected coordinate `b` (`lo` has bit `b`
//! clear, `hi = lo | 1 << b`), once per coordinate selected by `mask`:
//!
//! - `swap`: exchange `lo` and `hi` (index permutation `i -> i ^ mask`).
//! - `xor_up` / `xor_down`: `hi ^= lo` / `lo ^= hi` (Möbius transforms mod 2).
//! - `or_up`: `hi |= lo`, i.e. upward closure (`i` set if some subset is set).
//! - `or_down`: `lo |= hi`, i.e. downward closure (`i` set if some superset is
//!   set).
//! - `less_up`: `hi &= !lo`, keeps the minimal elements of an up-closed set.
//! - `more_down`: `lo &= !hi`, keeps the maximal elements of a down-closed set.
//!
//! Each transform costs `O(2^n * popcount(mask))` word operations.

/// Masks of the positions whose coordinate `b` is clear, for `b < 6`.
const LO_MASKS: [u64; 6] = [
    0x5555_5555_5555_5555,
    0x3333_3333_3333_3333,
    0x0f0f_0f0f_0f0f_0f0f,
    0x00ff_00ff_00ff_00ff,
    0x0000_ffff_0000_ffff,
    0x0000_0000_ffff_ffff,
];

/// Selects every coordinate in a transform mask.
pub const ALL_COORDINATES: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Swap,
    XorUp,
    XorDown,
    OrUp,
    OrDown,
    LessUp,
    MoreDown,
}

impl Op {
    /// Applies the op to the `lo` / `hi` bit lanes packed in one word.
    #[inline]
    fn apply_in_word(self, w: u64, m: u64, s: u32) -> u64 {
        match self {
            Op::Swap => ((w >> s) & m) | ((w & m) << s),
            Op::XorUp => w ^ ((w & m) << s),
            Op::XorDown => w ^ ((w >> s) & m),
            Op::OrUp => w | ((w & m) << s),
            Op::OrDown => w | ((w >> s) & m),
            Op::LessUp => w & (m | ((!w & m) << s)),
            Op::MoreDown => w & (!m | (!(w >> s) & m)),
        }
    }

    /// Applies the op to a `lo` / `hi` pair of whole words.
    #[inline]
    fn apply_across_words(self, lo: &mut u64, hi: &mut u64) {
        match self {
            Op::Swap => std::mem::swap(lo, hi),
            Op::XorUp => *hi ^= *lo,
            Op::XorDown => *lo ^= *hi,
            Op::OrUp => *hi |= *lo,
            Op::OrDown => *lo |= *hi,
            Op::LessUp => *hi &= !*lo,
            Op::MoreDown => *lo &= !*hi,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    size: usize,
    words: Vec<u64>,
}

impl BitSet {
    /// Creates an all-zero set with `size` positions; `size` must be a power
    /// of two.
    pub fn new(size: usize) -> Self {
        assert!(
            size.is_power_of_two(),
            "BitSet::new: size must be a power of two; got {}",
            size
        );
        Self {
            size,
            words: vec![0; size.div_ceil(64)],
        }
    }

    /// Number of hypercube coordinates, i.e. `log2(size)`.
    pub fn dimension(&self) -> usize {
        self.size.trailing_zeros() as usize
    }

    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.size);
        self.words[index >> 6] |= 1u64 << (index & 63);
    }

    #[inline]
    pub fn unset(&mut self, index: usize) {
        debug_assert!(index < self.size);
        self.words[index >> 6] &= !(1u64 << (index & 63));
    }

    #[inline]
    pub fn test(&self, index: usize) -> bool {
        debug_assert!(index < self.size);
        (self.words[index >> 6] >> (index & 63)) & 1 != 0
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn any(&self) -> bool {
        self.words.iter().any(|w| *w != 0)
    }

    fn tail_mask(&self) -> u64 {
        if self.size >= 64 {
            u64::MAX
        } else {
            (1u64 << self.size) - 1
        }
    }

    /// Complements every position.
    pub fn flip(&mut self) {
        for w in self.words.iter_mut() {
            *w = !*w;
        }
        let tail = self.tail_mask();
        if let Some(last) = self.words.last_mut() {
            *last &= tail;
        }
    }

    /// Iterates the set positions in increasing order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some((wi << 6) + bit)
            })
        })
    }

    fn transform(&mut self, op: Op, mask: usize) {
        let dims = self.dimension();
        for b in 0..dims {
            if (mask >> b) & 1 == 0 {
                continue;
            }
            if b < 6 {
                let m = LO_MASKS[b];
                let s = 1u32 << b;
                for w in self.words.iter_mut() {
                    *w = op.apply_in_word(*w, m, s);
                }
            } else {
                let stride = 1usize << (b - 6);
                let mut j = 0;
                while j < self.words.len() {
                    let (lo, hi) = self.words[j..j + 2 * stride].split_at_mut(stride);
                    for (l, h) in lo.iter_mut().zip(hi.iter_mut()) {
                        op.apply_across_words(l, h);
                    }
                    j += 2 * stride;
                }
            }
        }
    }

    pub fn swap(&mut self, mask: usize) {
        self.transform(Op::Swap, mask);
    }

    pub fn xor_up(&mut self, mask: usize) {
        self.transform(Op::XorUp, mask);
    }

    pub fn xor_down(&mut self, mask: usize) {
        self.transform(Op::XorDown, mask);
    }

    pub fn or_up(&mut self, mask: usize) {
        self.transform(Op::OrUp, mask);
    }

    pub fn or_down(&mut self, mask: usize) {
        self.transform(Op::OrDown, mask);
    }

    pub fn less_up(&mut self, mask: usize) {
        self.transform(Op::LessUp, mask);
    }

    pub fn more_down(&mut self, mask: usize) {
        self.transform(Op::MoreDown, mask);
    }
}

/// A `BitSet` addressed by row-major coordinates over power-of-two axes.
///
/// The last axis varies fastest, so for shape `[rows, cols]` the position of
/// `(r, c)` is `r * cols + c`. Axis-restricted transforms select the
/// hypercube coordinates that belong to one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitArray {
    pub bits: BitSet,
    shape: Vec<usize>,
}

impl BitArray {
    pub fn new(shape: &[usize]) -> Self {
        for &extent in shape {
            assert!(
                extent.is_power_of_two(),
                "BitArray::new: every axis extent must be a power of two; got {:?}",
                shape
            );
        }
        let size = shape.iter().product();
        Self {
            bits: BitSet::new(size),
            shape: shape.to_vec(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn stride(&self, axis: usize) -> usize {
        self.shape[axis + 1..].iter().product()
    }

    pub fn index(&self, coords: &[usize]) -> usize {
        debug_assert_eq!(coords.len(), self.shape.len());
        coords
            .iter()
            .zip(self.shape.iter())
            .fold(0, |acc, (&c, &extent)| {
                debug_assert!(c < extent);
                acc * extent + c
            })
    }

    pub fn set(&mut self, coords: &[usize]) {
        let i = self.index(coords);
        self.bits.set(i);
    }

    pub fn test(&self, coords: &[usize]) -> bool {
        self.bits.test(self.index(coords))
    }

    /// Lifts a coordinate mask on one axis into a transform mask over the
    /// flattened index.
    pub fn axis_mask(&self, axis: usize, mask: usize) -> usize {
        (mask & (self.shape[axis] - 1)) * self.stride(axis)
    }
}

/// Returns the maximal cubes of zero positions of `table` that contain
/// `point`, as `(base, free)` pairs.
///
/// A cube `(base, free)` is the set `{base ^ s : s ⊆ free}`; `base` has no
/// bit in common with `free`. Only cubes whose `base` equals `point` are
/// reported, so enumerating every zero point yields every maximal cube
/// exactly once. `point` itself must be a zero position.
///
/// Composition: permute by `point`, take the upward closure, complement (the
/// free-bit patterns whose cube avoids every set position), then keep the
/// maximal elements of that down-closed family.
pub fn maximal_zero_cubes_at(table: &BitSet, point: usize) -> Vec<(usize, usize)> {
    debug_assert!(!table.test(point));
    let mut x = table.clone();
    x.swap(point);
    x.or_up(ALL_COORDINATES);
    x.flip();
    x.or_down(ALL_COORDINATES);
    x.more_down(ALL_COORDINATES);
    x.iter_ones()
        .filter(|free| free & point == 0)
        .map(|free| (point, free))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_indices(size: usize, indices: &[usize]) -> BitSet {
        let mut s = BitSet::new(size);
        for &i in indices {
            s.set(i);
        }
        s
    }

    #[test]
    fn test_swap_is_xor_permutation() {
        for size_log in [2usize, 3, 7, 8] {
            let size = 1 << size_log;
            let indices: Vec<usize> = (0..size).filter(|i| i % 3 == 1).collect();
            let mask = 0b101 & (size - 1);
            let mut s = from_indices(size, &indices);
            s.swap(mask);
            let want: Vec<usize> = {
                let mut v: Vec<usize> = indices.iter().map(|i| i ^ mask).collect();
                v.sort();
                v
            };
            assert_eq!(s.iter_ones().collect::<Vec<_>>(), want);
        }
    }

    #[test]
    fn test_or_up_is_upward_closure() {
        let mut s = from_indices(8, &[0b010]);
        s.or_up(ALL_COORDINATES);
        assert_eq!(
            s.iter_ones().collect::<Vec<_>>(),
            vec![0b010, 0b011, 0b110, 0b111]
        );
    }

    #[test]
    fn test_or_down_is_downward_closure_across_words() {
        // Dimension 8 exercises the cross-word path for coordinates 6 and 7.
        let top = 0b1100_0001;
        let mut s = from_indices(256, &[top]);
        s.or_down(ALL_COORDINATES);
        let want: Vec<usize> = (0..256).filter(|i| i & !top == 0).collect();
        assert_eq!(s.iter_ones().collect::<Vec<_>>(), want);
    }

    #[test]
    fn test_more_down_keeps_maximal_elements() {
        let mut s = from_indices(16, &[0b0011, 0b1000]);
        s.or_down(ALL_COORDINATES);
        s.more_down(ALL_COORDINATES);
        assert_eq!(s.iter_ones().collect::<Vec<_>>(), vec![0b0011, 0b1000]);
    }

    #[test]
    fn test_less_up_keeps_minimal_elements() {
        let mut s = from_indices(128, &[0b100_0001, 0b000_0110]);
        s.or_up(ALL_COORDINATES);
        s.less_up(ALL_COORDINATES);
        assert_eq!(s.iter_ones().collect::<Vec<_>>(), vec![0b000_0110, 0b100_0001]);
    }

    #[test]
    fn test_xor_up_is_involution() {
        let original = from_indices(64, &[1, 7, 12, 33, 63]);
        let mut s = original.clone();
        s.xor_up(ALL_COORDINATES);
        s.xor_up(ALL_COORDINATES);
        assert_eq!(s, original);
    }

    #[test]
    fn test_flip_masks_tail_of_small_sets() {
        let mut s = BitSet::new(4);
        s.flip();
        assert_eq!(s.count(), 4);
    }

    #[test]
    fn test_axis_mask_selects_row_coordinates() {
        let a = BitArray::new(&[4, 8]);
        assert_eq!(a.axis_mask(0, ALL_COORDINATES), 0b11 << 3);
        assert_eq!(a.axis_mask(1, 0b101), 0b101);
        assert_eq!(a.index(&[2, 5]), 2 * 8 + 5);
    }

    #[test]
    fn test_maximal_zero_cubes_of_single_one() {
        // Only position 0b11 is set; zero cubes through 0b00 are the two
        // single-coordinate edges that avoid 0b11.
        let table = from_indices(4, &[0b11]);
        let cubes = maximal_zero_cubes_at(&table, 0b00);
        assert_eq!(cubes, vec![(0b00, 0b01), (0b00, 0b10)]);
        // From 0b01 the maximal cube is {0b00, 0b01}, whose base is 0b00, so
        // it is not reported here.
        assert!(maximal_zero_cubes_at(&table, 0b01).is_empty());
    }
}
