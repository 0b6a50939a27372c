// SPDX-License-Identifier: Apache-2.0

//! Exact correlation modulo `2^m` by meet-in-the-middle propagation.
//!
//! A cipher is given as a sequence of stages, each a compound function plus
//! an evaluator for the exact contribution of one `(input mask, output mask,
//! key monomial)` triple through it. The stages' weight models are stacked
//! into one formula, with a cardinality bound of `m - 1` on all weight bits
//! since any trail of weight `m` or more contributes `0 mod 2^m`.
//!
//! A forward frontier grows from the input mask and a backward frontier from
//! the output mask, one stage at a time, until they meet. Each frontier maps
//! a boundary mask to a polynomial in the key monomials seen so far, stored
//! as `key tuple -> residue`. Every step is split into strided shards that
//! run on a thread pool built for that step; shard results are merged by
//! modular addition, so the outcome does not depend on the shard layout.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use varisat::CnfFormula;

use crate::cnf::{assumptions_for, at_most, Cnf, Lit, Mask, VarPool};
use crate::compound::{CompoundFunction, ModelBindings};
use crate::function::{width_mask, Function};
use crate::sat::{enumerate_projected_models, to_formula, SatError};

pub type Residue = u64;

/// One key-monomial value per stage, in stage order.
pub type KeyTuple = Vec<Mask>;

pub type ResidueMap<K> = BTreeMap<K, Residue>;

/// Boundary mask to the key polynomial accumulated on the way there.
pub type Frontier = BTreeMap<Mask, ResidueMap<KeyTuple>>;

/// `(input mask, output mask)` of the remaining stages to the key
/// polynomials of the stages consumed at the front and at the back.
type PairFrontier = BTreeMap<(Mask, Mask), ResidueMap<(KeyTuple, KeyTuple)>>;

#[derive(Debug)]
pub enum CorrelationError {
    Solver(SatError),
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl std::fmt::Display for CorrelationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrelationError::Solver(e) => write!(f, "{}", e),
            CorrelationError::ThreadPool(e) => write!(f, "could not build worker pool: {}", e),
        }
    }
}

impl std::error::Error for CorrelationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CorrelationError::Solver(e) => Some(e),
            CorrelationError::ThreadPool(e) => Some(e),
        }
    }
}

impl From<SatError> for CorrelationError {
    fn from(e: SatError) -> Self {
        CorrelationError::Solver(e)
    }
}

impl From<rayon::ThreadPoolBuildError> for CorrelationError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        CorrelationError::ThreadPool(e)
    }
}

/// Arithmetic modulo `2^bits` for `1 <= bits <= 64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modulus {
    bits: u32,
}

impl Modulus {
    pub fn new(bits: u32) -> Self {
        assert!(
            (1..=64).contains(&bits),
            "modulus exponent must be in 1..=64; got {}",
            bits
        );
        Self { bits }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn mask(&self) -> Residue {
        if self.bits == 64 {
            Residue::MAX
        } else {
            (1 << self.bits) - 1
        }
    }

    /// Reduces a signed value; negative values wrap.
    pub fn reduce(&self, value: i128) -> Residue {
        (value as u64) & self.mask()
    }

    pub fn add(&self, a: Residue, b: Residue) -> Residue {
        a.wrapping_add(b) & self.mask()
    }

    pub fn mul(&self, a: Residue, b: Residue) -> Residue {
        a.wrapping_mul(b) & self.mask()
    }
}

/// Adds `value` to `map[key]`, dropping the entry if it becomes zero.
pub fn add_residue<K: Ord>(map: &mut ResidueMap<K>, key: K, value: Residue, modulus: Modulus) {
    match map.entry(key) {
        Entry::Vacant(e) => {
            let value = value & modulus.mask();
            if value != 0 {
                e.insert(value);
            }
        }
        Entry::Occupied(mut e) => {
            let sum = modulus.add(*e.get(), value);
            if sum == 0 {
                e.remove();
            } else {
                *e.get_mut() = sum;
            }
        }
    }
}

/// Masks every residue and drops the zeros.
pub fn reduce_residues<K: Ord>(map: &mut ResidueMap<K>, modulus: Modulus) {
    map.retain(|_, r| {
        *r &= modulus.mask();
        *r != 0
    });
}

pub fn merge_residues<K: Ord>(into: &mut ResidueMap<K>, from: ResidueMap<K>, modulus: Modulus) {
    for (k, r) in from {
        add_residue(into, k, r, modulus);
    }
}

/// The product of two key polynomials over disjoint key variables: keys
/// concatenate, residues multiply.
pub fn extend_residues(
    left: &ResidueMap<KeyTuple>,
    right: &ResidueMap<KeyTuple>,
    modulus: Modulus,
) -> ResidueMap<KeyTuple> {
    let mut out = ResidueMap::new();
    for (k0, r0) in left {
        for (k1, r1) in right {
            let key: KeyTuple = k0.iter().chain(k1.iter()).copied().collect();
            add_residue(&mut out, key, modulus.mul(*r0, *r1), modulus);
        }
    }
    out
}

pub fn merge_frontiers<S: Ord, K: Ord>(
    into: &mut BTreeMap<S, ResidueMap<K>>,
    from: BTreeMap<S, ResidueMap<K>>,
    modulus: Modulus,
) {
    for (state, polynomial) in from {
        match into.entry(state) {
            Entry::Vacant(e) => {
                let mut polynomial = polynomial;
                reduce_residues(&mut polynomial, modulus);
                if !polynomial.is_empty() {
                    e.insert(polynomial);
                }
            }
            Entry::Occupied(mut e) => {
                merge_residues(e.get_mut(), polynomial, modulus);
                if e.get().is_empty() {
                    e.remove();
                }
            }
        }
    }
}

/// Joins the two frontiers at their shared masks.
pub fn intersect_frontiers(
    forward: &Frontier,
    backward: &Frontier,
    modulus: Modulus,
) -> ResidueMap<KeyTuple> {
    let mut out = ResidueMap::new();
    for (mask, f) in forward {
        if let Some(b) = backward.get(mask) {
            merge_residues(&mut out, extend_residues(f, b, modulus), modulus);
        }
    }
    out
}

/// Exact contribution of one stage for input mask, output mask and key
/// monomial. Only its value modulo `2^m` matters.
pub trait StageCorrelation: Send + Sync {
    fn correlation(&self, input: Mask, output: Mask, key: Mask) -> i128;
}

impl<F> StageCorrelation for F
where
    F: Fn(Mask, Mask, Mask) -> i128 + Send + Sync,
{
    fn correlation(&self, input: Mask, output: Mask, key: Mask) -> i128 {
        self(input, output, key)
    }
}

/// Contribution of the precursor stage, `2^{|input ^ output|}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecursorCorrelation;

impl StageCorrelation for PrecursorCorrelation {
    fn correlation(&self, input: Mask, output: Mask, _key: Mask) -> i128 {
        let distance = (input ^ output).count_ones();
        if distance >= 64 {
            // Vanishes modulo every supported modulus.
            0
        } else {
            1i128 << distance
        }
    }
}

#[derive(Clone)]
pub struct Stage {
    pub function: Arc<CompoundFunction>,
    pub correlation: Arc<dyn StageCorrelation>,
}

impl Stage {
    pub fn new(
        function: impl Into<Arc<CompoundFunction>>,
        correlation: impl StageCorrelation + 'static,
    ) -> Self {
        Self {
            function: function.into(),
            correlation: Arc::new(correlation),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Decides which frontier advances next.
pub trait DirectionPolicy: Send + Sync {
    fn choose(&self, forward_size: usize, backward_size: usize) -> Direction;
}

/// Advances the backward frontier only when it is strictly smaller.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallerFrontier;

impl DirectionPolicy for SmallerFrontier {
    fn choose(&self, forward_size: usize, backward_size: usize) -> Direction {
        if backward_size < forward_size {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }
}

/// Advances the backward side unless it holds strictly more distinct
/// masks. The default for pair propagation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackwardOnTies;

impl DirectionPolicy for BackwardOnTies {
    fn choose(&self, forward_size: usize, backward_size: usize) -> Direction {
        if backward_size <= forward_size {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedDirection(pub Direction);

impl DirectionPolicy for FixedDirection {
    fn choose(&self, _forward_size: usize, _backward_size: usize) -> Direction {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationOptions {
    /// Results are exact modulo `2^modulus_bits`.
    pub modulus_bits: u32,

    /// Prepend the precursor stage, turning the result into a subcube
    /// count instead of a single transform coefficient.
    pub precursor: bool,

    /// Threads in each step's pool.
    pub workers: usize,

    /// A step's frontier is split into `workers * shards_per_worker` shards.
    pub shards_per_worker: usize,
}

impl Default for CorrelationOptions {
    fn default() -> Self {
        Self {
            modulus_bits: 64,
            precursor: true,
            workers: num_cpus::get(),
            shards_per_worker: 8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Link {
    Precursor(usize),
    Stage(usize),
}

/// Stage models stacked in one numbering; `input_vars[i]` etc. belong to
/// the `i`-th stacked link.
#[derive(Debug)]
struct StackedModel {
    clauses: Cnf,
    input_vars: Vec<Vec<Lit>>,
    output_vars: Vec<Vec<Lit>>,
    key_vars: Vec<Vec<Lit>>,
    aux_vars: Vec<Lit>,
    pool: VarPool,
}

impl StackedModel {
    fn first_inputs(&self) -> &[Lit] {
        &self.input_vars[0]
    }

    fn last_outputs(&self) -> &[Lit] {
        &self.output_vars[self.output_vars.len() - 1]
    }
}

/// Per-bit `output ⊆ input` with weight bit `c = input ∧ ¬output`.
fn precursor_model(
    width: usize,
    pool: &mut VarPool,
) -> (Cnf, Vec<Lit>, Vec<Lit>, Vec<Lit>) {
    let inputs = pool.fresh_n(width);
    let counts = pool.fresh_n(width);
    let outputs = pool.fresh_n(width);
    let mut clauses = Cnf::new();
    for ((&i, &o), &c) in inputs.iter().zip(&outputs).zip(&counts) {
        clauses.push(vec![i, -o]);
        clauses.push(vec![-i, o, c]);
        clauses.push(vec![i, -c]);
        clauses.push(vec![-o, -c]);
    }
    (clauses, inputs, outputs, counts)
}

fn bits_to_mask(bits: &[bool]) -> Mask {
    bits.iter()
        .enumerate()
        .fold(0, |acc, (i, &b)| if b { acc | (1 << i) } else { acc })
}

pub struct CorrelationEngine {
    stages: Vec<Stage>,
    options: CorrelationOptions,
    /// Overrides the per-mode default when set.
    policy: Option<Box<dyn DirectionPolicy>>,
}

impl CorrelationEngine {
    pub fn new(stages: Vec<Stage>, options: CorrelationOptions) -> Self {
        assert!(!stages.is_empty(), "correlation engine needs at least one stage");
        for (i, pair) in stages.windows(2).enumerate() {
            assert_eq!(
                pair[0].function.output_size(),
                pair[1].function.input_size(),
                "stage {} produces {} bits but stage {} takes {}",
                i,
                pair[0].function.output_size(),
                i + 1,
                pair[1].function.input_size()
            );
        }
        assert!(options.workers >= 1, "correlation engine needs at least one worker");
        Modulus::new(options.modulus_bits);
        Self {
            stages,
            options,
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: impl DirectionPolicy + 'static) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    fn frontier_direction(&self, forward_size: usize, backward_size: usize) -> Direction {
        match &self.policy {
            Some(policy) => policy.choose(forward_size, backward_size),
            None => SmallerFrontier.choose(forward_size, backward_size),
        }
    }

    fn pair_direction(&self, input_count: usize, output_count: usize) -> Direction {
        match &self.policy {
            Some(policy) => policy.choose(input_count, output_count),
            None => BackwardOnTies.choose(input_count, output_count),
        }
    }

    pub fn options(&self) -> &CorrelationOptions {
        &self.options
    }

    fn links(&self) -> Vec<Link> {
        let mut links = Vec::with_capacity(self.stages.len() + 1);
        if self.options.precursor {
            links.push(Link::Precursor(self.stages[0].function.input_size()));
        }
        links.extend((0..self.stages.len()).map(Link::Stage));
        links
    }

    fn correlation_of(&self, link: Link) -> &dyn StageCorrelation {
        match link {
            Link::Precursor(_) => &PrecursorCorrelation,
            Link::Stage(i) => self.stages[i].correlation.as_ref(),
        }
    }

    fn check_masks(&self, u: Mask, v: Mask) {
        let input_width = self.stages[0].function.input_size();
        let output_width = self.stages[self.stages.len() - 1].function.output_size();
        assert!(
            u & !width_mask(input_width) == 0,
            "input mask {:#x} is wider than {} bits",
            u,
            input_width
        );
        assert!(
            v & !width_mask(output_width) == 0,
            "output mask {:#x} is wider than {} bits",
            v,
            output_width
        );
    }

    fn build_stacked(&self, links: &[Link]) -> StackedModel {
        let mut pool = VarPool::new();
        let mut model = StackedModel {
            clauses: Cnf::new(),
            input_vars: Vec::with_capacity(links.len()),
            output_vars: Vec::with_capacity(links.len()),
            key_vars: Vec::with_capacity(links.len()),
            aux_vars: Vec::new(),
            pool: VarPool::new(),
        };
        for &link in links {
            match link {
                Link::Precursor(width) => {
                    let (clauses, inputs, outputs, counts) = precursor_model(width, &mut pool);
                    model.clauses.extend(clauses);
                    model.input_vars.push(inputs);
                    model.output_vars.push(outputs);
                    model.key_vars.push(Vec::new());
                    model.aux_vars.extend(counts);
                }
                Link::Stage(i) => {
                    let previous = model.output_vars.last().cloned();
                    let bindings = ModelBindings {
                        input_vars: previous.as_deref(),
                        ..Default::default()
                    };
                    let e = self.stages[i].function.embed_ut_model(&mut pool, &bindings);
                    model.clauses.extend(e.clauses);
                    model.input_vars.push(e.input_vars);
                    model.output_vars.push(e.output_vars);
                    model.key_vars.push(e.key_vars);
                    model.aux_vars.extend(e.aux_vars);
                }
            }
        }
        model.pool = pool;
        log::debug!(
            "stacked {} links: {} clauses, {} variables, {} weight bits",
            links.len(),
            model.clauses.len(),
            model.pool.top(),
            model.aux_vars.len()
        );
        model
    }

    /// Runs `job` over strided shards of `states` on a pool that lives for
    /// this call only.
    fn run_sharded<'s, S, T, F>(&self, states: &'s [S], job: F) -> Result<Vec<T>, CorrelationError>
    where
        S: Sync,
        T: Send,
        F: Fn(&[&'s S]) -> Result<T, SatError> + Sync,
    {
        let shard_count = (self.options.workers * self.options.shards_per_worker).max(1);
        let shards: Vec<Vec<&'s S>> = (0..shard_count)
            .map(|i| states.iter().skip(i).step_by(shard_count).collect())
            .collect();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .build()?;
        let results = pool.install(|| {
            shards
                .par_iter()
                .map(|shard| job(shard.as_slice()))
                .collect::<Result<Vec<T>, SatError>>()
        })?;
        Ok(results)
    }

    /// Computes the key polynomial of the correlation from `u` to `v`.
    ///
    /// Without the precursor the result is the integer ANF coefficient of
    /// `x^u` in `F(x)^v`; with it the result is `Σ_{x ⊆ u} [F(x) ⊇ v]`. Both
    /// are taken modulo `2^modulus_bits` and expanded over the key
    /// monomials, one entry per stage in the key tuple.
    pub fn compute(&self, u: Mask, v: Mask) -> Result<ResidueMap<KeyTuple>, CorrelationError> {
        self.check_masks(u, v);
        let modulus = Modulus::new(self.options.modulus_bits);
        let links = self.links();
        let mut stacked = self.build_stacked(&links);

        let mut clauses = std::mem::take(&mut stacked.clauses);
        clauses.extend(at_most(
            &stacked.aux_vars,
            (modulus.bits() - 1) as usize,
            &mut stacked.pool,
        ));
        for lit in assumptions_for(stacked.first_inputs(), u)
            .into_iter()
            .chain(assumptions_for(stacked.last_outputs(), v))
        {
            clauses.push(vec![lit]);
        }
        let formula = to_formula(&clauses);

        let mut forward: Frontier = BTreeMap::from([(u, ResidueMap::from([(KeyTuple::new(), 1)]))]);
        let mut backward: Frontier = BTreeMap::from([(v, ResidueMap::from([(KeyTuple::new(), 1)]))]);
        let (mut fi, mut bi) = (0, links.len());
        while fi != bi {
            if forward.is_empty() || backward.is_empty() {
                log::info!("frontier emptied with {} links left", bi - fi);
                return Ok(ResidueMap::new());
            }
            let start = Instant::now();
            match self.frontier_direction(forward.len(), backward.len()) {
                Direction::Backward => {
                    bi -= 1;
                    backward = self.propagate_step(
                        &formula,
                        &stacked.output_vars[bi],
                        &stacked.input_vars[bi],
                        &stacked.key_vars[bi],
                        self.correlation_of(links[bi]),
                        &backward,
                        Direction::Backward,
                        modulus,
                    )?;
                    log::info!(
                        "backward step through link {}: {} masks after {:?}",
                        bi,
                        backward.len(),
                        start.elapsed()
                    );
                }
                Direction::Forward => {
                    forward = self.propagate_step(
                        &formula,
                        &stacked.input_vars[fi],
                        &stacked.output_vars[fi],
                        &stacked.key_vars[fi],
                        self.correlation_of(links[fi]),
                        &forward,
                        Direction::Forward,
                        modulus,
                    )?;
                    log::info!(
                        "forward step through link {}: {} masks after {:?}",
                        fi,
                        forward.len(),
                        start.elapsed()
                    );
                    fi += 1;
                }
            }
        }
        Ok(intersect_frontiers(&forward, &backward, modulus))
    }

    #[allow(clippy::too_many_arguments)]
    fn propagate_step(
        &self,
        formula: &CnfFormula,
        fixed_vars: &[Lit],
        enum_vars: &[Lit],
        key_vars: &[Lit],
        correlation: &dyn StageCorrelation,
        frontier: &Frontier,
        direction: Direction,
        modulus: Modulus,
    ) -> Result<Frontier, CorrelationError> {
        let projection: Vec<Lit> = enum_vars.iter().chain(key_vars).copied().collect();
        let states: Vec<(&Mask, &ResidueMap<KeyTuple>)> = frontier.iter().collect();
        let partials = self.run_sharded(&states, |shard| {
            let mut out = Frontier::new();
            for &&(x, polynomial) in shard {
                let assumptions = assumptions_for(fixed_vars, *x);
                for model in enumerate_projected_models(formula, &[], &assumptions, &projection)? {
                    let (y_bits, k_bits) = model.values.split_at(enum_vars.len());
                    let y = bits_to_mask(y_bits);
                    let k = bits_to_mask(k_bits);
                    let c = match direction {
                        Direction::Forward => correlation.correlation(*x, y, k),
                        Direction::Backward => correlation.correlation(y, *x, k),
                    };
                    let c = modulus.reduce(c);
                    if c == 0 {
                        continue;
                    }
                    let single = ResidueMap::from([(vec![k], c)]);
                    let extended = match direction {
                        Direction::Forward => extend_residues(polynomial, &single, modulus),
                        Direction::Backward => extend_residues(&single, polynomial, modulus),
                    };
                    merge_frontiers(&mut out, BTreeMap::from([(y, extended)]), modulus);
                }
            }
            Ok(out)
        })?;
        let mut merged = Frontier::new();
        for partial in partials {
            merge_frontiers(&mut merged, partial, modulus);
        }
        Ok(merged)
    }

    /// Same result as [`compute`](Self::compute), propagating `(input, output)`
    /// mask pairs of the remaining stages.
    ///
    /// The formula is rebuilt over the remaining stages every step, and each
    /// pair's enumeration is bounded by the weight its polynomial has already
    /// accumulated.
    pub fn compute_pairwise(
        &self,
        u: Mask,
        v: Mask,
    ) -> Result<ResidueMap<KeyTuple>, CorrelationError> {
        self.check_masks(u, v);
        let modulus = Modulus::new(self.options.modulus_bits);
        let links = self.links();

        let mut states: PairFrontier = BTreeMap::from([(
            (u, v),
            ResidueMap::from([((KeyTuple::new(), KeyTuple::new()), 1)]),
        )]);
        let (mut fi, mut bi) = (0, links.len());
        while fi != bi && !states.is_empty() {
            let start = Instant::now();
            let stacked = self.build_stacked(&links[fi..bi]);
            let formula = to_formula(&stacked.clauses);
            let inputs: BTreeSet<Mask> = states.keys().map(|&(a, _)| a).collect();
            let outputs: BTreeSet<Mask> = states.keys().map(|&(_, b)| b).collect();
            let direction = self.pair_direction(inputs.len(), outputs.len());
            let (local, link) = match direction {
                Direction::Backward => {
                    bi -= 1;
                    (stacked.input_vars.len() - 1, links[bi])
                }
                Direction::Forward => {
                    fi += 1;
                    (0, links[fi - 1])
                }
            };
            let enum_vars = match direction {
                Direction::Backward => &stacked.input_vars[local],
                Direction::Forward => &stacked.output_vars[local],
            };
            states = self.propagate_pairs(
                &formula,
                &stacked,
                enum_vars,
                &stacked.key_vars[local],
                self.correlation_of(link),
                &states,
                direction,
                modulus,
            )?;
            log::info!(
                "{:?} pair step: {} pairs after {:?}, {} links left",
                direction,
                states.len(),
                start.elapsed(),
                bi - fi
            );
        }

        let mut result = ResidueMap::new();
        for (_, polynomial) in states {
            for ((front, back), r) in polynomial {
                let key: KeyTuple = front.into_iter().chain(back).collect();
                add_residue(&mut result, key, r, modulus);
            }
        }
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn propagate_pairs(
        &self,
        formula: &CnfFormula,
        stacked: &StackedModel,
        enum_vars: &[Lit],
        key_vars: &[Lit],
        correlation: &dyn StageCorrelation,
        states: &PairFrontier,
        direction: Direction,
        modulus: Modulus,
    ) -> Result<PairFrontier, CorrelationError> {
        let projection: Vec<Lit> = enum_vars.iter().chain(key_vars).copied().collect();
        let entries: Vec<(&(Mask, Mask), &ResidueMap<(KeyTuple, KeyTuple)>)> = states.iter().collect();
        let partials = self.run_sharded(&entries, |shard| {
            let mut out = PairFrontier::new();
            for &&(&(a, b), polynomial) in shard {
                let mut assumptions = assumptions_for(stacked.first_inputs(), a);
                assumptions.extend(assumptions_for(stacked.last_outputs(), b));
                // Weight already spent on the way to this pair.
                let spent = polynomial
                    .values()
                    .map(|r| r.trailing_zeros())
                    .min()
                    .unwrap_or(0);
                let mut pool = stacked.pool.clone();
                let bound = at_most(
                    &stacked.aux_vars,
                    (modulus.bits() - 1 - spent) as usize,
                    &mut pool,
                );
                for model in enumerate_projected_models(formula, &bound, &assumptions, &projection)? {
                    let (x_bits, k_bits) = model.values.split_at(enum_vars.len());
                    let x = bits_to_mask(x_bits);
                    let k = bits_to_mask(k_bits);
                    let (c, next) = match direction {
                        Direction::Forward => (correlation.correlation(a, x, k), (x, b)),
                        Direction::Backward => (correlation.correlation(x, b, k), (a, x)),
                    };
                    let c = modulus.reduce(c);
                    if c == 0 {
                        continue;
                    }
                    let entry = out.entry(next).or_default();
                    for ((front, back), r) in polynomial {
                        let key = match direction {
                            Direction::Forward => {
                                let mut front = front.clone();
                                front.push(k);
                                (front, back.clone())
                            }
                            Direction::Backward => {
                                let mut extended = Vec::with_capacity(back.len() + 1);
                                extended.push(k);
                                extended.extend(back.iter().copied());
                                (front.clone(), extended)
                            }
                        };
                        add_residue(entry, key, modulus.mul(c, *r), modulus);
                    }
                }
            }
            out.retain(|_, polynomial| !polynomial.is_empty());
            Ok(out)
        })?;
        let mut merged = PairFrontier::new();
        for partial in partials {
            merge_frontiers(&mut merged, partial, modulus);
        }
        Ok(merged)
    }
}
