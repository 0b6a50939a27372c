// SPDX-License-Identifier: Apache-2.0

//! Primitive components and their memoized propagation models.
//!
//! Structural kinds carry hand-derived parity models; everything else goes
//! through the truth-table path in `prop_models`. Models are computed on
//! first use and shared afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::cnf::{Clause, Cnf, Lit, Mask};
use crate::function::{width_mask, Function};
use crate::minimize::MinimizeOptions;
use crate::prop_models::{compute_parity_model, compute_weight_model, WeightCnf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentKind {
    /// Substitution table indexed by the input value.
    Lookup(Vec<Mask>),
    /// One input fanned out to every output.
    Copy,
    /// Parity of all inputs.
    Xor,
    Identity,
    /// Consumes one wire, produces nothing.
    Sink,
    /// `x ^ k` where input wire 1 carries the key bit.
    AddKey,
    /// `(x0, x0 ^ x1)`.
    DuplicateXor,
    /// Models injected from outside; evaluates to zero.
    Opaque { weight: WeightCnf, parity: Cnf },
}

#[derive(Debug)]
pub struct Component {
    name: String,
    input_size: usize,
    output_size: usize,
    kind: ComponentKind,
    options: MinimizeOptions,
    parity_models: Mutex<HashMap<(Mask, Mask), Arc<Cnf>>>,
    weight_model: OnceCell<WeightCnf>,
}

impl Component {
    fn new(name: String, input_size: usize, output_size: usize, kind: ComponentKind) -> Self {
        Self {
            name,
            input_size,
            output_size,
            kind,
            options: MinimizeOptions::default(),
            parity_models: Mutex::new(HashMap::new()),
            weight_model: OnceCell::new(),
        }
    }

    pub fn lookup(name: &str, input_size: usize, output_size: usize, table: Vec<Mask>) -> Self {
        assert_eq!(
            table.len(),
            1usize << input_size,
            "lookup component {:?} needs {} table entries; got {}",
            name,
            1usize << input_size,
            table.len()
        );
        let limit = width_mask(output_size);
        if let Some(bad) = table.iter().find(|&&y| y & !limit != 0) {
            panic!(
                "lookup component {:?}: entry {:#x} does not fit in {} output bits",
                name, bad, output_size
            );
        }
        Self::new(
            name.to_string(),
            input_size,
            output_size,
            ComponentKind::Lookup(table),
        )
    }

    pub fn copy(n: usize) -> Self {
        assert!(n >= 1, "copy component needs at least one output");
        Self::new(format!("copy{}", n), 1, n, ComponentKind::Copy)
    }

    pub fn xor(n: usize) -> Self {
        assert!(n >= 1, "xor component needs at least one input");
        Self::new(format!("xor{}", n), n, 1, ComponentKind::Xor)
    }

    pub fn identity(n: usize) -> Self {
        Self::new(format!("id{}", n), n, n, ComponentKind::Identity)
    }

    pub fn sink() -> Self {
        Self::new("sink".to_string(), 1, 0, ComponentKind::Sink)
    }

    pub fn add_key() -> Self {
        Self::new("add_key".to_string(), 2, 1, ComponentKind::AddKey)
    }

    pub fn duplicate_xor() -> Self {
        Self::new("duplicate_xor".to_string(), 2, 2, ComponentKind::DuplicateXor)
    }

    /// A component defined only by its weight model, over the variables
    /// `inputs, outputs, aux` with `aux_count` auxiliary bits.
    ///
    /// Its parity model keeps the weight clauses that do not require an
    /// auxiliary bit to be clear, with the auxiliary literals removed.
    pub fn opaque(
        name: &str,
        input_size: usize,
        output_size: usize,
        weight_clauses: Cnf,
        aux_count: usize,
    ) -> Self {
        let io = (input_size + output_size) as Lit;
        let limit = io + aux_count as Lit;
        for clause in &weight_clauses {
            for &l in clause {
                assert!(
                    l != 0 && l.abs() <= limit,
                    "opaque component {:?}: literal {} outside 1..={}",
                    name,
                    l,
                    limit
                );
            }
        }
        let parity: Cnf = weight_clauses
            .iter()
            .filter(|clause| clause.iter().all(|&l| l >= -io))
            .map(|clause| clause.iter().copied().filter(|&l| l <= io).collect())
            .collect();
        Self::new(
            name.to_string(),
            input_size,
            output_size,
            ComponentKind::Opaque {
                weight: WeightCnf {
                    clauses: weight_clauses,
                    aux_count,
                },
                parity,
            },
        )
    }

    pub fn with_options(mut self, options: MinimizeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    /// Parity model for the given activation masks, over the variables
    /// `1..=input_size + output_size`.
    pub fn parity_model(&self, input_mask: Mask, output_mask: Mask) -> Arc<Cnf> {
        let key = (
            input_mask & width_mask(self.input_size),
            output_mask & width_mask(self.output_size),
        );
        if let Some(model) = self.parity_models.lock().unwrap().get(&key) {
            return model.clone();
        }
        let model = Arc::new(self.compute_parity_model(key.0, key.1));
        self.parity_models
            .lock()
            .unwrap()
            .entry(key)
            .or_insert(model)
            .clone()
    }

    fn compute_parity_model(&self, input_mask: Mask, output_mask: Mask) -> Cnf {
        log::debug!(
            "computing parity model of {} for masks ({:#x}, {:#x})",
            self.name,
            input_mask,
            output_mask
        );
        match &self.kind {
            ComponentKind::Xor => xor_parity_model(self.input_size, input_mask | output_mask != 0),
            ComponentKind::AddKey => xor_parity_model(2, false),
            ComponentKind::Identity => identity_parity_model(self.input_size, input_mask | output_mask),
            ComponentKind::Sink => vec![vec![-1]],
            ComponentKind::Opaque { parity, .. } => parity.clone(),
            ComponentKind::Lookup(_) | ComponentKind::Copy | ComponentKind::DuplicateXor => {
                compute_parity_model(self, input_mask, output_mask, &self.options)
            }
        }
    }

    /// Weight model over `inputs, outputs, aux`.
    pub fn weight_model(&self) -> &WeightCnf {
        self.weight_model.get_or_init(|| match &self.kind {
            ComponentKind::Identity => WeightCnf {
                clauses: identity_parity_model(self.input_size, 0),
                aux_count: 0,
            },
            ComponentKind::Opaque { weight, .. } => weight.clone(),
            _ => compute_weight_model(self, &self.options),
        })
    }

    pub fn aux_count(&self) -> usize {
        self.weight_model().aux_count
    }
}

impl Function for Component {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn evaluate(&self, x: Mask) -> Mask {
        let x = x & width_mask(self.input_size);
        match &self.kind {
            ComponentKind::Lookup(table) => table[x as usize],
            ComponentKind::Copy => {
                if x & 1 == 1 {
                    width_mask(self.output_size)
                } else {
                    0
                }
            }
            ComponentKind::Xor => (x.count_ones() & 1) as Mask,
            ComponentKind::Identity => x,
            ComponentKind::Sink | ComponentKind::Opaque { .. } => 0,
            ComponentKind::AddKey => (x & 1) ^ (x >> 1),
            ComponentKind::DuplicateXor => {
                let x0 = x & 1;
                let x1 = x >> 1;
                ((x0 ^ x1) << 1) | x0
            }
        }
    }
}

/// At most one input active, any active input activates the output, and
/// unless some wire is activated externally the output needs an active input.
fn xor_parity_model(n: usize, activated: bool) -> Cnf {
    let inputs: Vec<Lit> = (1..=n as Lit).collect();
    let output = n as Lit + 1;
    let mut cnf = Cnf::new();
    for (i, &a) in inputs.iter().enumerate() {
        for &b in &inputs[i + 1..] {
            cnf.push(vec![-a, -b]);
        }
    }
    for &x in &inputs {
        cnf.push(vec![-x, output]);
    }
    if !activated {
        let mut clause: Clause = inputs.clone();
        clause.push(-output);
        cnf.push(clause);
    }
    cnf
}

/// Input `i` implies output `i`; the converse holds for bits outside
/// `activation`.
fn identity_parity_model(n: usize, activation: Mask) -> Cnf {
    let mut cnf = Cnf::new();
    for i in 0..n {
        let x = i as Lit + 1;
        let y = (i + n) as Lit + 1;
        cnf.push(vec![-x, y]);
        if (activation >> i) & 1 == 0 {
            cnf.push(vec![x, -y]);
        }
    }
    cnf
}
