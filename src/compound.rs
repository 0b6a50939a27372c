// SPDX-License-Identifier: Apache-2.0

//! Circuits built by wiring components (and other circuits) into a DAG.
//!
//! Components get increasing ids as they are added and every connection runs
//! from a lower id to a higher one, so id order is evaluation order. The
//! circuit boundary is addressed like any component: `INPUT` produces the
//! circuit inputs, `OUTPUT` consumes the circuit outputs.
//!
//! Basic example usage:
//! ```
//! use maskprop::compound::{CompoundFunction, INPUT, OUTPUT};
//! use maskprop::library::ComponentLibrary;
//!
//! let lib = ComponentLibrary::new();
//! let mut f = CompoundFunction::new(1, 1);
//! let x = f.add_component(lib.xor(2));
//! f.connect_components(INPUT, 0, x, 0);
//! f.connect_to_key(x, 1);
//! f.connect_components(x, 0, OUTPUT, 0);
//! assert_eq!(f.simulate(0b1, 0b1), 0b0);
//!
//! let model = f.to_model();
//! assert_eq!(model.key_vars.len(), 1);
//! ```
//!
//! The propagation models give every wire one variable: a producer's output
//! variable is the consumer's input variable.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::cnf::{Clause, Cnf, Lit, Mask, VarMap, VarPool};
use crate::component::Component;
use crate::function::{width_mask, Function};

pub type ComponentId = usize;

/// The record producing the circuit inputs.
pub const INPUT: ComponentId = 0;

/// The record consuming the circuit outputs.
pub const OUTPUT: ComponentId = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireSource {
    Component { id: ComponentId, wire: usize },
    /// Key bit, numbered in the order keys were connected.
    Key(usize),
}

/// A wiring-graph node.
#[derive(Debug, Clone)]
pub enum Element {
    Primitive(Arc<Component>),
    Compound(Arc<CompoundFunction>),
}

impl From<Arc<Component>> for Element {
    fn from(c: Arc<Component>) -> Self {
        Element::Primitive(c)
    }
}

impl From<Component> for Element {
    fn from(c: Component) -> Self {
        Element::Primitive(Arc::new(c))
    }
}

impl From<Arc<CompoundFunction>> for Element {
    fn from(f: Arc<CompoundFunction>) -> Self {
        Element::Compound(f)
    }
}

impl From<CompoundFunction> for Element {
    fn from(f: CompoundFunction) -> Self {
        Element::Compound(Arc::new(f))
    }
}

/// A model in an element's own numbering `1..=var_count`.
#[derive(Debug)]
pub struct LocalModel<'a> {
    pub clauses: &'a [Clause],
    pub var_count: usize,
    pub input_vars: &'a [Lit],
    pub output_vars: &'a [Lit],
    pub aux_vars: &'a [Lit],
}

impl Element {
    pub fn input_size(&self) -> usize {
        match self {
            Element::Primitive(c) => c.input_size(),
            Element::Compound(f) => f.input_size(),
        }
    }

    pub fn output_size(&self) -> usize {
        match self {
            Element::Primitive(c) => c.output_size(),
            Element::Compound(f) => f.output_size(),
        }
    }

    pub fn evaluate(&self, x: Mask) -> Mask {
        match self {
            Element::Primitive(c) => c.evaluate(x),
            Element::Compound(f) => f.evaluate(x),
        }
    }

    pub fn aux_count(&self) -> usize {
        match self {
            Element::Primitive(c) => c.aux_count(),
            Element::Compound(f) => f.to_ut_model().aux_vars.len(),
        }
    }

    /// Calls `f` with the element's parity model. Activation masks only
    /// apply to primitives.
    pub fn with_parity_model<R>(
        &self,
        input_mask: Mask,
        output_mask: Mask,
        f: impl FnOnce(&LocalModel<'_>) -> R,
    ) -> R {
        match self {
            Element::Primitive(c) => {
                let clauses = c.parity_model(input_mask, output_mask);
                let (inputs, outputs) = primitive_io_vars(c);
                f(&LocalModel {
                    clauses: &clauses,
                    var_count: c.input_size() + c.output_size(),
                    input_vars: &inputs,
                    output_vars: &outputs,
                    aux_vars: &[],
                })
            }
            Element::Compound(g) => {
                let m = g.to_model();
                f(&LocalModel {
                    clauses: &m.clauses,
                    var_count: m.n_vars,
                    input_vars: &m.input_vars,
                    output_vars: &m.output_vars,
                    aux_vars: &[],
                })
            }
        }
    }

    /// Calls `f` with the element's weight model.
    pub fn with_weight_model<R>(&self, f: impl FnOnce(&LocalModel<'_>) -> R) -> R {
        match self {
            Element::Primitive(c) => {
                let w = c.weight_model();
                let (inputs, outputs) = primitive_io_vars(c);
                let io = (c.input_size() + c.output_size()) as Lit;
                let aux: Vec<Lit> = (io + 1..=io + w.aux_count as Lit).collect();
                f(&LocalModel {
                    clauses: &w.clauses,
                    var_count: io as usize + w.aux_count,
                    input_vars: &inputs,
                    output_vars: &outputs,
                    aux_vars: &aux,
                })
            }
            Element::Compound(g) => {
                let m = g.to_ut_model();
                f(&LocalModel {
                    clauses: &m.clauses,
                    var_count: m.n_vars,
                    input_vars: &m.input_vars,
                    output_vars: &m.output_vars,
                    aux_vars: &m.aux_vars,
                })
            }
        }
    }
}

fn primitive_io_vars(c: &Component) -> (Vec<Lit>, Vec<Lit>) {
    let n = c.input_size() as Lit;
    let m = c.output_size() as Lit;
    ((1..=n).collect(), (n + 1..=n + m).collect())
}

#[derive(Debug, Clone)]
struct ComponentRecord {
    element: Element,
    inputs: Vec<Option<WireSource>>,
    outputs: Vec<Option<(ComponentId, usize)>>,
    input_key_mask: Mask,
    output_key_mask: Mask,
}

/// The circuit's parity model in its own numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParityModel {
    pub clauses: Cnf,
    pub input_vars: Vec<Lit>,
    pub output_vars: Vec<Lit>,
    pub key_vars: Vec<Lit>,
    /// Number of variables in the numbering, `1..=n_vars`.
    pub n_vars: usize,
    element_maps: Vec<VarMap>,
    ties: Cnf,
}

/// The circuit's weight model; numbering extends the parity model's with
/// the auxiliary weight bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightModel {
    pub clauses: Cnf,
    pub input_vars: Vec<Lit>,
    pub output_vars: Vec<Lit>,
    pub key_vars: Vec<Lit>,
    pub aux_vars: Vec<Lit>,
    pub n_vars: usize,
}

/// Outer variables to reuse when embedding a model; `None` allocates fresh
/// ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelBindings<'a> {
    pub input_vars: Option<&'a [Lit]>,
    pub output_vars: Option<&'a [Lit]>,
    pub key_vars: Option<&'a [Lit]>,
    pub aux_vars: Option<&'a [Lit]>,
}

/// A model translated into a caller's numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedModel {
    pub clauses: Cnf,
    pub input_vars: Vec<Lit>,
    pub output_vars: Vec<Lit>,
    pub key_vars: Vec<Lit>,
    pub aux_vars: Vec<Lit>,
}

#[derive(Debug)]
pub struct CompoundFunction {
    input_size: usize,
    output_size: usize,
    input_consumers: Vec<Option<(ComponentId, usize)>>,
    components: Vec<ComponentRecord>,
    output_sources: Vec<Option<WireSource>>,
    key_bits: usize,
    parity: OnceCell<ParityModel>,
    weight: OnceCell<WeightModel>,
}

impl CompoundFunction {
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Self {
            input_size,
            output_size,
            input_consumers: vec![None; input_size],
            components: Vec::new(),
            output_sources: vec![None; output_size],
            key_bits: 0,
            parity: OnceCell::new(),
            weight: OnceCell::new(),
        }
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn key_bit_count(&self) -> usize {
        self.key_bits
    }

    pub fn element(&self, id: ComponentId) -> &Element {
        &self.record(id).element
    }

    fn invalidate(&mut self) {
        self.parity = OnceCell::new();
        self.weight = OnceCell::new();
    }

    fn record(&self, id: ComponentId) -> &ComponentRecord {
        assert!(
            id != INPUT && id != OUTPUT && id <= self.components.len(),
            "unknown component id {}; have {} components",
            id,
            self.components.len()
        );
        &self.components[id - 1]
    }

    fn record_mut(&mut self, id: ComponentId) -> &mut ComponentRecord {
        self.record(id);
        &mut self.components[id - 1]
    }

    /// Appends `element` and returns its id. Nested circuits must not bind
    /// key bits of their own.
    pub fn add_component(&mut self, element: impl Into<Element>) -> ComponentId {
        let element = element.into();
        if let Element::Compound(f) = &element {
            assert_eq!(
                f.key_bit_count(),
                0,
                "nested compound binds {} key bits; nested circuits must be keyless",
                f.key_bit_count()
            );
        }
        self.components.push(ComponentRecord {
            inputs: vec![None; element.input_size()],
            outputs: vec![None; element.output_size()],
            element,
            input_key_mask: 0,
            output_key_mask: 0,
        });
        self.invalidate();
        self.components.len()
    }

    fn producer_slot(&mut self, id: ComponentId, wire: usize) -> &mut Option<(ComponentId, usize)> {
        let slots = if id == INPUT {
            &mut self.input_consumers
        } else {
            &mut self.record_mut(id).outputs
        };
        let available = slots.len();
        assert!(
            wire < available,
            "output wire {} out of range for component {} with {} outputs",
            wire,
            id,
            available
        );
        &mut slots[wire]
    }

    fn consumer_slot(&mut self, id: ComponentId, wire: usize) -> &mut Option<WireSource> {
        let slots = if id == OUTPUT {
            &mut self.output_sources
        } else {
            &mut self.record_mut(id).inputs
        };
        let available = slots.len();
        assert!(
            wire < available,
            "input wire {} out of range for component {} with {} inputs",
            wire,
            id,
            available
        );
        &mut slots[wire]
    }

    /// Connects output `from_wire` of `from` to input `to_wire` of `to`.
    pub fn connect_components(
        &mut self,
        from: ComponentId,
        from_wire: usize,
        to: ComponentId,
        to_wire: usize,
    ) {
        assert!(
            from < to,
            "connection {} -> {} runs against evaluation order",
            from,
            to
        );
        let producer = *self.producer_slot(from, from_wire);
        assert!(
            producer.is_none(),
            "output wire {} of component {} is already connected to {:?}",
            from_wire,
            from,
            producer
        );
        let consumer = *self.consumer_slot(to, to_wire);
        assert!(
            consumer.is_none(),
            "input wire {} of component {} is already driven by {:?}",
            to_wire,
            to,
            consumer
        );
        *self.producer_slot(from, from_wire) = Some((to, to_wire));
        *self.consumer_slot(to, to_wire) = Some(WireSource::Component {
            id: from,
            wire: from_wire,
        });
        self.invalidate();
    }

    /// Drives input `to_wire` of `to` with a new key bit; returns the key
    /// bit's index.
    pub fn connect_to_key(&mut self, to: ComponentId, to_wire: usize) -> usize {
        let index = self.key_bits;
        let consumer = self.consumer_slot(to, to_wire);
        assert!(
            consumer.is_none(),
            "input wire {} of component {} is already driven by {:?}",
            to_wire,
            to,
            consumer
        );
        *consumer = Some(WireSource::Key(index));
        self.key_bits += 1;
        self.invalidate();
        index
    }

    /// Sets the activation masks handed to a primitive's parity model.
    pub fn set_activation_masks(&mut self, id: ComponentId, input_mask: Mask, output_mask: Mask) {
        let record = self.record_mut(id);
        record.input_key_mask = input_mask;
        record.output_key_mask = output_mask;
        self.invalidate();
    }

    /// Evaluates the circuit component by component in id order.
    pub fn simulate(&self, x: Mask, key: Mask) -> Mask {
        let mut values: Vec<Mask> = Vec::with_capacity(self.components.len() + 1);
        values.push(x & width_mask(self.input_size));
        for (i, record) in self.components.iter().enumerate() {
            let input = gather(&record.inputs, &values, key, i + 1);
            values.push(record.element.evaluate(input));
        }
        gather(&self.output_sources, &values, key, OUTPUT)
    }

    fn check_complete(&self) {
        for (wire, consumer) in self.input_consumers.iter().enumerate() {
            assert!(consumer.is_some(), "circuit input {} is never consumed", wire);
        }
        for (i, record) in self.components.iter().enumerate() {
            for (wire, source) in record.inputs.iter().enumerate() {
                assert!(
                    source.is_some(),
                    "input wire {} of component {} is not connected",
                    wire,
                    i + 1
                );
            }
            for (wire, consumer) in record.outputs.iter().enumerate() {
                assert!(
                    consumer.is_some(),
                    "output wire {} of component {} is never consumed",
                    wire,
                    i + 1
                );
            }
        }
        for (wire, source) in self.output_sources.iter().enumerate() {
            assert!(source.is_some(), "circuit output {} is not connected", wire);
        }
    }

    /// The memoized parity model.
    pub fn to_model(&self) -> &ParityModel {
        self.parity.get_or_init(|| self.build_parity_model())
    }

    /// The memoized weight model. Builds the parity model first.
    pub fn to_ut_model(&self) -> &WeightModel {
        self.weight.get_or_init(|| self.build_weight_model())
    }

    fn build_parity_model(&self) -> ParityModel {
        self.check_complete();
        let mut pool = VarPool::new();
        let key_vars = pool.fresh_n(self.key_bits);
        let input_vars = pool.fresh_n(self.input_size);
        let mut wire_vars: Vec<Vec<Lit>> = Vec::with_capacity(self.components.len() + 1);
        wire_vars.push(input_vars.clone());

        let mut clauses = Cnf::new();
        let mut ties = Cnf::new();
        let mut element_maps = Vec::with_capacity(self.components.len());
        for record in &self.components {
            let inputs: Vec<Lit> = record
                .inputs
                .iter()
                .map(|s| source_var(s, &wire_vars, &key_vars))
                .collect();
            let (outputs, map) = record.element.with_parity_model(
                record.input_key_mask,
                record.output_key_mask,
                |local| {
                    let mut map = VarMap::new(local.var_count);
                    for (&l, &g) in local.input_vars.iter().zip(&inputs) {
                        if let Some(tie) = map.bind(l, g) {
                            ties.extend(tie);
                        }
                    }
                    let outputs: Vec<Lit> = local
                        .output_vars
                        .iter()
                        .map(|&l| map.get_or_fresh(l, &mut pool))
                        .collect();
                    map.fill_fresh(&mut pool);
                    clauses.extend(local.clauses.iter().map(|c| map.map_clause(c)));
                    (outputs, map)
                },
            );
            wire_vars.push(outputs);
            element_maps.push(map);
        }
        let output_vars: Vec<Lit> = self
            .output_sources
            .iter()
            .map(|s| source_var(s, &wire_vars, &key_vars))
            .collect();
        clauses.extend(ties.iter().cloned());
        log::debug!(
            "built parity model: {} components, {} clauses, {} variables",
            self.components.len(),
            clauses.len(),
            pool.top()
        );
        ParityModel {
            clauses,
            input_vars,
            output_vars,
            key_vars,
            n_vars: pool.top() as usize,
            element_maps,
            ties,
        }
    }

    fn build_weight_model(&self) -> WeightModel {
        let parity = self.to_model();
        let mut pool = VarPool::starting_after(parity.n_vars as Lit);
        let mut clauses = Cnf::new();
        let mut aux_vars = Vec::new();
        for (record, parity_map) in self.components.iter().zip(&parity.element_maps) {
            record.element.with_weight_model(|local| {
                let mut map = parity_map.clone();
                map.grow(local.var_count);
                aux_vars.extend(local.aux_vars.iter().map(|&l| map.get_or_fresh(l, &mut pool)));
                map.fill_fresh(&mut pool);
                clauses.extend(local.clauses.iter().map(|c| map.map_clause(c)));
            });
        }
        clauses.extend(parity.ties.iter().cloned());
        log::debug!(
            "built weight model: {} clauses, {} aux variables",
            clauses.len(),
            aux_vars.len()
        );
        WeightModel {
            clauses,
            input_vars: parity.input_vars.clone(),
            output_vars: parity.output_vars.clone(),
            key_vars: parity.key_vars.clone(),
            aux_vars,
            n_vars: pool.top() as usize,
        }
    }

    /// Copies the parity model into `pool`'s numbering.
    pub fn embed_model(&self, pool: &mut VarPool, bindings: &ModelBindings<'_>) -> EmbeddedModel {
        assert!(
            bindings.aux_vars.map_or(true, |a| a.is_empty()),
            "the parity model has no auxiliary variables to bind"
        );
        let m = self.to_model();
        embed(
            &m.clauses,
            m.n_vars,
            [
                (m.input_vars.as_slice(), bindings.input_vars),
                (m.output_vars.as_slice(), bindings.output_vars),
                (m.key_vars.as_slice(), bindings.key_vars),
                (&[][..], None),
            ],
            pool,
        )
    }

    /// Copies the weight model into `pool`'s numbering.
    pub fn embed_ut_model(&self, pool: &mut VarPool, bindings: &ModelBindings<'_>) -> EmbeddedModel {
        let m = self.to_ut_model();
        embed(
            &m.clauses,
            m.n_vars,
            [
                (m.input_vars.as_slice(), bindings.input_vars),
                (m.output_vars.as_slice(), bindings.output_vars),
                (m.key_vars.as_slice(), bindings.key_vars),
                (m.aux_vars.as_slice(), bindings.aux_vars),
            ],
            pool,
        )
    }
}

impl Function for CompoundFunction {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    /// Evaluates with every key bit clear.
    fn evaluate(&self, x: Mask) -> Mask {
        self.simulate(x, 0)
    }
}

fn gather(sources: &[Option<WireSource>], values: &[Mask], key: Mask, consumer: ComponentId) -> Mask {
    sources.iter().enumerate().fold(0, |acc, (j, source)| {
        let bit = match source {
            Some(WireSource::Key(i)) => (key >> i) & 1,
            Some(WireSource::Component { id, wire }) => (values[*id] >> wire) & 1,
            None => panic!("input wire {} of component {} is not connected", j, consumer),
        };
        acc | (bit << j)
    })
}

fn source_var(source: &Option<WireSource>, wire_vars: &[Vec<Lit>], key_vars: &[Lit]) -> Lit {
    match source {
        Some(WireSource::Key(i)) => key_vars[*i],
        Some(WireSource::Component { id, wire }) => wire_vars[*id][*wire],
        None => panic!("unconnected wire reached model construction"),
    }
}

/// Translates `clauses` (numbered `1..=n_vars`) into `pool`'s numbering.
///
/// Each group pairs local boundary variables with optional outer ones. A
/// local variable that meets two different outer variables is tied to both
/// with an equivalence.
fn embed(
    clauses: &[Clause],
    n_vars: usize,
    groups: [(&[Lit], Option<&[Lit]>); 4],
    pool: &mut VarPool,
) -> EmbeddedModel {
    let mut map = VarMap::new(n_vars);
    let mut ties = Cnf::new();
    for (locals, given) in &groups {
        if let Some(given) = given {
            assert_eq!(
                locals.len(),
                given.len(),
                "binding {} outer variables to {} model variables",
                given.len(),
                locals.len()
            );
            for (&l, &g) in locals.iter().zip(given.iter()) {
                if let Some(tie) = map.bind(l, g) {
                    ties.extend(tie);
                }
            }
        }
    }
    let mut resolved: Vec<Vec<Lit>> = Vec::with_capacity(groups.len());
    for (locals, given) in &groups {
        resolved.push(match given {
            Some(given) => given.to_vec(),
            None => locals.iter().map(|&l| map.get_or_fresh(l, pool)).collect(),
        });
    }
    map.fill_fresh(pool);
    let mut out: Cnf = clauses.iter().map(|c| map.map_clause(c)).collect();
    out.extend(ties);
    let mut resolved = resolved.into_iter();
    let mut next = || resolved.next().unwrap_or_default();
    EmbeddedModel {
        clauses: out,
        input_vars: next(),
        output_vars: next(),
        key_vars: next(),
        aux_vars: next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::ComponentLibrary;

    fn keyed_xor() -> CompoundFunction {
        let lib = ComponentLibrary::new();
        let mut f = CompoundFunction::new(1, 1);
        let x = f.add_component(lib.xor(2));
        f.connect_components(INPUT, 0, x, 0);
        assert_eq!(f.connect_to_key(x, 1), 0);
        f.connect_components(x, 0, OUTPUT, 0);
        f
    }

    fn pass_through() -> CompoundFunction {
        let mut f = CompoundFunction::new(1, 1);
        f.connect_components(INPUT, 0, OUTPUT, 0);
        f
    }

    #[test]
    fn test_simulate_reads_key_bits() {
        let f = keyed_xor();
        assert_eq!(f.simulate(0, 0), 0);
        assert_eq!(f.simulate(0, 1), 1);
        assert_eq!(f.simulate(1, 1), 0);
        assert_eq!(f.evaluate(1), 1);
    }

    #[test]
    fn test_wires_share_one_variable() {
        let lib = ComponentLibrary::new();
        let mut f = CompoundFunction::new(2, 2);
        let d = f.add_component(lib.duplicate_xor());
        let i = f.add_component(lib.identity(1));
        f.connect_components(INPUT, 0, d, 0);
        f.connect_components(INPUT, 1, d, 1);
        f.connect_components(d, 0, OUTPUT, 0);
        f.connect_components(d, 1, i, 0);
        f.connect_components(i, 0, OUTPUT, 1);
        let m = f.to_model();
        assert_eq!(m.input_vars, vec![1, 2]);
        // duplicate_xor outputs get 3 and 4; identity's output gets 5.
        assert_eq!(m.output_vars, vec![3, 5]);
        assert_eq!(m.n_vars, 5);
        assert!(m.clauses.contains(&vec![-4, 5]));
    }

    #[test]
    fn test_pass_through_compound_reuses_input_variable() {
        let f = pass_through();
        let m = f.to_model();
        assert_eq!(m.input_vars, m.output_vars);
        assert!(m.clauses.is_empty());
        assert_eq!(m.n_vars, 1);
    }

    #[test]
    fn test_embedding_ties_distinct_bindings_of_one_variable() {
        let f = pass_through();
        let mut pool = VarPool::starting_after(10);
        let e = f.embed_model(
            &mut pool,
            &ModelBindings {
                input_vars: Some(&[3]),
                output_vars: Some(&[7]),
                ..Default::default()
            },
        );
        assert_eq!(e.input_vars, vec![3]);
        assert_eq!(e.output_vars, vec![7]);
        assert_eq!(e.clauses, vec![vec![-3, 7], vec![3, -7]]);
        assert_eq!(pool.top(), 10);
    }

    #[test]
    fn test_nested_pass_through_is_transparent() {
        let mut outer = CompoundFunction::new(1, 1);
        let inner = outer.add_component(pass_through());
        outer.connect_components(INPUT, 0, inner, 0);
        outer.connect_components(inner, 0, OUTPUT, 0);
        let m = outer.to_model();
        assert_eq!(m.input_vars, m.output_vars);
        assert_eq!(outer.simulate(1, 0), 1);
    }

    #[test]
    fn test_weight_model_appends_aux_variables() {
        let f = keyed_xor();
        let p = f.to_model().clone();
        let w = f.to_ut_model();
        assert_eq!(w.input_vars, p.input_vars);
        assert_eq!(w.key_vars, p.key_vars);
        // The 2-way xor has one weight bit.
        assert_eq!(w.aux_vars, vec![p.n_vars as Lit + 1]);
        assert_eq!(w.n_vars, p.n_vars + 1);
    }

    #[test]
    fn test_models_are_rebuilt_after_mutation() {
        let lib = ComponentLibrary::new();
        let mut f = CompoundFunction::new(1, 1);
        let i = f.add_component(lib.identity(1));
        f.connect_components(INPUT, 0, i, 0);
        f.connect_components(i, 0, OUTPUT, 0);
        let before = f.to_model().clone();
        f.set_activation_masks(i, 1, 0);
        let after = f.to_model();
        assert_eq!(before.clauses.len(), 2);
        assert_eq!(after.clauses.len(), 1);
    }

    #[test]
    #[should_panic(expected = "against evaluation order")]
    fn test_backward_edge_is_rejected() {
        let lib = ComponentLibrary::new();
        let mut f = CompoundFunction::new(1, 1);
        let a = f.add_component(lib.identity(1));
        let b = f.add_component(lib.identity(1));
        f.connect_components(b, 0, a, 0);
    }

    #[test]
    #[should_panic(expected = "already driven")]
    fn test_duplicate_connection_is_rejected() {
        let lib = ComponentLibrary::new();
        let mut f = CompoundFunction::new(2, 1);
        let a = f.add_component(lib.identity(1));
        f.connect_components(INPUT, 0, a, 0);
        f.connect_components(INPUT, 1, a, 0);
    }

    #[test]
    fn test_rejected_connection_leaves_both_ends_free() {
        let lib = ComponentLibrary::new();
        let mut f = CompoundFunction::new(2, 2);
        let a = f.add_component(lib.identity(1));
        f.connect_components(INPUT, 0, a, 0);
        let rejected = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            f.connect_components(INPUT, 1, a, 0)
        }));
        assert!(rejected.is_err());
        f.connect_components(INPUT, 1, OUTPUT, 1);
        f.connect_components(a, 0, OUTPUT, 0);
        assert_eq!(f.simulate(0b10, 0), 0b10);
        assert_eq!(f.simulate(0b01, 0), 0b01);
        assert_eq!(f.to_model().input_vars.len(), 2);
    }

    #[test]
    #[should_panic(expected = "already connected")]
    fn test_fan_out_without_copy_is_rejected() {
        let lib = ComponentLibrary::new();
        let mut f = CompoundFunction::new(1, 1);
        let a = f.add_component(lib.xor(2));
        f.connect_components(INPUT, 0, a, 0);
        f.connect_components(INPUT, 0, a, 1);
    }

    #[test]
    #[should_panic(expected = "unknown component id")]
    fn test_unknown_component_is_rejected() {
        let mut f = CompoundFunction::new(1, 1);
        f.connect_components(INPUT, 0, 3, 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_wire_is_rejected() {
        let lib = ComponentLibrary::new();
        let mut f = CompoundFunction::new(1, 1);
        let a = f.add_component(lib.identity(1));
        f.connect_components(INPUT, 0, a, 1);
    }

    #[test]
    #[should_panic(expected = "already driven")]
    fn test_key_on_occupied_wire_is_rejected() {
        let lib = ComponentLibrary::new();
        let mut f = CompoundFunction::new(1, 1);
        let a = f.add_component(lib.identity(1));
        f.connect_components(INPUT, 0, a, 0);
        f.connect_to_key(a, 0);
    }

    #[test]
    #[should_panic(expected = "must be keyless")]
    fn test_keyed_nested_compound_is_rejected() {
        let mut outer = CompoundFunction::new(1, 1);
        outer.add_component(keyed_xor());
    }

    #[test]
    #[should_panic(expected = "never consumed")]
    fn test_dangling_output_is_rejected_at_model_time() {
        let lib = ComponentLibrary::new();
        let mut f = CompoundFunction::new(1, 1);
        let c = f.add_component(lib.copy(2));
        f.connect_components(INPUT, 0, c, 0);
        f.connect_components(c, 0, OUTPUT, 0);
        f.to_model();
    }
}
