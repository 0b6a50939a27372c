// SPDX-License-Identifier: Apache-2.0

//! Symbolic propagation models for cryptanalysis.
//!
//! Small functions (S-boxes, xors, copies) get CNF models of how masks
//! propagate through them, either as parity (monomial) trails or weighted
//! trails over the integer transform. Compound circuits splice those models
//! together, and [`correlation::CorrelationEngine`] counts weighted trails
//! through a stack of circuits exactly modulo a power of two.

pub mod bitset;
pub mod cnf;
pub mod component;
pub mod compound;
pub mod correlation;
pub mod function;
pub mod iterated;
pub mod library;
pub mod minimize;
pub mod prop_models;
pub mod sat;
pub mod set_cover;

pub use crate::cnf::{Clause, Cnf, Lit, Mask};
pub use crate::compound::{CompoundFunction, Element};
pub use crate::correlation::{CorrelationEngine, CorrelationOptions, Stage};
pub use crate::function::Function;
