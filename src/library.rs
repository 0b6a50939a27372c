// SPDX-License-Identifier: Apache-2.0

//! Owned cache of structural components.
//!
//! Each structural component is created once per width and shared, so its
//! memoized models are computed once no matter how many circuits use it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::cnf::{Cnf, Mask};
use crate::component::Component;
use crate::minimize::MinimizeOptions;

#[derive(Debug, Default)]
pub struct ComponentLibrary {
    options: MinimizeOptions,
    copies: Mutex<HashMap<usize, Arc<Component>>>,
    xors: Mutex<HashMap<usize, Arc<Component>>>,
    identities: Mutex<HashMap<usize, Arc<Component>>>,
    sink: OnceCell<Arc<Component>>,
    add_key: OnceCell<Arc<Component>>,
    duplicate_xor: OnceCell<Arc<Component>>,
}

fn interned(
    table: &Mutex<HashMap<usize, Arc<Component>>>,
    n: usize,
    make: impl FnOnce() -> Component,
) -> Arc<Component> {
    table
        .lock()
        .unwrap()
        .entry(n)
        .or_insert_with(|| Arc::new(make()))
        .clone()
}

impl ComponentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A library whose components minimize with `options`.
    pub fn with_options(options: MinimizeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &MinimizeOptions {
        &self.options
    }

    pub fn copy(&self, n: usize) -> Arc<Component> {
        interned(&self.copies, n, || Component::copy(n).with_options(self.options))
    }

    pub fn xor(&self, n: usize) -> Arc<Component> {
        interned(&self.xors, n, || Component::xor(n).with_options(self.options))
    }

    pub fn identity(&self, n: usize) -> Arc<Component> {
        interned(&self.identities, n, || {
            Component::identity(n).with_options(self.options)
        })
    }

    pub fn sink(&self) -> Arc<Component> {
        self.sink
            .get_or_init(|| Arc::new(Component::sink().with_options(self.options)))
            .clone()
    }

    pub fn add_key(&self) -> Arc<Component> {
        self.add_key
            .get_or_init(|| Arc::new(Component::add_key().with_options(self.options)))
            .clone()
    }

    pub fn duplicate_xor(&self) -> Arc<Component> {
        self.duplicate_xor
            .get_or_init(|| Arc::new(Component::duplicate_xor().with_options(self.options)))
            .clone()
    }

    /// A fresh lookup component; these are not interned.
    pub fn lookup(
        &self,
        name: &str,
        input_size: usize,
        output_size: usize,
        table: Vec<Mask>,
    ) -> Arc<Component> {
        Arc::new(Component::lookup(name, input_size, output_size, table).with_options(self.options))
    }

    pub fn opaque(
        &self,
        name: &str,
        input_size: usize,
        output_size: usize,
        weight_clauses: Cnf,
        aux_count: usize,
    ) -> Arc<Component> {
        Arc::new(Component::opaque(
            name,
            input_size,
            output_size,
            weight_clauses,
            aux_count,
        ))
    }
}
