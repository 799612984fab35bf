//! Fixed default values for symbolic constants
//!
//! Bounds and dependency constraints are written over symbolic constants
//! (`N`, `M`, ...). Generation binds each distinct symbol to the next multiple
//! of ten, so every symbol gets a distinct, recognisable value in generated
//! code and in failure output.

use serde::Serialize;

use crate::emit::relation_parameters;
use crate::spec::TestSpec;

/// Distance between consecutive symbol values
pub const SYMBOL_STEP: i64 = 10;

/// One symbol bound to its value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub name: String,
    pub value: i64,
}

/// Ordered symbol bindings of one test
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SymbolBindings {
    bindings: Vec<Binding>,
}

impl SymbolBindings {
    /// Bind names in order; repeated names keep their first value
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut bindings = Self::default();
        for name in names {
            bindings.bind(name.into());
        }
        bindings
    }

    /// Chain symbols first, then parameters that only the relations declare
    pub fn for_test(spec: &TestSpec) -> Self {
        let relation_params = spec
            .raw_order
            .relations
            .iter()
            .chain(&spec.new_order.relations)
            .flat_map(|relation| relation_parameters(relation));
        Self::from_names(spec.chain_symbols().into_iter().chain(relation_params))
    }

    fn bind(&mut self, name: String) {
        if self.get(&name).is_none() {
            let value = SYMBOL_STEP * (self.bindings.len() as i64 + 1);
            self.bindings.push(Binding { name, value });
        }
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.bindings
            .iter()
            .find(|binding| binding.name == name)
            .map(|binding| binding.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// isl parameter set fixing every symbol, e.g. `[N, M] -> { : N = 10 and M = 20 }`
    pub fn isl_context(&self) -> String {
        if self.bindings.is_empty() {
            return "{ : }".to_string();
        }
        let names: Vec<&str> = self.bindings.iter().map(|b| b.name.as_str()).collect();
        let constraints: Vec<String> = self
            .bindings
            .iter()
            .map(|b| format!("{} = {}", b.name, b.value))
            .collect();
        format!("[{}] -> {{ : {} }}", names.join(", "), constraints.join(" and "))
    }
}
