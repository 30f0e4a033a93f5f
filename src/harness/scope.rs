//! Names visible to a running script

use std::collections::HashMap;

use crate::catalogue::{Catalogue, TypeId};
use crate::value::Value;

/// Name of the argument-bundle helper
pub const HELPER: &str = "_";

/// Lexical bindings of one run. Starts out holding exactly the global
/// element types and the `_` helper; `with` blocks add and remove their
/// nested types, `as` targets add element markers.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, Value>,
}

impl Scope {
    pub fn new(catalogue: &Catalogue) -> Self {
        let mut bindings: HashMap<String, Value> = catalogue
            .globals()
            .map(|(name, ty)| (name.to_string(), Value::Type(ty)))
            .collect();
        bindings.insert(HELPER.to_string(), Value::Helper);
        Self { bindings }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Bind a nested type unless the name is already taken.
    /// Returns whether it was bound.
    pub fn inject(&mut self, name: &str, ty: TypeId) -> bool {
        if self.bindings.contains_key(name) {
            return false;
        }
        self.bindings.insert(name.to_string(), Value::Type(ty));
        true
    }

    /// Undo [`Scope::inject`], leaving names rebound in the meantime alone
    pub fn eject(&mut self, name: &str, ty: TypeId) {
        if matches!(self.bindings.get(name), Some(Value::Type(bound)) if *bound == ty) {
            self.bindings.remove(name);
        }
    }
}
