//! Ordered variable-name -> [`Value`] maps, with the projection and merge
//! operations the node base contract is built on.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A variable binding map. Ordering is insertion order (via [`IndexMap`]);
/// equality, per `IndexMap`, compares key/value pairs regardless of order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bindings(IndexMap<String, Value>);

impl Bindings {
    /// A fresh, empty binding map. Every call site that needs "no bindings"
    /// constructs one of these -- there is no shared default instance to
    /// accidentally alias and mutate.
    pub fn new() -> Self {
        Bindings(IndexMap::new())
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Bindings(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Projects this map onto `allowed`, dropping every other key.
    pub fn project(&self, allowed: &HashSet<String>) -> Bindings {
        Bindings(
            self.0
                .iter()
                .filter(|(k, _)| allowed.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Merges `self` as the base with `overrides` winning on key collision.
    pub fn merged_over(&self, overrides: &Bindings) -> Bindings {
        let mut out = self.0.clone();
        for (k, v) in overrides.0.iter() {
            out.insert(k.clone(), v.clone());
        }
        Bindings(out)
    }

    pub fn missing_from<'a>(&self, required: impl Iterator<Item = &'a String>) -> Vec<String> {
        let mut missing: Vec<String> = required
            .filter(|name| !self.0.contains_key(name.as_str()))
            .cloned()
            .collect();
        missing.sort();
        missing
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Bindings::from_pairs(iter)
    }
}
