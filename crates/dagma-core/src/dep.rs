//! Dependency normalization (spec §4.2, §9): a compute node's dependency
//! list is authored from a mix of nodes, variable names, and literal
//! values. `DepSpec` is the tagged union that mixing normalizes into before
//! a node's `V` is computed.

use dagma_cache::Value;

use crate::node::Node;

/// One element of a compute node's heterogeneous dependency list, before
/// normalization.
pub enum DepSpec {
    /// An existing node, used as-is.
    Node(Node),
    /// A variable name, wrapped in a fresh variable node.
    Var(String),
    /// Any other value, wrapped in a fresh constant node.
    Literal(Value),
}

impl DepSpec {
    /// Normalizes this spec into a node, constructing a fresh variable or
    /// constant node if needed.
    pub(crate) fn into_node(self) -> Node {
        match self {
            DepSpec::Node(n) => n,
            DepSpec::Var(name) => Node::var(name),
            DepSpec::Literal(v) => Node::constant(v),
        }
    }
}

impl From<Node> for DepSpec {
    fn from(n: Node) -> Self {
        DepSpec::Node(n)
    }
}

impl From<&str> for DepSpec {
    fn from(s: &str) -> Self {
        DepSpec::Var(s.to_string())
    }
}

impl From<String> for DepSpec {
    fn from(s: String) -> Self {
        DepSpec::Var(s)
    }
}

impl From<Value> for DepSpec {
    fn from(v: Value) -> Self {
        DepSpec::Literal(v)
    }
}

impl From<i64> for DepSpec {
    fn from(v: i64) -> Self {
        DepSpec::Literal(Value::Int(v))
    }
}

impl From<f64> for DepSpec {
    fn from(v: f64) -> Self {
        DepSpec::Literal(Value::Float(v))
    }
}

impl From<bool> for DepSpec {
    fn from(v: bool) -> Self {
        DepSpec::Literal(Value::Bool(v))
    }
}

/// The dependency identified as a foreach node's fanout: either the
/// variable name of one of its dependencies, or that dependency's
/// positional index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutKey {
    Var(String),
    Index(usize),
}

/// The binding name a foreach node's per-element evaluation uses to carry
/// the current element's scalar value when the fanout key is a positional
/// index rather than a variable name (so there is no natural variable name
/// to extend). A dynamic cache path function for an index-fanout foreach
/// node should read this key to vary its resolved path per element; per-
/// element memoization relies on it too, so elements with equal values
/// collapse to one evaluation the same way var-fanout duplicates do.
pub const FOREACH_ELEMENT_BINDING: &str = "__dagma_foreach_element";

impl From<&str> for FanoutKey {
    fn from(s: &str) -> Self {
        FanoutKey::Var(s.to_string())
    }
}

impl From<String> for FanoutKey {
    fn from(s: String) -> Self {
        FanoutKey::Var(s)
    }
}

impl From<usize> for FanoutKey {
    fn from(i: usize) -> Self {
        FanoutKey::Index(i)
    }
}
