//! The recursive runner (spec §4.7): classic post-order evaluation, one
//! call frame per node visited.

use dagma_core::{Bindings, Node, Value};
use tracing::debug;

use crate::error::RunnerError;

/// Depth-first, post-order evaluation of a sink node.
///
/// Stack depth scales with graph depth -- on very deep graphs prefer
/// [`crate::QueueRunner`] or [`crate::ThreadRunner`], which flatten
/// evaluation into an explicit loop.
pub struct RecursiveRunner {
    sink: Node,
    verbose: bool,
}

impl RecursiveRunner {
    pub fn new(sink: Node) -> Self {
        RecursiveRunner { sink, verbose: false }
    }

    pub fn with_verbose(sink: Node, verbose: bool) -> Self {
        RecursiveRunner { sink, verbose }
    }

    /// Sugar for `compute(Bindings::new(), false)`.
    pub fn value(&self) -> Result<Value, RunnerError> {
        self.compute(Bindings::new(), false)
    }

    pub fn compute(&self, map: Bindings, force: bool) -> Result<Value, RunnerError> {
        Ok(self.recurse(&self.sink, &map, force)?)
    }

    fn recurse(
        &self,
        node: &Node,
        map: &Bindings,
        force: bool,
    ) -> Result<Value, dagma_core::DagmaError> {
        if self.verbose {
            debug!(label = %node.text_graph().lines().next().unwrap_or_default(), "recursive runner visiting node");
        }

        if let Some(v) = node.get_value(map, force)? {
            return Ok(v);
        }

        let mut dep_values = Vec::with_capacity(node.deps().len());
        for dep in node.deps() {
            dep_values.push(self.recurse(dep, map, force)?);
        }

        let effective = node.effective_bindings(map);
        let value = node.evaluate(&effective, &dep_values, force)?;
        node.set_value(value.clone(), &effective);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagma_core::{ComputeOpts, DepSpec};
    use std::sync::{Arc, Mutex};

    #[test]
    fn s1_mul_two_of_add_one() {
        let x = Node::var("x");
        let add_one = Node::compute(
            |args| Value::Int(args[0].as_int().unwrap() + 1),
            [DepSpec::Node(x)],
            ComputeOpts::default(),
        );
        let mul_two = Node::compute(
            |args| Value::Int(args[0].as_int().unwrap() * 2),
            [DepSpec::Node(add_one)],
            ComputeOpts::default(),
        );

        let runner = RecursiveRunner::new(mul_two);
        let mut map = Bindings::new();
        map.insert("x", Value::Int(2));
        assert_eq!(runner.compute(map, false).unwrap(), Value::Int(6));
    }

    #[test]
    fn memoizes_shared_subnode_across_one_call() {
        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        let x = Node::var("x");
        let shared = Node::compute(
            move |args| {
                *calls_clone.lock().unwrap() += 1;
                Value::Int(args[0].as_int().unwrap() + 1)
            },
            [DepSpec::Node(x)],
            ComputeOpts::default(),
        );
        let sink = Node::compute(
            |args| Value::Int(args[0].as_int().unwrap() + args[1].as_int().unwrap()),
            [DepSpec::Node(shared.clone()), DepSpec::Node(shared)],
            ComputeOpts::default(),
        );

        let runner = RecursiveRunner::new(sink);
        let mut map = Bindings::new();
        map.insert("x", Value::Int(1));
        assert_eq!(runner.compute(map, false).unwrap(), Value::Int(4));
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
