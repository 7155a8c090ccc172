//! The queue runner (spec §4.8): topological-order forward sweep with
//! lifetime-minimizing intermediate-value eviction.

use std::collections::HashMap;

use dagma_core::{Bindings, Node, Value};
use tracing::debug;

use crate::error::RunnerError;
use crate::topology;

pub struct QueueRunner {
    sink: Node,
    verbose: bool,
}

impl QueueRunner {
    pub fn new(sink: Node) -> Self {
        QueueRunner { sink, verbose: false }
    }

    pub fn with_verbose(sink: Node, verbose: bool) -> Self {
        QueueRunner { sink, verbose }
    }

    /// Sugar for `compute(Bindings::new(), false)`.
    pub fn value(&self) -> Result<Value, RunnerError> {
        self.compute(Bindings::new(), false)
    }

    pub fn compute(&self, map: Bindings, force: bool) -> Result<Value, RunnerError> {
        let topo = topology::build(&self.sink, &map, force)?;
        let order = topo.order;
        let n = order.len();

        let pos: HashMap<Node, usize> = order.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();

        // Last consumer position: for each node, the maximum queue-index
        // over its parents (edges actually expanded in pass 1).
        let mut last_consumer: HashMap<Node, usize> = HashMap::new();
        for (dep, parents) in &topo.reverse_deps {
            if let Some(max_pos) = parents.iter().filter_map(|p| pos.get(p)).max() {
                last_consumer.insert(dep.clone(), *max_pos);
            }
        }
        let mut to_evict: Vec<Vec<Node>> = vec![Vec::new(); n];
        for (dep, lc) in &last_consumer {
            to_evict[*lc].push(dep.clone());
        }

        let mut computed: HashMap<Node, Value> = HashMap::new();

        for (i, node) in order.iter().enumerate() {
            if self.verbose {
                debug!(i, "queue runner visiting node");
            }

            let value = if let Some(v) = topo.cached.get(node) {
                v.clone()
            } else {
                let dep_values: Vec<Value> = node
                    .deps()
                    .iter()
                    .map(|d| {
                        computed
                            .get(d)
                            .cloned()
                            .expect("every dependency is computed before its consumer")
                    })
                    .collect();
                let effective = node.effective_bindings(&map);
                let v = node.evaluate(&effective, &dep_values, force)?;
                node.set_value(v.clone(), &effective);
                v
            };

            computed.insert(node.clone(), value);
            for dep in &to_evict[i] {
                computed.remove(dep);
            }
        }

        Ok(computed
            .get(&self.sink)
            .cloned()
            .expect("sink is always present in its own topology"))
    }
}
