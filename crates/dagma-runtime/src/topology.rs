//! Shared topology construction for the queue and thread runners (spec
//! §4.8 pass 1): an iterative DFS from the sink that builds a `petgraph`
//! dependency graph, cutting off expansion under any subtree whose value
//! is already reachable from cache.

use std::collections::{HashMap, HashSet};

use dagma_core::{Bindings, DagmaError, Node, Value};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

/// The result of topology construction: a leaves-first evaluation order,
/// the reverse-dependency map restricted to edges actually expanded, and
/// the values of any nodes that were cache-cut (and so never need
/// `evaluate` called on them at all).
pub struct Topology {
    pub order: Vec<Node>,
    pub reverse_deps: HashMap<Node, Vec<Node>>,
    pub cached: HashMap<Node, Value>,
}

/// Builds the topology reachable from `sink` under `map`/`force`.
///
/// Edges run dependency -> dependent, so `petgraph::algo::toposort` (which
/// orders a node after everything it has an incoming edge from) yields a
/// leaves-first order directly -- dependencies necessarily precede their
/// dependents.
pub fn build(sink: &Node, map: &Bindings, force: bool) -> Result<Topology, DagmaError> {
    let mut graph: DiGraph<Node, ()> = DiGraph::new();
    let mut indices: HashMap<Node, NodeIndex> = HashMap::new();
    let mut cached: HashMap<Node, Value> = HashMap::new();
    let mut reverse_deps: HashMap<Node, Vec<Node>> = HashMap::new();
    let mut visited: HashSet<Node> = HashSet::new();
    let mut stack = vec![sink.clone()];

    fn index_of(graph: &mut DiGraph<Node, ()>, indices: &mut HashMap<Node, NodeIndex>, n: &Node) -> NodeIndex {
        *indices
            .entry(n.clone())
            .or_insert_with(|| graph.add_node(n.clone()))
    }

    while let Some(n) = stack.pop() {
        if visited.contains(&n) {
            continue;
        }
        visited.insert(n.clone());
        let idx = index_of(&mut graph, &mut indices, &n);

        match n.get_value(map, force)? {
            Some(v) => {
                cached.insert(n.clone(), v);
            }
            None => {
                for d in n.deps() {
                    let d_idx = index_of(&mut graph, &mut indices, d);
                    graph.add_edge(d_idx, idx, ());
                    reverse_deps.entry(d.clone()).or_default().push(n.clone());
                    if !visited.contains(d) {
                        stack.push(d.clone());
                    }
                }
            }
        }
    }

    let order_idx =
        toposort(&graph, None).expect("dagma graphs must be acyclic (cycles are a programmer error)");
    let order = order_idx.into_iter().map(|i| graph[i].clone()).collect();

    Ok(Topology {
        order,
        reverse_deps,
        cached,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagma_core::{ComputeOpts, DepSpec};

    #[test]
    fn diamond_dependency_orders_shared_leaf_first() {
        let leaf = Node::var("x");
        let a = Node::compute(
            |args| Value::Int(args[0].as_int().unwrap() + 1),
            [DepSpec::Node(leaf.clone())],
            ComputeOpts::default(),
        );
        let b = Node::compute(
            |args| Value::Int(args[0].as_int().unwrap() * 2),
            [DepSpec::Node(leaf.clone())],
            ComputeOpts::default(),
        );
        let sink = Node::compute(
            |args| Value::Int(args[0].as_int().unwrap() + args[1].as_int().unwrap()),
            [DepSpec::Node(a.clone()), DepSpec::Node(b.clone())],
            ComputeOpts::default(),
        );

        let mut map = Bindings::new();
        map.insert("x", Value::Int(3));
        let topo = build(&sink, &map, false).unwrap();

        let pos = |n: &Node| topo.order.iter().position(|o| o == n).unwrap();
        assert!(pos(&leaf) < pos(&a));
        assert!(pos(&leaf) < pos(&b));
        assert!(pos(&a) < pos(&sink));
        assert!(pos(&b) < pos(&sink));
    }

    #[test]
    fn cache_cut_node_excludes_its_children_from_the_graph() {
        let leaf = Node::var("x");
        let cached_node = Node::compute(
            |args| Value::Int(args[0].as_int().unwrap() + 1),
            [DepSpec::Node(leaf.clone())],
            ComputeOpts::default(),
        );
        let mut map = Bindings::new();
        map.insert("x", Value::Int(1));
        let effective = cached_node.effective_bindings(&map);
        cached_node.set_value(Value::Int(2), &effective);

        let topo = build(&cached_node, &map, false).unwrap();
        assert_eq!(topo.order, vec![cached_node.clone()]);
        assert_eq!(topo.cached.get(&cached_node), Some(&Value::Int(2)));
    }
}
