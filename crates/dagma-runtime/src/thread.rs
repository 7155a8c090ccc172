//! The thread runner (spec §4.9): same topology as the queue runner, but a
//! `rayon` worker pool evaluates independent nodes concurrently while a
//! dispatcher loop -- running on the calling thread -- owns the shared
//! `computed`/`pending`/`ready` bookkeeping and only ever reads node
//! results back off a completion channel.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;

use dagma_core::{Bindings, DagmaError, Node, Value};
use tracing::debug;

use crate::error::RunnerError;
use crate::topology::{self, Topology};

pub struct ThreadRunner {
    sink: Node,
    num_workers: usize,
    verbose: bool,
}

impl ThreadRunner {
    pub fn new(sink: Node, num_workers: usize) -> Self {
        ThreadRunner {
            sink,
            num_workers,
            verbose: false,
        }
    }

    pub fn with_verbose(sink: Node, num_workers: usize, verbose: bool) -> Self {
        ThreadRunner {
            sink,
            num_workers,
            verbose,
        }
    }

    /// Sugar for `compute(Bindings::new(), false)`.
    pub fn value(&self) -> Result<Value, RunnerError> {
        self.compute(Bindings::new(), false)
    }

    pub fn compute(&self, map: Bindings, force: bool) -> Result<Value, RunnerError> {
        let topo = topology::build(&self.sink, &map, force)?;
        let (pending, reverse_deps) = pending_counts(&topo);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_workers.max(1))
            .build()
            .map_err(|e| RunnerError::Pool(e.to_string()))?;

        let mut computed: HashMap<Node, Value> = HashMap::new();
        let mut pending = pending;
        let mut ready: VecDeque<Node> = VecDeque::new();

        // Seed cache-cut nodes as already "done", in topological order so
        // decrements cascade correctly to any dependents that, in turn,
        // become ready.
        for node in &topo.order {
            if let Some(v) = topo.cached.get(node) {
                mark_done(node, v.clone(), &mut computed, &mut pending, &reverse_deps, &mut ready);
            }
        }
        for node in &topo.order {
            if !computed.contains_key(node)
                && *pending.get(node).unwrap_or(&0) == 0
                && !ready.contains(node)
            {
                ready.push_back(node.clone());
            }
        }

        let (tx, rx) = mpsc::channel::<(Node, Result<Value, DagmaError>)>();
        let mut in_flight: usize = 0;
        let mut first_error: Option<DagmaError> = None;

        while !(ready.is_empty() && in_flight == 0) {
            while let Some(node) = ready.pop_front() {
                if self.verbose {
                    debug!(in_flight, "thread runner dispatching node");
                }
                let dep_values: Vec<Value> = node
                    .deps()
                    .iter()
                    .map(|d| {
                        computed
                            .get(d)
                            .cloned()
                            .expect("dependency resolved before it enters the ready queue")
                    })
                    .collect();
                let effective = node.effective_bindings(&map);
                let node_for_job = node.clone();
                let map_for_job = map.clone();
                let tx = tx.clone();
                in_flight += 1;

                pool.spawn(move || {
                    // Cache short-circuit: a worker re-checks the node's
                    // in-memory/on-disk cache before calling the
                    // transform (spec §4.9) -- redundant with the
                    // topology-build cut for this call, but cheap and
                    // keeps the contract honest if that ever changes.
                    let result = (|| {
                        if !force {
                            if let Some(v) = node_for_job.get_value(&map_for_job, force)? {
                                return Ok(v);
                            }
                        }
                        let v = node_for_job.evaluate(&effective, &dep_values, force)?;
                        node_for_job.set_value(v.clone(), &effective);
                        Ok(v)
                    })();
                    let _ = tx.send((node_for_job, result));
                });
            }

            match rx.recv() {
                Ok((node, result)) => {
                    in_flight -= 1;
                    match result {
                        Ok(v) => mark_done(&node, v, &mut computed, &mut pending, &reverse_deps, &mut ready),
                        Err(e) => {
                            if first_error.is_none() {
                                first_error = Some(e);
                            }
                        }
                    }
                }
                Err(_) => break,
            }
        }

        if let Some(e) = first_error {
            return Err(e.into());
        }

        Ok(computed
            .get(&self.sink)
            .cloned()
            .expect("sink is always present in its own topology"))
    }
}

fn pending_counts(topo: &Topology) -> (HashMap<Node, usize>, HashMap<Node, Vec<Node>>) {
    let in_queue: std::collections::HashSet<Node> = topo.order.iter().cloned().collect();
    let mut pending = HashMap::new();
    for n in &topo.order {
        let count = n.deps().iter().filter(|d| in_queue.contains(*d)).count();
        pending.insert(n.clone(), count);
    }
    (pending, topo.reverse_deps.clone())
}

fn mark_done(
    node: &Node,
    value: Value,
    computed: &mut HashMap<Node, Value>,
    pending: &mut HashMap<Node, usize>,
    reverse_deps: &HashMap<Node, Vec<Node>>,
    ready: &mut VecDeque<Node>,
) {
    computed.insert(node.clone(), value);
    if let Some(parents) = reverse_deps.get(node) {
        for parent in parents {
            if let Some(count) = pending.get_mut(parent) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push_back(parent.clone());
                }
            }
        }
    }
}
