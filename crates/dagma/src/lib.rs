//! `dagma`: build a DAG of pure computations once, then evaluate any sink
//! node under a variable binding with memoization and on-disk result
//! caching.
//!
//! ```
//! use dagma::prelude::*;
//!
//! let x = var("x");
//! let add_one = compute(|args| Value::Int(args[0].as_int().unwrap() + 1), [x], ComputeOpts::default());
//! let mul_two = compute(|args| Value::Int(args[0].as_int().unwrap() * 2), [add_one], ComputeOpts::default());
//!
//! let runner = QueueRunner::new(mul_two);
//! let mut bindings = Bindings::new();
//! bindings.insert("x", Value::Int(2));
//! assert_eq!(runner.compute(bindings, false).unwrap(), Value::Int(6));
//! ```
//!
//! This crate is the authoring façade over `dagma-core` (the node
//! taxonomy) and `dagma-runtime` (the three runners); `dagma-cache`
//! underlies both with the value model, hashing, file I/O, and on-disk
//! cache protocol. Most users only need this crate and its `prelude`.

mod cache_builders;

pub use cache_builders::{dynamic_path_cache, fixed_path_cache};

pub use dagma_cache::{
    blake3_digest, json_load, json_save, md5_digest, sidecar_path, Bindings, CacheDescriptor,
    CacheError, DigestFactory, Hasher64, LoadFn, PathSpec, SaveFn, Value, HASH_BLOCK_SIZE,
};
pub use dagma_core::{
    ComputeOpts, DagmaError, DepList, DepSpec, FanoutKey, Node, Transform, FOREACH_ELEMENT_BINDING,
};
pub use dagma_runtime::{QueueRunner, RecursiveRunner, RunnerError, ThreadRunner};

/// A constant node (spec §3): `V = ∅`, never memoized.
pub fn constant(value: impl Into<Value>) -> Node {
    Node::constant(value)
}

/// A variable node: `V = {name}`.
pub fn var(name: impl Into<String>) -> Node {
    Node::var(name)
}

/// A compute node over a heterogeneous dependency list (nodes, variable
/// names, or literal values all normalize via `DepSpec`).
pub fn compute(
    transform: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    deps: impl IntoIterator<Item = impl Into<DepSpec>>,
    opts: ComputeOpts,
) -> Node {
    Node::compute(transform, deps, opts)
}

/// A foreach-specialized compute node (spec §4.5). Fails construction if
/// given a cache descriptor whose path is not a function of bindings.
pub fn foreach_compute(
    transform: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    deps: impl IntoIterator<Item = impl Into<DepSpec>>,
    foreach: impl Into<FanoutKey>,
    opts: ComputeOpts,
) -> Result<Node, DagmaError> {
    Node::foreach_compute(transform, deps, foreach, opts)
}

/// Common imports for authoring and running a dagma graph.
pub mod prelude {
    pub use crate::{
        compute, constant, dynamic_path_cache, fixed_path_cache, foreach_compute, var,
        Bindings, CacheDescriptor, ComputeOpts, DagmaError, DepSpec, FanoutKey, Node,
        QueueRunner, RecursiveRunner, RunnerError, ThreadRunner, Value, FOREACH_ELEMENT_BINDING,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn s3_foreach_add_one_then_mul_two_then_sum() {
        let xs = constant(Value::List((0..10).map(Value::Int).collect()));
        let ao = foreach_compute(
            |args| Value::Int(args[0].as_int().unwrap() + 1),
            [xs],
            0usize,
            ComputeOpts::default(),
        )
        .unwrap();
        let mt = foreach_compute(
            |args| Value::Int(args[0].as_int().unwrap() * 2),
            [ao],
            0usize,
            ComputeOpts::default(),
        )
        .unwrap();
        let s = compute(
            |args| Value::Int(args[0].as_list().unwrap().iter().map(|v| v.as_int().unwrap()).sum()),
            [mt],
            ComputeOpts::default(),
        );

        let runner = QueueRunner::new(s);
        assert_eq!(runner.value().unwrap(), Value::Int(110));
    }

    #[test]
    fn s4_and_s5_on_disk_cache_roundtrip_and_corruption_detection() {
        use std::sync::{Arc, Mutex};

        let dir = tempfile::tempdir().unwrap();
        let cache = fixed_path_cache(dir.path().join("out.json"));

        let calls = Arc::new(Mutex::new(0));
        let calls_clone = calls.clone();
        let x = var("x");
        let add_one = compute(
            move |args| {
                *calls_clone.lock().unwrap() += 1;
                Value::Int(args[0].as_int().unwrap() + 1)
            },
            [x],
            ComputeOpts::default().with_cache(cache),
        );

        let runner = QueueRunner::new(add_one);
        let mut bindings = Bindings::new();
        bindings.insert("x", Value::Int(1013));

        // S4: first run computes and persists; second run (fresh in-memory
        // state is simulated by a fresh runner over the same node -- the
        // node's own memo slot would already short-circuit, so force a
        // clear read path through the disk cache by checking call count).
        assert_eq!(runner.compute(bindings.clone(), false).unwrap(), Value::Int(1014));
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(runner.compute(bindings.clone(), false).unwrap(), Value::Int(1014));
        assert_eq!(*calls.lock().unwrap(), 1);

        // S5: corrupt the payload on disk, force eviction of the in-memory
        // memo by using a fresh node pointed at the same path, and confirm
        // the corruption is detected and recomputed exactly once.
        std::fs::write(dir.path().join("out.json"), b"3").unwrap();
        let calls2 = Arc::new(Mutex::new(0));
        let calls2_clone = calls2.clone();
        let x2 = var("x");
        let add_one2 = compute(
            move |args| {
                *calls2_clone.lock().unwrap() += 1;
                Value::Int(args[0].as_int().unwrap() + 1)
            },
            [x2],
            ComputeOpts::default().with_cache(fixed_path_cache(dir.path().join("out.json"))),
        );
        let runner2 = QueueRunner::new(add_one2);
        assert_eq!(runner2.compute(bindings, false).unwrap(), Value::Int(1014));
        assert_eq!(*calls2.lock().unwrap(), 1);
    }

    #[test]
    fn shared_node_ignores_bindings_outside_its_own_v() {
        let shared = var("x");
        let consumer_a = compute(
            |args| Value::Int(args[0].as_int().unwrap() + 1),
            [shared.clone()],
            ComputeOpts::default(),
        );
        let consumer_b = compute(
            |args| Value::Int(args[0].as_int().unwrap() * 10),
            [shared.clone()],
            ComputeOpts::default(),
        );
        let combo = compute(
            |args| Value::Int(args[0].as_int().unwrap() + args[1].as_int().unwrap()),
            [consumer_a, consumer_b],
            ComputeOpts::default(),
        );

        let runner = QueueRunner::new(combo);
        let mut bindings = Bindings::new();
        bindings.insert("x", Value::Int(2));
        bindings.insert("y", Value::Int(999));
        assert_eq!(runner.compute(bindings, false).unwrap(), Value::Int(23));
    }

    #[test]
    fn mixed_dependency_list_constant_variable_and_node() {
        let x = var("x");
        let double_x = compute(
            |args| Value::Int(args[0].as_int().unwrap() * 2),
            [x],
            ComputeOpts::default(),
        );
        let combo = compute(
            |args| {
                Value::Int(
                    args[0].as_int().unwrap() + args[1].as_int().unwrap() + args[2].as_int().unwrap(),
                )
            },
            [DepSpec::from(double_x), DepSpec::from("y"), DepSpec::from(Value::Int(100))],
            ComputeOpts::default(),
        );

        let runner = RecursiveRunner::new(combo);
        let mut bindings = Bindings::new();
        bindings.insert("x", Value::Int(3));
        bindings.insert("y", Value::Int(5));
        assert_eq!(runner.compute(bindings, false).unwrap(), Value::Int(111));
    }
}
