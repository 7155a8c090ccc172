//! The node taxonomy (spec §3-§4.5): constant, variable, compute, and
//! foreach-compute nodes behind one reference-counted handle type, sharing
//! the base contract of binding, memoization, and evaluation.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use dagma_cache::{
    cache_lookup, cache_store, CacheDescriptor, CacheOutcome, Fingerprint,
};
use dagma_cache::{Bindings, Value};
use smallvec::SmallVec;
use tracing::debug;

use crate::dep::{DepSpec, FanoutKey, FOREACH_ELEMENT_BINDING};
use crate::error::DagmaError;

/// A pure transform: resolved dependency values in, a fresh value out.
/// Required to be `Send + Sync` so a compute node is usable from the
/// thread runner.
pub type Transform = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A node's ordered dependency list. Spec §9 fixes this as an ordered
/// sequence (never a hash-based collection) since transform argument order
/// matters; `SmallVec` avoids a heap allocation for the common small-arity
/// case while still behaving like a `Vec`.
pub type DepList = SmallVec<[Node; 4]>;

/// Construction-time options shared by `compute` and `foreach_compute`.
/// `mem_cache: None` means "use this node kind's default" (on for plain
/// compute nodes, off for foreach nodes -- spec §9's resolved open
/// question).
#[derive(Clone, Default)]
pub struct ComputeOpts {
    pub mem_cache: Option<bool>,
    pub cache: Option<CacheDescriptor>,
    /// A user-supplied version tag for the transform fingerprint. Absent a
    /// tag, the fingerprint falls back to the transform's data-pointer
    /// identity (spec §4.3).
    pub version: Option<String>,
}

impl ComputeOpts {
    pub fn with_cache(mut self, cache: CacheDescriptor) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_mem_cache(mut self, mem_cache: bool) -> Self {
        self.mem_cache = Some(mem_cache);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

struct ComputeData {
    transform: Transform,
    cache: Option<CacheDescriptor>,
    fingerprint: Fingerprint,
}

enum Kind {
    Constant(Value),
    Variable(String),
    Compute(ComputeData),
    Foreach(ComputeData, FanoutKey),
}

struct NodeData {
    kind: Kind,
    deps: DepList,
    /// `V`: the transitive variable-dependency set, precomputed at
    /// construction as the union of the (normalized) children's `V` sets.
    var_deps: HashSet<String>,
    bound_vars: Mutex<Bindings>,
    memo: Mutex<Option<(Value, Bindings)>>,
    mem_cache: bool,
    /// Per-element results for a foreach node, keyed by that element's
    /// effective bindings. Independent of `mem_cache` -- see spec §4.5.
    foreach_memo: Mutex<Vec<(Bindings, Value)>>,
}

/// A handle to one node in a dagma graph. Cheap to clone (an `Arc` bump);
/// the same handle can be shared as a dependency of more than one
/// downstream node.
#[derive(Clone)]
pub struct Node(Arc<NodeData>);

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

fn fingerprint_of(transform: &Transform, arity: usize, version: Option<&str>) -> Fingerprint {
    match version {
        Some(tag) => Fingerprint::from_version(tag, arity),
        None => {
            let ptr = Arc::as_ptr(transform) as *const () as usize;
            Fingerprint::from_pointer(ptr, arity)
        }
    }
}

impl Node {
    /// A constant node: `V = ∅`, never memoized (evaluation is free).
    pub fn constant(value: impl Into<Value>) -> Node {
        Node(Arc::new(NodeData {
            kind: Kind::Constant(value.into()),
            deps: DepList::new(),
            var_deps: HashSet::new(),
            bound_vars: Mutex::new(Bindings::new()),
            memo: Mutex::new(None),
            mem_cache: false,
            foreach_memo: Mutex::new(Vec::new()),
        }))
    }

    /// A variable node: `V = {name}`.
    pub fn var(name: impl Into<String>) -> Node {
        let name = name.into();
        let mut var_deps = HashSet::new();
        var_deps.insert(name.clone());
        Node(Arc::new(NodeData {
            kind: Kind::Variable(name),
            deps: DepList::new(),
            var_deps,
            bound_vars: Mutex::new(Bindings::new()),
            memo: Mutex::new(None),
            mem_cache: false,
            foreach_memo: Mutex::new(Vec::new()),
        }))
    }

    /// A compute node: a pure transform over its (normalized) dependency
    /// list. `mem_cache` defaults to on.
    pub fn compute(
        transform: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
        deps: impl IntoIterator<Item = impl Into<DepSpec>>,
        opts: ComputeOpts,
    ) -> Node {
        let deps: DepList = deps.into_iter().map(|d| d.into().into_node()).collect();
        let var_deps = union_var_deps(&deps);
        let transform: Transform = Arc::new(transform);
        let fingerprint = fingerprint_of(&transform, deps.len(), opts.version.as_deref());

        Node(Arc::new(NodeData {
            kind: Kind::Compute(ComputeData {
                transform,
                cache: opts.cache,
                fingerprint,
            }),
            deps,
            var_deps,
            bound_vars: Mutex::new(Bindings::new()),
            memo: Mutex::new(None),
            mem_cache: opts.mem_cache.unwrap_or(true),
            foreach_memo: Mutex::new(Vec::new()),
        }))
    }

    /// A foreach-specialized compute node. `mem_cache` defaults to off
    /// (spec §9): the node's own value is a list of already-memoized
    /// per-element results, so caching the list itself is rarely useful.
    ///
    /// Fails construction if a cache descriptor is given whose path is not
    /// a function of bindings (`foreach-path-must-be-callable`), since
    /// per-element artifacts need distinct paths.
    pub fn foreach_compute(
        transform: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
        deps: impl IntoIterator<Item = impl Into<DepSpec>>,
        foreach: impl Into<FanoutKey>,
        opts: ComputeOpts,
    ) -> Result<Node, DagmaError> {
        if let Some(cache) = &opts.cache {
            if !cache.requires_callable_path() {
                return Err(DagmaError::ForeachPathMustBeCallable);
            }
        }

        let deps: DepList = deps.into_iter().map(|d| d.into().into_node()).collect();
        let foreach = foreach.into();
        resolve_fanout_index(&deps, &foreach)?;

        let var_deps = union_var_deps(&deps);
        let transform: Transform = Arc::new(transform);
        let fingerprint = fingerprint_of(&transform, deps.len(), opts.version.as_deref());

        Ok(Node(Arc::new(NodeData {
            kind: Kind::Foreach(
                ComputeData {
                    transform,
                    cache: opts.cache,
                    fingerprint,
                },
                foreach,
            ),
            deps,
            var_deps,
            bound_vars: Mutex::new(Bindings::new()),
            memo: Mutex::new(None),
            mem_cache: opts.mem_cache.unwrap_or(false),
            foreach_memo: Mutex::new(Vec::new()),
        })))
    }

    pub fn deps(&self) -> &[Node] {
        &self.0.deps
    }

    pub fn var_deps(&self) -> &HashSet<String> {
        &self.0.var_deps
    }

    /// Projects `map` onto `V`, returning the projection (does not mutate
    /// this node).
    pub fn remove_non_dep(&self, map: &Bindings) -> Bindings {
        map.project(&self.0.var_deps)
    }

    /// Projects `map` onto `V` and replaces this node's bound-variable map
    /// with the projection.
    pub fn bind(&self, map: &Bindings) {
        let projected = self.remove_non_dep(map);
        *self.0.bound_vars.lock().unwrap() = projected;
    }

    /// Binds this node and, recursively, every node in its dependency
    /// subtree. Idempotent and safe to call on a subtree with shared
    /// nodes -- each shared node is simply re-bound (deterministically) on
    /// every visit.
    pub fn bind_all(&self, map: &Bindings) {
        self.bind(map);
        for dep in &self.0.deps {
            dep.bind_all(map);
        }
    }

    /// `bound_vars ∪ projected(map)` (call-time overrides win), projected
    /// onto `V`.
    pub fn effective_bindings(&self, map: &Bindings) -> Bindings {
        let bound = self.0.bound_vars.lock().unwrap().clone();
        let overrides = self.remove_non_dep(map);
        bound.merged_over(&overrides)
    }

    /// True iff `mem_cache` is on, the memo slot is populated, `force` is
    /// false, and the stored bindings equal `effective`.
    pub fn is_mem_cached(&self, effective: &Bindings, force: bool) -> bool {
        if !self.0.mem_cache || force {
            return false;
        }
        match self.0.memo.lock().unwrap().as_ref() {
            Some((_, bindings)) => bindings == effective,
            None => false,
        }
    }

    fn memo_value(&self) -> Option<Value> {
        self.0.memo.lock().unwrap().as_ref().map(|(v, _)| v.clone())
    }

    fn missing_vars(&self, effective: &Bindings) -> Vec<String> {
        effective.missing_from(self.0.var_deps.iter())
    }

    /// Returns the memoized value if available (checking the on-disk cache
    /// too, for compute nodes), or `None` signaling "not available" --
    /// the runner's cue to gather dependency values and call `evaluate`.
    ///
    /// Constant and variable nodes short-circuit straight to `evaluate`:
    /// they're trivial and never go through the memo slot.
    pub fn get_value(&self, map: &Bindings, force: bool) -> Result<Option<Value>, DagmaError> {
        let effective = self.effective_bindings(map);
        match &self.0.kind {
            Kind::Constant(_) | Kind::Variable(_) => {
                Ok(Some(self.evaluate(&effective, &[], force)?))
            }
            Kind::Compute(cd) => {
                if self.is_mem_cached(&effective, force) {
                    return Ok(self.memo_value());
                }
                if !force {
                    if let Some(cache) = &cd.cache {
                        if let CacheOutcome::Hit(v) =
                            cache_lookup(cache, &effective, &cd.fingerprint)?
                        {
                            self.set_value(v.clone(), &effective);
                            return Ok(Some(v));
                        }
                    }
                }
                Ok(None)
            }
            Kind::Foreach(..) => {
                if self.is_mem_cached(&effective, force) {
                    return Ok(self.memo_value());
                }
                Ok(None)
            }
        }
    }

    /// Variant-specific fresh evaluation. For compute nodes with a cache
    /// descriptor, also performs the disk-cache write protocol afterward.
    pub fn evaluate(
        &self,
        effective: &Bindings,
        dep_values: &[Value],
        force: bool,
    ) -> Result<Value, DagmaError> {
        if !self.0.var_deps.is_empty() {
            let missing = self.missing_vars(effective);
            if !missing.is_empty() {
                return Err(DagmaError::MissingVariable(missing));
            }
        }

        match &self.0.kind {
            Kind::Constant(v) => Ok(v.clone()),
            Kind::Variable(name) => effective
                .get(name)
                .cloned()
                .ok_or_else(|| DagmaError::MissingVariable(vec![name.clone()])),
            Kind::Compute(cd) => {
                let value = (cd.transform)(dep_values);
                if let Some(cache) = &cd.cache {
                    cache_store(cache, effective, &value, &cd.fingerprint)?;
                }
                Ok(value)
            }
            Kind::Foreach(cd, fanout) => {
                self.evaluate_foreach(cd, fanout, effective, dep_values, force)
            }
        }
    }

    fn evaluate_foreach(
        &self,
        cd: &ComputeData,
        fanout: &FanoutKey,
        effective: &Bindings,
        dep_values: &[Value],
        force: bool,
    ) -> Result<Value, DagmaError> {
        let idx = resolve_fanout_index(&self.0.deps, fanout)?;
        // Every per-element evaluation carries the element's own value under
        // a binding key: the fanout variable's name itself for `Var`, or the
        // reserved `FOREACH_ELEMENT_BINDING` key for `Index` (there's no
        // variable name to extend). Either way `elem_effective` now varies
        // with the element's *value*, not its position -- required so the
        // per-element memo and any dynamic cache path actually distinguish
        // elements, while still collapsing equal-valued duplicates to one
        // evaluation (spec §4.5).
        let fanout_binding_key = match fanout {
            FanoutKey::Var(name) => name.clone(),
            FanoutKey::Index(_) => FOREACH_ELEMENT_BINDING.to_string(),
        };
        let elements = dep_values
            .get(idx)
            .and_then(|v| v.as_list())
            .ok_or(DagmaError::FanoutNotAList)?
            .to_vec();

        let mut memo = self.0.foreach_memo.lock().unwrap();
        let mut results = Vec::with_capacity(elements.len());

        for element in elements {
            let mut elem_effective = effective.clone();
            elem_effective.insert(fanout_binding_key.clone(), element.clone());

            if !force {
                if let Some((_, cached)) = memo.iter().find(|(b, _)| b == &elem_effective) {
                    results.push(cached.clone());
                    continue;
                }
            }

            let mut elem_deps = dep_values.to_vec();
            elem_deps[idx] = element;

            let mut value = None;
            if !force {
                if let Some(cache) = &cd.cache {
                    if let CacheOutcome::Hit(v) =
                        cache_lookup(cache, &elem_effective, &cd.fingerprint)?
                    {
                        value = Some(v);
                    }
                }
            }
            let value = match value {
                Some(v) => v,
                None => {
                    let v = (cd.transform)(&elem_deps);
                    if let Some(cache) = &cd.cache {
                        cache_store(cache, &elem_effective, &v, &cd.fingerprint)?;
                    }
                    v
                }
            };

            memo.retain(|(b, _)| b != &elem_effective);
            memo.push((elem_effective, value.clone()));
            results.push(value);
        }

        Ok(Value::List(results))
    }

    /// If `mem_cache` is on, populates the memo slot with
    /// `(value, projected effective bindings)`. Always projects at the
    /// memo write -- spec §9 resolves the source's inconsistent
    /// projection-at-`set_value` behavior this way.
    pub fn set_value(&self, value: Value, effective: &Bindings) {
        if self.0.mem_cache {
            let projected = effective.project(&self.0.var_deps);
            *self.0.memo.lock().unwrap() = Some((value, projected));
        }
    }

    /// Explicit save: writes the node's current memoized value to its
    /// cache descriptor. Fatal if the node has no descriptor
    /// (`no-save-function`) or no memoized value yet
    /// (`save-before-compute`).
    pub fn save(&self) -> Result<(), DagmaError> {
        let cd = self.compute_data().ok_or(DagmaError::NoSaveFunction)?;
        let cache = cd.cache.as_ref().ok_or(DagmaError::NoSaveFunction)?;
        let memo = self.0.memo.lock().unwrap();
        let (value, bindings) = memo.as_ref().ok_or(DagmaError::SaveBeforeCompute)?;
        cache_store(cache, bindings, value, &cd.fingerprint)?;
        Ok(())
    }

    /// Explicit load: reads the node's cache descriptor at its current
    /// bindings. Fatal if the node has no descriptor (`no-load-function`)
    /// or the stored artifact's bindings disagree with the node's current
    /// bindings (`load-bindings-mismatch`).
    pub fn load(&self) -> Result<Value, DagmaError> {
        let cd = self.compute_data().ok_or(DagmaError::NoLoadFunction)?;
        let cache = cd.cache.as_ref().ok_or(DagmaError::NoLoadFunction)?;
        let current = self.effective_bindings(&Bindings::new());
        match cache_lookup(cache, &current, &cd.fingerprint)? {
            CacheOutcome::Hit(v) => {
                self.set_value(v.clone(), &current);
                Ok(v)
            }
            CacheOutcome::Miss => Err(DagmaError::LoadBindingsMismatch {
                found: current.clone(),
                current,
            }),
        }
    }

    fn compute_data(&self) -> Option<&ComputeData> {
        match &self.0.kind {
            Kind::Compute(cd) => Some(cd),
            Kind::Foreach(cd, _) => Some(cd),
            _ => None,
        }
    }

    fn kind_label(&self) -> String {
        match &self.0.kind {
            Kind::Constant(v) => format!("Constant({v})"),
            Kind::Variable(name) => format!("Variable({name})"),
            Kind::Compute(_) => "Compute".to_string(),
            Kind::Foreach(_, FanoutKey::Var(name)) => format!("Foreach(var={name})"),
            Kind::Foreach(_, FanoutKey::Index(i)) => format!("Foreach(index={i})"),
        }
    }

    /// A depth-first, indented textual dump of the dependency tree -- a
    /// diagnostic aid for inspecting a pipeline's shape before running it.
    pub fn text_graph(&self) -> String {
        let mut out = String::new();
        self.write_text_graph(&mut out, 0);
        out
    }

    fn write_text_graph(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&format!("{indent}{}\n", self.kind_label()));
        debug!(depth, label = %self.kind_label(), "text_graph node");
        for dep in &self.0.deps {
            dep.write_text_graph(out, depth + 1);
        }
    }
}

fn union_var_deps(deps: &[Node]) -> HashSet<String> {
    let mut out = HashSet::new();
    for dep in deps {
        out.extend(dep.var_deps().iter().cloned());
    }
    out
}

fn resolve_fanout_index(deps: &[Node], fanout: &FanoutKey) -> Result<usize, DagmaError> {
    match fanout {
        FanoutKey::Index(i) => {
            if *i < deps.len() {
                Ok(*i)
            } else {
                Err(DagmaError::UnknownFanoutKey(format!("index {i}")))
            }
        }
        FanoutKey::Var(name) => deps
            .iter()
            .position(|d| matches!(&d.0.kind, Kind::Variable(n) if n == name))
            .ok_or_else(|| DagmaError::UnknownFanoutKey(name.clone())),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// evaluate's result depends only on the projection of `effective`
        /// onto a node's `V` -- two binding maps that agree on `V` but
        /// disagree elsewhere must evaluate to the same value.
        #[test]
        fn evaluate_ignores_bindings_outside_v(x in any::<i64>(), noise_a in any::<i64>(), noise_b in any::<i64>()) {
            let n = Node::compute(
                |args| Value::Int(args[0].as_int().unwrap() + 1),
                ["x"],
                ComputeOpts::default(),
            );
            let mut m1 = Bindings::new();
            m1.insert("x", Value::Int(x));
            m1.insert("noise", Value::Int(noise_a));
            let mut m2 = Bindings::new();
            m2.insert("x", Value::Int(x));
            m2.insert("noise", Value::Int(noise_b));

            let e1 = n.effective_bindings(&m1);
            let e2 = n.effective_bindings(&m2);
            let v1 = n.evaluate(&e1, &[e1.get("x").unwrap().clone()], false).unwrap();
            let v2 = n.evaluate(&e2, &[e2.get("x").unwrap().clone()], false).unwrap();
            prop_assert_eq!(v1, v2);
        }

        /// bind_all always leaves a node's bound-variable map a subset of
        /// its `V`, no matter what unrelated keys the call-site map holds.
        #[test]
        fn bind_all_bound_vars_are_always_a_subset_of_v(x in any::<i64>(), y in any::<i64>(), z in any::<i64>()) {
            let shared = Node::var("x");
            let a = Node::compute(
                |args| Value::Int(args[0].as_int().unwrap() + 1),
                [DepSpec::Node(shared.clone())],
                ComputeOpts::default(),
            );
            let combo = Node::compute(
                |args| args[0].clone(),
                [DepSpec::Node(a)],
                ComputeOpts::default(),
            );

            let mut map = Bindings::new();
            map.insert("x", Value::Int(x));
            map.insert("y", Value::Int(y));
            map.insert("z", Value::Int(z));
            combo.bind_all(&map);

            let effective = shared.effective_bindings(&Bindings::new());
            for key in effective.keys() {
                prop_assert!(shared.var_deps().contains(key));
            }
        }
    }
}
