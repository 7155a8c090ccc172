//! Node-level error vocabulary. Extends [`dagma_cache::CacheError`] with the
//! failure kinds that only make sense once there's a dependency graph around
//! the cache (missing bindings, explicit save/load misuse, foreach
//! construction constraints).

use dagma_cache::{Bindings, CacheError};
use thiserror::Error;

/// Errors produced while binding, evaluating, or explicitly saving/loading a
/// node. See spec §7 for the closed taxonomy this mirrors.
#[derive(Debug, Error)]
pub enum DagmaError {
    /// A variable node (or a compute node's direct variable dependency)
    /// lacked a binding at evaluation time. Carries every absent name,
    /// sorted, so callers see the whole gap in one error.
    #[error("missing variable bindings: {0:?}")]
    MissingVariable(Vec<String>),

    /// An explicit save was requested on a node with no cache descriptor.
    #[error("node has no save function configured")]
    NoSaveFunction,

    /// An explicit load was requested on a node with no cache descriptor.
    #[error("node has no load function configured")]
    NoLoadFunction,

    /// Explicit save requested but the node has no memoized value yet.
    #[error("save requested before the node has a computed value")]
    SaveBeforeCompute,

    /// Explicit load found a sidecar (or resolved no sidecar) under
    /// bindings that disagree with the node's current effective bindings.
    #[error("load bindings mismatch: stored {found:?}, current {current:?}")]
    LoadBindingsMismatch { found: Bindings, current: Bindings },

    /// A foreach compute node was constructed with a cache path that is not
    /// a function of bindings; per-element results need distinct paths.
    #[error("foreach compute node requires a callable cache path")]
    ForeachPathMustBeCallable,

    /// The fanout key named for a foreach node does not correspond to any
    /// of its dependencies.
    #[error("foreach fanout key {0:?} does not match any dependency")]
    UnknownFanoutKey(String),

    /// The dependency selected as a foreach node's fanout did not resolve
    /// to a list value.
    #[error("foreach fanout dependency did not resolve to a list")]
    FanoutNotAList,

    /// Bubbled up from the on-disk cache / file-I/O layer unchanged.
    #[error(transparent)]
    Cache(#[from] CacheError),
}
