//! The node taxonomy: dependency normalization, variable-binding scoping,
//! the transform fingerprint, and the memoization contract every runner in
//! `dagma-runtime` drives.
//!
//! This crate depends on `dagma-cache` for the `Value`/`Bindings` data
//! model and the on-disk cache protocol; it has no knowledge of how a
//! graph gets scheduled for evaluation -- that's `dagma-runtime`'s job.

mod dep;
mod error;
mod node;

pub use dep::{DepSpec, FanoutKey, FOREACH_ELEMENT_BINDING};
pub use error::DagmaError;
pub use node::{ComputeOpts, DepList, Node, Transform};

pub use dagma_cache::{Bindings, CacheDescriptor, CacheError, Value};
